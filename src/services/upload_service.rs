//! Upload orchestration: hand out one-time upload targets and record the
//! uploaded blob once the storage layer calls back.

use crate::{
    models::avatar::{Avatar, avatar_path},
    services::{
        ServiceError, ServiceResult,
        metadata_store::AvatarStore,
        object_gateway::{ObjectGateway, ensure_object_path_safe},
        with_timeout,
    },
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::info;
use uuid::Uuid;

/// A freshly minted identifier and the URL the client must upload to.
#[derive(Debug, Clone, Serialize)]
pub struct UploadTarget {
    pub identifier: String,
    pub upload_url: String,
}

#[derive(Clone)]
pub struct UploadOrchestrator {
    store: AvatarStore,
    gateway: Arc<dyn ObjectGateway>,
    timeout: Duration,
}

impl UploadOrchestrator {
    pub fn new(store: AvatarStore, gateway: Arc<dyn ObjectGateway>, timeout: Duration) -> Self {
        Self {
            store,
            gateway,
            timeout,
        }
    }

    /// New random identifier plus an upload URL whose callback is
    /// `/avatar/{identifier}`.
    pub async fn generate_upload_target(&self) -> ServiceResult<UploadTarget> {
        let identifier = Uuid::new_v4().to_string();
        let callback_path = avatar_path(&identifier);
        let upload_url = with_timeout(
            self.timeout,
            "create_upload_url",
            self.gateway.create_upload_url(&callback_path, &identifier),
        )
        .await?;

        Ok(UploadTarget {
            identifier,
            upload_url,
        })
    }

    /// Record `object_path` as the current blob for `identifier`.
    ///
    /// Creates the avatar on first call and moves the pointer afterwards; the
    /// previous blob is left in storage.
    pub async fn handle_callback(
        &self,
        identifier: &str,
        object_path: &str,
    ) -> ServiceResult<(Avatar, bool)> {
        if identifier.is_empty() {
            return Err(ServiceError::InvalidCallback("empty identifier".into()));
        }
        ensure_object_path_safe(object_path)?;

        let (avatar, created) = with_timeout(
            self.timeout,
            "upsert_avatar",
            self.store.upsert(identifier, object_path),
        )
        .await?;

        info!(
            identifier = %avatar.identifier,
            object_path = %avatar.object_path,
            created,
            "avatar recorded"
        );
        Ok((avatar, created))
    }
}
