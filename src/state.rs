//! Shared handler state, built once at startup from `AppConfig`.

use crate::{
    config::AppConfig,
    services::{
        avatar_service::AvatarService, local_object_store::LocalObjectStore,
        metadata_store::AvatarStore, upload_service::UploadOrchestrator,
    },
    views::Templates,
};
use anyhow::{Result, anyhow};
use axum::http::HeaderName;
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub avatars: AvatarService,
    pub uploads: UploadOrchestrator,
    /// Concrete blob store behind the one-time upload endpoint.
    pub blobs: LocalObjectStore,
    pub direct_serve_header: HeaderName,
    pub stream_blobs: bool,
    pub storage_timeout: Duration,
    pub templates: Arc<Templates>,
}

impl AppState {
    pub fn new(db: Arc<SqlitePool>, cfg: &AppConfig) -> Result<Self> {
        let blobs = LocalObjectStore::new(db.clone(), &cfg.storage_dir, &cfg.bucket)
            .with_public_base_url(cfg.public_base_url.clone())
            .with_direct_serve_prefix(&cfg.direct_serve_prefix)
            .with_upload_url_ttl(chrono::Duration::seconds(cfg.upload_url_ttl_secs as i64));
        let store = AvatarStore::new(db.clone());
        let gateway = Arc::new(blobs.clone());
        let timeout = cfg.storage_timeout();
        let templates = Templates::new()
            .map_err(|err| anyhow!("failed to register page templates: {}", err))?;

        Ok(Self {
            db,
            avatars: AvatarService::new(store.clone(), gateway.clone(), timeout),
            uploads: UploadOrchestrator::new(store, gateway, timeout),
            blobs,
            direct_serve_header: cfg.direct_serve_header.clone(),
            stream_blobs: cfg.stream_blobs,
            storage_timeout: timeout,
            templates: Arc::new(templates),
        })
    }
}
