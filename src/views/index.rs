//! The landing page: upload form plus every avatar, newest first.

use crate::{models::avatar::Avatar, services::upload_service::UploadTarget};
use chrono::SecondsFormat;
use serde::Serialize;

/// One avatar as shown on the landing page.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AvatarListing {
    pub identifier: String,
    pub url: String,
    pub created_at: String,
}

/// Everything the landing page renders.
#[derive(Debug, Clone, Serialize)]
pub struct IndexView {
    pub identifier: String,
    pub upload_url: String,
    pub avatars: Vec<AvatarListing>,
}

impl IndexView {
    /// `avatars` must already be in display order.
    pub fn assemble(target: UploadTarget, avatars: Vec<Avatar>) -> Self {
        Self {
            identifier: target.identifier,
            upload_url: target.upload_url,
            avatars: avatars
                .into_iter()
                .map(|a| AvatarListing {
                    url: a.url(),
                    created_at: a.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                    identifier: a.identifier,
                })
                .collect(),
        }
    }
}
