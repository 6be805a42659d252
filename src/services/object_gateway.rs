//! The object storage seam consumed by the avatar services.

use crate::models::stored_object::ObjectStat;
use async_trait::async_trait;
use std::io;
use thiserror::Error;
use tokio::fs::File;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("object `{0}` not found")]
    FileNotFound(String),
    #[error("upload session `{0}` not found, expired or already used")]
    SessionNotFound(Uuid),
    #[error("invalid object path `{0}`")]
    InvalidObjectPath(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Blob storage as seen by the application.
///
/// Uploads never pass through the avatar handlers: the gateway hands out a
/// one-time URL and later reports the stored path through the callback.
#[async_trait]
pub trait ObjectGateway: Send + Sync {
    /// Freshness metadata for a stored blob. `FileNotFound` when absent.
    async fn stat(&self, object_path: &str) -> GatewayResult<ObjectStat>;

    /// One-time upload URL; the stored blob's path is delivered to
    /// `callback_path` for `identifier` once the upload completes.
    async fn create_upload_url(&self, callback_path: &str, identifier: &str)
    -> GatewayResult<String>;

    /// Value of the direct-serve marker header for `object_path`.
    fn direct_serve_key(&self, object_path: &str) -> String;

    /// Open the blob bytes for streaming through the application.
    async fn open(&self, object_path: &str) -> GatewayResult<File>;
}

/// Validate an object path of the form `/{bucket}/...`.
///
/// Rejects empty segments, `..`, backslashes and control bytes so the path
/// can be joined onto the storage directory safely.
pub fn ensure_object_path_safe(path: &str) -> GatewayResult<()> {
    const MAX_OBJECT_PATH_LEN: usize = 1024;

    let invalid = || GatewayError::InvalidObjectPath(path.to_string());
    let Some(rest) = path.strip_prefix('/') else {
        return Err(invalid());
    };
    if rest.is_empty() || path.len() > MAX_OBJECT_PATH_LEN {
        return Err(invalid());
    }
    if rest.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(invalid());
    }
    if path
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(invalid());
    }
    Ok(())
}
