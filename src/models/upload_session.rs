//! Represents a one-time upload target handed out with the upload form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An upload session, created before the client posts its file.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UploadSession {
    /// Session id embedded in the upload URL.
    pub id: Uuid,

    /// Avatar identifier the upload is bound to.
    pub identifier: String,

    /// Callback path invoked once the blob is stored.
    pub callback_path: String,

    /// Timestamp when the session was created.
    pub created_at: DateTime<Utc>,

    /// Unix seconds after which the session can no longer be used.
    pub expires_at: i64,

    /// Whether the session has been consumed by an upload.
    pub completed: bool,
}
