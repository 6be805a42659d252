//! Represents an avatar: an uploaded image bound to a server-chosen identifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single avatar metadata record.
///
/// The record does not hold image bytes; it points at a blob in object
/// storage through `object_path`. Re-uploading under the same identifier
/// moves the pointer and leaves `created_at` untouched.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Avatar {
    /// Server-generated identifier (UUID v4 text). Primary key.
    pub identifier: String,

    /// Location of the most recently uploaded blob, e.g. `/bucket/files/<uuid>`.
    pub object_path: String,

    /// When the first upload callback for this identifier completed.
    pub created_at: DateTime<Utc>,
}

impl Avatar {
    /// Path under which the avatar image is served.
    pub fn url(&self) -> String {
        avatar_path(&self.identifier)
    }
}

/// `/avatar/{identifier}`, used as both the retrieval URL and the upload
/// callback path for an identifier. The identifier is percent-encoded so it
/// always occupies exactly one path segment.
pub fn avatar_path(identifier: &str) -> String {
    format!("/avatar/{}", urlencoding::encode(identifier))
}
