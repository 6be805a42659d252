//! Represents a blob held by the local object storage gateway.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metadata of one stored blob. The bytes live on disk under the storage
/// directory at the same path.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Object path, e.g. `/my-app.default/files/3f0c…`.
    pub path: String,

    /// MIME type reported by the uploader, if any.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Hex MD5 of the content (unquoted).
    pub etag: String,

    /// Unix seconds of the last write.
    pub last_modified: i64,
}

/// Freshness metadata returned by `stat`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectStat {
    pub etag: String,
    pub content_type: Option<String>,
    pub last_modified_secs: i64,
    pub size_bytes: i64,
}

impl From<StoredObject> for ObjectStat {
    fn from(obj: StoredObject) -> Self {
        Self {
            etag: obj.etag,
            content_type: obj.content_type,
            last_modified_secs: obj.last_modified,
            size_bytes: obj.size_bytes,
        }
    }
}
