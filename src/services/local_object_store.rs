//! src/services/local_object_store.rs
//!
//! LocalObjectStore: the object storage gateway backed by local disk for
//! blob payloads and SQLite for blob metadata and upload sessions. Payloads
//! live at `{base_path}{object_path}` so a reverse proxy can serve them
//! directly from the same directory.

use crate::{
    models::{
        stored_object::{ObjectStat, StoredObject},
        upload_session::UploadSession,
    },
    services::object_gateway::{
        GatewayError, GatewayResult, ObjectGateway, ensure_object_path_safe,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Path prefix of the one-time upload endpoint.
pub const UPLOAD_ROUTE_PREFIX: &str = "/upload";

#[derive(Clone)]
pub struct LocalObjectStore {
    /// Shared SQLite connection pool for blob metadata and sessions.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where blob payloads are stored.
    pub base_path: PathBuf,

    /// Bucket every new upload is written into.
    pub bucket: String,

    /// Prepended to upload URLs; `None` yields relative URLs.
    pub public_base_url: Option<String>,

    /// Prepended to the object path in the direct-serve marker.
    pub direct_serve_prefix: String,

    /// Lifetime of an upload session.
    pub upload_url_ttl: Duration,
}

impl LocalObjectStore {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            bucket: bucket.into(),
            public_base_url: None,
            direct_serve_prefix: "/_blobs".into(),
            upload_url_ttl: Duration::minutes(15),
        }
    }

    pub fn with_public_base_url(mut self, url: Option<String>) -> Self {
        self.public_base_url = url.map(|u| u.trim_end_matches('/').to_string());
        self
    }

    pub fn with_direct_serve_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.direct_serve_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_upload_url_ttl(mut self, ttl: Duration) -> Self {
        self.upload_url_ttl = ttl;
        self
    }

    /// Physical location of a blob. The path must already be validated.
    fn file_path(&self, object_path: &str) -> PathBuf {
        self.base_path.join(object_path.trim_start_matches('/'))
    }

    /// Path for a newly uploaded blob: `/{bucket}/files/{uuid}`.
    fn new_object_path(&self) -> String {
        format!("/{}/files/{}", self.bucket, Uuid::new_v4().simple())
    }

    async fn fetch_object(&self, object_path: &str) -> GatewayResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT path, content_type, size_bytes, etag, last_modified
             FROM objects WHERE path = ?",
        )
        .bind(object_path)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => GatewayError::FileNotFound(object_path.to_string()),
            other => GatewayError::Sqlx(other),
        })
    }

    /// Look up a session that can still be claimed, without consuming it.
    pub async fn open_upload_session(&self, id: Uuid) -> GatewayResult<UploadSession> {
        sqlx::query_as::<_, UploadSession>(
            "SELECT id, identifier, callback_path, created_at, expires_at, completed
             FROM upload_sessions
             WHERE id = ? AND completed = 0 AND expires_at > ?",
        )
        .bind(id)
        .bind(Utc::now().timestamp())
        .fetch_optional(&*self.db)
        .await?
        .ok_or(GatewayError::SessionNotFound(id))
    }

    /// Atomically consume an upload session.
    ///
    /// Returns `SessionNotFound` for unknown, expired or already-used sessions.
    pub async fn claim_upload_session(&self, id: Uuid) -> GatewayResult<UploadSession> {
        sqlx::query_as::<_, UploadSession>(
            "UPDATE upload_sessions SET completed = 1
             WHERE id = ? AND completed = 0 AND expires_at > ?
             RETURNING id, identifier, callback_path, created_at, expires_at, completed",
        )
        .bind(id)
        .bind(Utc::now().timestamp())
        .fetch_optional(&*self.db)
        .await?
        .ok_or(GatewayError::SessionNotFound(id))
    }

    /// Hand a claimed session back so the upload can be retried. Expiry still
    /// applies.
    pub async fn release_upload_session(&self, id: Uuid) -> GatewayResult<()> {
        sqlx::query("UPDATE upload_sessions SET completed = 0 WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    /// Remove a blob that was never referenced by an avatar.
    pub async fn delete_object(&self, object_path: &str) -> GatewayResult<()> {
        ensure_object_path_safe(object_path)?;
        sqlx::query("DELETE FROM objects WHERE path = ?")
            .bind(object_path)
            .execute(&*self.db)
            .await?;

        match fs::remove_file(self.file_path(object_path)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(GatewayError::Io(err)),
        }
    }

    /// Stream a new blob to disk and record its metadata.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5/etag and size while streaming.
    /// - Atomically renames into final location.
    ///
    /// Cleans up temp files on errors.
    pub async fn put_object_stream<S>(
        &self,
        content_type: Option<String>,
        stream: S,
    ) -> GatewayResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let object_path = self.new_object_path();
        ensure_object_path_safe(&object_path)?;

        let file_path = self.file_path(&object_path);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            GatewayError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(GatewayError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(GatewayError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(GatewayError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(GatewayError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(GatewayError::Io(err));
        }

        let etag = format!("{:x}", digest.compute());
        let insert_result = sqlx::query_as::<_, StoredObject>(
            "INSERT INTO objects (path, content_type, size_bytes, etag, last_modified)
             VALUES (?, ?, ?, ?, ?)
             RETURNING path, content_type, size_bytes, etag, last_modified",
        )
        .bind(&object_path)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now().timestamp())
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => {
                debug!("stored {} ({} bytes, etag {})", obj.path, obj.size_bytes, obj.etag);
                Ok(obj)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(GatewayError::Sqlx(err))
            }
        }
    }
}

#[async_trait]
impl ObjectGateway for LocalObjectStore {
    /// Returns `FileNotFound` if metadata exists but the payload is gone.
    async fn stat(&self, object_path: &str) -> GatewayResult<ObjectStat> {
        ensure_object_path_safe(object_path)?;
        let object = self.fetch_object(object_path).await?;

        match fs::metadata(self.file_path(object_path)).await {
            Ok(meta) if meta.is_file() => Ok(object.into()),
            Ok(_) => Err(GatewayError::FileNotFound(object_path.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(GatewayError::FileNotFound(object_path.to_string()))
            }
            Err(err) => Err(GatewayError::Io(err)),
        }
    }

    async fn create_upload_url(
        &self,
        callback_path: &str,
        identifier: &str,
    ) -> GatewayResult<String> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO upload_sessions
                (id, identifier, callback_path, created_at, expires_at, completed)
             VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(id)
        .bind(identifier)
        .bind(callback_path)
        .bind(now)
        .bind((now + self.upload_url_ttl).timestamp())
        .execute(&*self.db)
        .await?;

        let base = self.public_base_url.as_deref().unwrap_or("");
        Ok(format!("{}{}/{}", base, UPLOAD_ROUTE_PREFIX, id))
    }

    fn direct_serve_key(&self, object_path: &str) -> String {
        format!("{}{}", self.direct_serve_prefix, object_path)
    }

    async fn open(&self, object_path: &str) -> GatewayResult<File> {
        ensure_object_path_safe(object_path)?;
        File::open(self.file_path(object_path))
            .await
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    GatewayError::FileNotFound(object_path.to_string())
                } else {
                    GatewayError::Io(err)
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use futures::stream;

    async fn store(dir: &Path) -> LocalObjectStore {
        LocalObjectStore::new(Arc::new(test_pool().await), dir, "test-app.default")
    }

    fn body(chunks: Vec<&'static str>) -> impl Stream<Item = io::Result<Bytes>> + Send {
        stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn put_then_stat_reports_md5_etag() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        let obj = store
            .put_object_stream(Some("image/png".into()), body(vec!["hello ", "world"]))
            .await
            .unwrap();
        assert!(obj.path.starts_with("/test-app.default/files/"));
        assert_eq!(obj.size_bytes, 11);

        let stat = store.stat(&obj.path).await.unwrap();
        assert_eq!(stat.etag, format!("{:x}", md5::compute(b"hello world")));
        assert_eq!(stat.content_type.as_deref(), Some("image/png"));
        assert_eq!(stat.size_bytes, 11);

        let on_disk = fs::read(dir.path().join(obj.path.trim_start_matches('/')))
            .await
            .unwrap();
        assert_eq!(on_disk, b"hello world");
    }

    #[tokio::test]
    async fn stat_unknown_path_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let err = store.stat("/test-app.default/files/missing").await.unwrap_err();
        assert!(matches!(err, GatewayError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn stat_after_payload_removed_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let obj = store.put_object_stream(None, body(vec!["x"])).await.unwrap();

        fs::remove_file(dir.path().join(obj.path.trim_start_matches('/')))
            .await
            .unwrap();

        let err = store.stat(&obj.path).await.unwrap_err();
        assert!(matches!(err, GatewayError::FileNotFound(_)));
        assert!(matches!(
            store.open(&obj.path).await.unwrap_err(),
            GatewayError::FileNotFound(_)
        ));
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let broken = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(ErrorKind::BrokenPipe, "client went away")),
        ]);

        assert!(store.put_object_stream(None, broken).await.is_err());

        let files_dir = dir.path().join("test-app.default/files");
        let mut entries = fs::read_dir(&files_dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upload_session_is_single_use() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path())
            .await
            .with_public_base_url(Some("https://avatars.example/".into()));

        let url = store.create_upload_url("/avatar/abc", "abc").await.unwrap();
        let id: Uuid = url
            .strip_prefix("https://avatars.example/upload/")
            .unwrap()
            .parse()
            .unwrap();

        let session = store.claim_upload_session(id).await.unwrap();
        assert_eq!(session.identifier, "abc");
        assert_eq!(session.callback_path, "/avatar/abc");
        assert!(session.completed);

        let err = store.claim_upload_session(id).await.unwrap_err();
        assert!(matches!(err, GatewayError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn looking_up_a_session_does_not_consume_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let url = store.create_upload_url("/avatar/abc", "abc").await.unwrap();
        let id: Uuid = url.rsplit('/').next().unwrap().parse().unwrap();

        let open = store.open_upload_session(id).await.unwrap();
        assert!(!open.completed);
        store.claim_upload_session(id).await.unwrap();

        assert!(matches!(
            store.open_upload_session(id).await.unwrap_err(),
            GatewayError::SessionNotFound(_)
        ));
    }

    #[tokio::test]
    async fn released_session_can_be_claimed_again() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let url = store.create_upload_url("/avatar/abc", "abc").await.unwrap();
        let id: Uuid = url.rsplit('/').next().unwrap().parse().unwrap();

        store.claim_upload_session(id).await.unwrap();
        store.release_upload_session(id).await.unwrap();

        let session = store.claim_upload_session(id).await.unwrap();
        assert_eq!(session.identifier, "abc");
    }

    #[tokio::test]
    async fn delete_object_removes_payload_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let obj = store.put_object_stream(None, body(vec!["x"])).await.unwrap();

        store.delete_object(&obj.path).await.unwrap();

        assert!(!dir.path().join(obj.path.trim_start_matches('/')).exists());
        assert!(matches!(
            store.stat(&obj.path).await.unwrap_err(),
            GatewayError::FileNotFound(_)
        ));
        // already gone is fine
        store.delete_object(&obj.path).await.unwrap();
    }

    #[tokio::test]
    async fn expired_session_cannot_be_claimed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path())
            .await
            .with_upload_url_ttl(Duration::seconds(-1));

        let url = store.create_upload_url("/avatar/abc", "abc").await.unwrap();
        let id: Uuid = url.rsplit('/').next().unwrap().parse().unwrap();

        assert!(matches!(
            store.claim_upload_session(id).await.unwrap_err(),
            GatewayError::SessionNotFound(_)
        ));
    }

    #[tokio::test]
    async fn direct_serve_key_prefixes_object_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path())
            .await
            .with_direct_serve_prefix("/internal/blobs/");
        assert_eq!(
            store.direct_serve_key("/b/files/1"),
            "/internal/blobs/b/files/1"
        );
    }
}
