//! Avatar retrieval with conditional-GET semantics, plus listing.
//!
//! The freshness headers are always computed from a fresh `stat` of the
//! blob; only then is the request's `If-None-Match` compared against the
//! quoted ETag. A match means 304 without the direct-serve marker, anything
//! else means 200 with the marker so the HTTP layer in front of the service
//! streams the blob from storage.

use crate::{
    models::{avatar::Avatar, stored_object::ObjectStat},
    services::{
        ServiceResult, metadata_store::AvatarStore, object_gateway::ObjectGateway,
        with_timeout,
    },
};
use chrono::{TimeZone, Utc};
use std::{sync::Arc, time::Duration};
use tokio::fs::File;

/// RFC 1123 date as used in HTTP headers.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Response headers for one retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessHeaders {
    pub last_modified: String,
    /// Quoted etag, e.g. `"abc123"`.
    pub etag: String,
    pub content_type: Option<String>,
    /// Direct-serve marker value; `None` when answering 304.
    pub direct_serve: Option<String>,
}

impl FreshnessHeaders {
    pub fn not_modified(&self) -> bool {
        self.direct_serve.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Retrieval {
    pub avatar: Avatar,
    pub headers: FreshnessHeaders,
}

#[derive(Clone)]
pub struct AvatarService {
    store: AvatarStore,
    gateway: Arc<dyn ObjectGateway>,
    timeout: Duration,
}

impl AvatarService {
    pub fn new(store: AvatarStore, gateway: Arc<dyn ObjectGateway>, timeout: Duration) -> Self {
        Self {
            store,
            gateway,
            timeout,
        }
    }

    /// Resolve `identifier` to freshness headers.
    ///
    /// `NotFound` when no record exists, `FileNotFound` when the record
    /// points at a blob that is gone.
    pub async fn retrieve(
        &self,
        identifier: &str,
        if_none_match: Option<&str>,
    ) -> ServiceResult<Retrieval> {
        let avatar =
            with_timeout(self.timeout, "get_avatar", self.store.get(identifier)).await?;
        let stat = with_timeout(
            self.timeout,
            "stat_object",
            self.gateway.stat(&avatar.object_path),
        )
        .await?;

        let headers = conditional_headers(
            &stat,
            || self.gateway.direct_serve_key(&avatar.object_path),
            if_none_match,
        );
        Ok(Retrieval { avatar, headers })
    }

    pub async fn list(&self) -> ServiceResult<Vec<Avatar>> {
        with_timeout(self.timeout, "list_avatars", self.store.list()).await
    }

    /// Open the blob behind an avatar for in-process streaming.
    pub async fn open_blob(&self, avatar: &Avatar) -> ServiceResult<File> {
        with_timeout(
            self.timeout,
            "open_object",
            self.gateway.open(&avatar.object_path),
        )
        .await
    }
}

/// Build the response headers for a stat'ed blob.
///
/// The marker is only computed when the client copy is stale.
pub fn conditional_headers(
    stat: &ObjectStat,
    direct_serve_key: impl FnOnce() -> String,
    if_none_match: Option<&str>,
) -> FreshnessHeaders {
    let etag = format!("\"{}\"", stat.etag);
    let direct_serve = if if_none_match == Some(etag.as_str()) {
        None
    } else {
        Some(direct_serve_key())
    };

    FreshnessHeaders {
        last_modified: http_date(stat.last_modified_secs),
        etag,
        content_type: stat.content_type.clone(),
        direct_serve,
    }
}

/// Format unix seconds as an HTTP-date. Out-of-range values clamp to the epoch.
pub fn http_date(secs: i64) -> String {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or_default()
        .format(HTTP_DATE_FORMAT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::test_pool,
        services::{
            ServiceError,
            object_gateway::{GatewayError, GatewayResult},
        },
    };
    use async_trait::async_trait;

    /// Gateway whose stat never answers in time.
    struct StalledGateway;

    #[async_trait]
    impl ObjectGateway for StalledGateway {
        async fn stat(&self, _object_path: &str) -> GatewayResult<ObjectStat> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(GatewayError::FileNotFound("unreachable".into()))
        }

        async fn create_upload_url(&self, _: &str, _: &str) -> GatewayResult<String> {
            Ok("/upload/stalled".into())
        }

        fn direct_serve_key(&self, object_path: &str) -> String {
            object_path.to_string()
        }

        async fn open(&self, object_path: &str) -> GatewayResult<File> {
            Err(GatewayError::FileNotFound(object_path.to_string()))
        }
    }

    fn stat(etag: &str, content_type: Option<&str>) -> ObjectStat {
        ObjectStat {
            etag: etag.into(),
            content_type: content_type.map(Into::into),
            last_modified_secs: 1_700_000_000,
            size_bytes: 3,
        }
    }

    fn marker() -> String {
        "/_blobs/app.default/files/1".into()
    }

    #[test]
    fn http_date_matches_rfc1123() {
        assert_eq!(http_date(1_700_000_000), "Tue, 14 Nov 2023 22:13:20 GMT");
        assert_eq!(http_date(0), "Thu, 01 Jan 1970 00:00:00 GMT");
    }

    #[test]
    fn no_conditional_header_serves_blob() {
        let headers = conditional_headers(&stat("abc123", Some("image/png")), marker, None);
        assert_eq!(headers.etag, "\"abc123\"");
        assert_eq!(headers.last_modified, "Tue, 14 Nov 2023 22:13:20 GMT");
        assert_eq!(headers.content_type.as_deref(), Some("image/png"));
        assert_eq!(headers.direct_serve, Some(marker()));
        assert!(!headers.not_modified());
    }

    #[test]
    fn matching_etag_is_not_modified() {
        let headers = conditional_headers(&stat("abc123", None), marker, Some("\"abc123\""));
        assert!(headers.not_modified());
        assert_eq!(headers.direct_serve, None);
        assert_eq!(headers.content_type, None);
    }

    #[test]
    fn different_or_unquoted_etag_serves_blob() {
        for sent in ["\"xyz999\"", "abc123", "W/\"abc123\"", "*"] {
            let headers = conditional_headers(&stat("abc123", None), marker, Some(sent));
            assert_eq!(headers.direct_serve, Some(marker()), "{sent}");
        }
    }

    #[tokio::test]
    async fn stalled_storage_surfaces_as_timeout() {
        let store = AvatarStore::new(Arc::new(test_pool().await));
        store.create("a", "/app.default/files/1").await.unwrap();
        let service =
            AvatarService::new(store, Arc::new(StalledGateway), Duration::from_millis(20));

        let err = service.retrieve("a", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout { operation: "stat_object", .. }));
    }
}
