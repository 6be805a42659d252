//! Domain services: the metadata store, the object storage gateway and the
//! avatar flows built on top of them.

pub mod avatar_service;
pub mod local_object_store;
pub mod metadata_store;
pub mod object_gateway;
pub mod upload_service;

use metadata_store::StoreError;
use object_gateway::GatewayError;
use std::{future::Future, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("avatar `{0}` not found")]
    NotFound(String),
    #[error("blob `{0}` for avatar not found")]
    FileNotFound(String),
    #[error("avatar `{0}` already exists")]
    AlreadyExists(String),
    #[error("invalid upload callback: {0}")]
    InvalidCallback(String),
    #[error("upload session not found, expired or already used")]
    UploadSessionNotFound,
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Gateway(GatewayError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            StoreError::AlreadyExists(id) => ServiceError::AlreadyExists(id),
            other => ServiceError::Store(other),
        }
    }
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::FileNotFound(path) => ServiceError::FileNotFound(path),
            GatewayError::SessionNotFound(_) => ServiceError::UploadSessionNotFound,
            GatewayError::InvalidObjectPath(path) => {
                ServiceError::InvalidCallback(format!("invalid object path `{}`", path))
            }
            other => ServiceError::Gateway(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Bound a call to the metadata store or the object gateway.
pub async fn with_timeout<T, E, F>(
    after: Duration,
    operation: &'static str,
    fut: F,
) -> ServiceResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<ServiceError>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(ServiceError::Timeout { operation, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_calls_become_timeouts() {
        let err = with_timeout(Duration::from_millis(10), "stat", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, GatewayError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Timeout { operation: "stat", .. }));
    }

    #[tokio::test]
    async fn not_found_kinds_are_classified() {
        let err = with_timeout(Duration::from_secs(1), "get", async {
            Err::<(), _>(StoreError::NotFound("x".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(id) if id == "x"));

        let err: ServiceError = GatewayError::FileNotFound("/b/f".into()).into();
        assert!(matches!(err, ServiceError::FileNotFound(_)));
    }
}
