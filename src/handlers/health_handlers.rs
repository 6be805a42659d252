//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness: metadata database plus blob directory I/O

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::BTreeMap, path::Path};
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Liveness only; never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// 200 when both the SQLite query and the storage check pass, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let sqlite = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*state.db)
        .await
    {
        Ok(1) => CheckStatus::ok(),
        Ok(v) => CheckStatus::failed(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    };
    let storage = match storage_check(&state.blobs.base_path).await {
        Ok(None) => CheckStatus::ok(),
        Ok(Some(note)) => CheckStatus {
            ok: true,
            error: Some(note),
        },
        Err(e) => CheckStatus::failed(e),
    };

    let ready = sqlite.ok && storage.ok;
    let checks = BTreeMap::from([("sqlite", sqlite), ("storage", storage)]);
    let (status, label) = if ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "error")
    };

    (
        status,
        Json(ReadyResponse {
            status: label,
            checks,
        }),
    )
}

/// Write, read back and remove a scratch file under the blob directory.
///
/// A check that passed but could not remove its file is still ready; the removal
/// error comes back as a note.
async fn storage_check(base: &Path) -> Result<Option<String>, String> {
    fs::create_dir_all(base)
        .await
        .map_err(|e| format!("could not create storage dir: {}", e))?;

    let scratch = base.join(format!(".readyz-{}", Uuid::new_v4()));
    fs::write(&scratch, b"readyz")
        .await
        .map_err(|e| format!("could not write scratch file: {}", e))?;
    let read = fs::read(&scratch).await;
    let cleanup = match fs::remove_file(&scratch).await {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!(
                path = %scratch.display(),
                "could not remove readiness scratch file: {}",
                e
            );
            Some(format!("could not remove scratch file: {}", e))
        }
    };

    match read {
        Ok(bytes) if bytes == b"readyz" => Ok(cleanup),
        Ok(_) => Err("scratch file content mismatch".into()),
        Err(e) => Err(format!("could not read scratch file: {}", e)),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}
