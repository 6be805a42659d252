//! Defines routes for the avatar service.
//!
//! ## Structure
//! - `GET  /`                     : upload form + avatar listing
//! - `GET  /avatar/{identifier}`  : conditional retrieval (200 + marker, or 304)
//! - `POST /avatar/{identifier}`  : upload callback, redirects to `/`
//! - `POST /upload/{session}`     : one-time upload target
//! - `GET  /healthz`, `/readyz`   : liveness / readiness

use crate::{
    handlers::{
        avatar_handlers::{get_avatar, upload_callback},
        health_handlers::{healthz, readyz},
        index_handlers::index,
        upload_handlers::receive_upload,
    },
    services::local_object_store::UPLOAD_ROUTE_PREFIX,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Largest accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Build the router. The caller attaches `AppState` with `with_state`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/", get(index))
        .route(
            "/avatar/{identifier}",
            get(get_avatar).post(upload_callback),
        )
        .route(
            &format!("{}/{{session}}", UPLOAD_ROUTE_PREFIX),
            post(receive_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
}
