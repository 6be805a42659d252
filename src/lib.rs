//! Avatar upload and retrieval service.
//!
//! Clients upload an image through a one-time URL; the storage layer calls
//! back with the stored object path and an avatar record is upserted.
//! Retrieval answers with ETag/Last-Modified and either a direct-serve
//! marker or `304 Not Modified`.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod views;

use axum::Router;
use state::AppState;
use tower_http::trace::TraceLayer;

/// Full application router with state and request tracing attached.
pub fn app(state: AppState) -> Router {
    routes::routes::routes()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
