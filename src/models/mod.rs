//! Core data models for the avatar service.
//!
//! These entities map to SQLite tables via `sqlx::FromRow` and serialize
//! as JSON via `serde`.

pub mod avatar;
pub mod stored_object;
pub mod upload_session;
