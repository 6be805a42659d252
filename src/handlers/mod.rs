//! HTTP handlers. Each one extracts request data, calls into `services` and
//! maps the outcome onto a response.

pub mod avatar_handlers;
pub mod health_handlers;
pub mod index_handlers;
pub mod upload_handlers;
