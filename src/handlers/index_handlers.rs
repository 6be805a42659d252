//! `GET /`: upload form bound to a fresh identifier, plus the avatar list.

use crate::{
    errors::AppError,
    state::AppState,
    views::index::IndexView,
};
use axum::{extract::State, response::Html};

pub async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let target = state
        .uploads
        .generate_upload_target()
        .await
        .map_err(|err| AppError::from_service(err, "generate_upload_target", ""))?;
    let avatars = state
        .avatars
        .list()
        .await
        .map_err(|err| AppError::from_service(err, "list_avatars", &target.identifier))?;

    let view = IndexView::assemble(target, avatars);
    let html = state
        .templates
        .render_index(&view)
        .map_err(|err| AppError::internal(format!("failed to render index: {}", err)))?;
    Ok(Html(html))
}
