//! The one-time upload target handed out by `create_upload_url`.

use crate::{
    errors::AppError,
    services::{ServiceError, with_timeout},
    state::AppState,
};
use axum::{
    extract::{Multipart, Path, State},
    response::{IntoResponse, Redirect},
};
use futures::TryStreamExt;
use std::io;
use uuid::Uuid;

use super::avatar_handlers::FILE_FIELD;

/// `POST /upload/{session}`
///
/// Streams the `file` part into blob storage, consumes the session and then
/// runs the session's callback for the bound identifier. Requests rejected
/// before the callback leave the session usable.
pub async fn receive_upload(
    State(state): State<AppState>,
    Path(session): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let session_id = Uuid::parse_str(&session).map_err(|_| {
        AppError::from_service(ServiceError::UploadSessionNotFound, "receive_upload", "")
    })?;

    let session = with_timeout(
        state.storage_timeout,
        "open_upload_session",
        state.blobs.open_upload_session(session_id),
    )
    .await
    .map_err(|err| AppError::from_service(err, "receive_upload", ""))?;
    let identifier = session.identifier.as_str();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("malformed multipart body: {}", err)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // browsers send an unnamed, empty part when no file was chosen
        if field.file_name() == Some("") {
            return Err(AppError::bad_request("no file selected"));
        }

        let content_type = field.content_type().map(str::to_string);
        let stream = field.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        let object = state
            .blobs
            .put_object_stream(content_type, stream)
            .await
            .map_err(|err| AppError::from_service(err.into(), "store_upload", identifier))?;

        if object.size_bytes == 0 {
            discard_blob(&state, &object.path).await;
            return Err(AppError::bad_request("empty `file` field"));
        }

        let claimed = with_timeout(
            state.storage_timeout,
            "claim_upload_session",
            state.blobs.claim_upload_session(session_id),
        )
        .await;
        if let Err(err) = claimed {
            discard_blob(&state, &object.path).await;
            return Err(AppError::from_service(err, "receive_upload", identifier));
        }

        tracing::debug!(
            identifier,
            callback = %session.callback_path,
            object_path = %object.path,
            "upload stored, dispatching callback"
        );
        if let Err(err) = state.uploads.handle_callback(identifier, &object.path).await {
            if let Err(release_err) = state.blobs.release_upload_session(session_id).await {
                tracing::warn!(
                    identifier,
                    session = %session_id,
                    "failed to release upload session: {}",
                    release_err
                );
            }
            return Err(AppError::from_service(err, "upload_callback", identifier));
        }

        return Ok(Redirect::to("/"));
    }

    Err(AppError::bad_request("missing `file` field"))
}

/// Best-effort removal of a blob no avatar will point at.
async fn discard_blob(state: &AppState, object_path: &str) {
    if let Err(err) = state.blobs.delete_object(object_path).await {
        tracing::warn!(object_path, "failed to discard unused blob: {}", err);
    }
}
