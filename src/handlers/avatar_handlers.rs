//! `/avatar/{identifier}`: conditional retrieval and the upload callback.

use crate::{
    errors::AppError, services::avatar_service::FreshnessHeaders, state::AppState,
};
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use tokio_util::io::ReaderStream;

/// Multipart field carrying the stored object's path in a callback.
pub const FILE_FIELD: &str = "file";

/// `GET /avatar/{identifier}`
///
/// 200 with the direct-serve marker when the client copy is stale or absent,
/// 304 with freshness headers only when `If-None-Match` equals the ETag.
pub async fn get_avatar(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());

    let retrieval = state
        .avatars
        .retrieve(&identifier, if_none_match)
        .await
        .map_err(|err| AppError::from_service(err, "retrieve_avatar", &identifier))?;
    let fresh = retrieval.headers;

    if fresh.not_modified() {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        set_freshness_headers(
            response.headers_mut(),
            &fresh,
            &state.direct_serve_header,
            &identifier,
        )?;
        return Ok(response);
    }

    let body = if state.stream_blobs {
        let file = state
            .avatars
            .open_blob(&retrieval.avatar)
            .await
            .map_err(|err| AppError::from_service(err, "open_blob", &identifier))?;
        Body::from_stream(ReaderStream::new(file))
    } else {
        Body::empty()
    };

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_freshness_headers(
        response.headers_mut(),
        &fresh,
        &state.direct_serve_header,
        &identifier,
    )?;
    Ok(response)
}

/// `POST /avatar/{identifier}`
///
/// Invoked by the storage layer once an upload is stored. The `file` field
/// holds the object path; the avatar record is created or re-pointed and the
/// client is sent back to the listing.
pub async fn upload_callback(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(identifier = %identifier, "Creating avatar...");

    let object_path = read_file_reference(multipart).await?;
    state
        .uploads
        .handle_callback(&identifier, &object_path)
        .await
        .map_err(|err| AppError::from_service(err, "upload_callback", &identifier))?;

    Ok(Redirect::to("/"))
}

/// Pull the object path out of the callback form, rejecting payloads
/// without a non-empty `file` field.
async fn read_file_reference(mut multipart: Multipart) -> Result<String, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("malformed multipart body: {}", err)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let value = field
            .text()
            .await
            .map_err(|err| AppError::bad_request(format!("unreadable `file` field: {}", err)))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(AppError::bad_request("empty `file` field"));
        }
        return Ok(value.to_string());
    }

    Err(AppError::bad_request("missing `file` field"))
}

fn set_freshness_headers(
    headers: &mut HeaderMap,
    fresh: &FreshnessHeaders,
    marker: &HeaderName,
    identifier: &str,
) -> Result<(), AppError> {
    let value = |s: &str| {
        HeaderValue::from_str(s)
            .map_err(|_| AppError::internal(format!("unrepresentable header value `{}`", s)))
    };

    headers.insert(header::LAST_MODIFIED, value(&fresh.last_modified)?);
    headers.insert(header::ETAG, value(&fresh.etag)?);
    if let Some(content_type) = fresh.content_type.as_deref() {
        match HeaderValue::from_str(content_type) {
            Ok(v) => {
                headers.insert(header::CONTENT_TYPE, v);
            }
            Err(_) => tracing::warn!(
                identifier,
                content_type,
                "stored content type is not a valid header value, omitting it"
            ),
        }
    }
    if let Some(key) = fresh.direct_serve.as_deref() {
        headers.insert(marker.clone(), value(key)?);
    }
    Ok(())
}
