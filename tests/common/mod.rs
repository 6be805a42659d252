#![allow(dead_code)]

use avatar_store::{
    config::{AppConfig, Args},
    db,
    state::AppState,
};
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use clap::Parser;
use http_body_util::BodyExt;
use sqlx::sqlite::SqlitePoolOptions;
use std::{path::PathBuf, sync::Arc};
use tempfile::TempDir;
use tower::ServiceExt;

pub const BUCKET: &str = "test-app.default";
pub const MARKER: &str = "x-accel-redirect";
pub const BOUNDARY: &str = "avatar-test-boundary";

/// Router plus the temp directory and pool it runs on.
pub struct TestContext {
    pub router: Router,
    pub state: AppState,
    pub storage_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_flags(&[]).await
    }

    pub async fn with_flags(extra: &[&str]) -> Self {
        let storage_dir = tempfile::tempdir().expect("create temp dir");
        let storage = storage_dir.path().to_string_lossy().into_owned();

        let mut argv = vec![
            "avatar-store",
            "--storage-dir",
            storage.as_str(),
            "--database-url",
            "sqlite::memory:",
            "--bucket",
            BUCKET,
            "--direct-serve-header",
            MARKER,
            "--direct-serve-prefix",
            "/_blobs",
            "--storage-timeout-secs",
            "5",
        ];
        argv.extend_from_slice(extra);
        let cfg = AppConfig::from_args(Args::try_parse_from(argv).expect("parse args"))
            .expect("build config");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("open in-memory sqlite");
        db::run_migrations(&pool).await.expect("apply schema");

        let state = AppState::new(Arc::new(pool), &cfg).expect("build state");
        let router = avatar_store::app(state.clone());
        Self {
            router,
            state,
            storage_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn get_if_none_match(&self, uri: &str, etag: &str) -> Response<Body> {
        self.send(
            Request::get(uri)
                .header(header::IF_NONE_MATCH, etag)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_multipart(&self, uri: &str, body: Vec<u8>) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Callback as the storage layer would send it.
    pub async fn callback(&self, identifier: &str, object_path: &str) -> Response<Body> {
        self.post_multipart(
            &format!("/avatar/{identifier}"),
            text_part("file", object_path),
        )
        .await
    }

    /// Place a blob directly in storage with a known etag.
    pub async fn seed_blob(&self, object_path: &str, etag: &str, content_type: Option<&str>) {
        let file = self.blob_file(object_path);
        tokio::fs::create_dir_all(file.parent().unwrap()).await.unwrap();
        tokio::fs::write(&file, b"png-bytes").await.unwrap();
        sqlx::query(
            "INSERT INTO objects (path, content_type, size_bytes, etag, last_modified)
             VALUES (?, ?, 9, ?, 1700000000)",
        )
        .bind(object_path)
        .bind(content_type)
        .bind(etag)
        .execute(&*self.state.db)
        .await
        .unwrap();
    }

    pub fn blob_file(&self, object_path: &str) -> PathBuf {
        self.storage_dir
            .path()
            .join(object_path.trim_start_matches('/'))
    }

    /// Render `/` and pull the form's upload URL out of it.
    pub async fn upload_url(&self) -> String {
        let html = body_string(self.get("/").await).await;
        let start = html.find("action=\"").expect("form action") + "action=\"".len();
        let end = start + html[start..].find('"').unwrap();
        html[start..end].to_string()
    }
}

pub fn text_part(name: &str, value: &str) -> Vec<u8> {
    format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n--{BOUNDARY}--\r\n"
    )
    .into_bytes()
}

pub fn file_part(name: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"avatar.png\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes()
        .to_vec()
}

pub async fn body_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).expect("utf-8 body")
}

pub fn header_str<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
