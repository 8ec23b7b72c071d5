#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use metrion_server::app;
use metrion_server::state::AppState;
use metrion_storage::file::FileSink;
use metrion_storage::{LayeredStorage, SyncStorage};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: Router,
}

/// Server over a pure in-memory store.
pub fn build_test_context() -> TestContext {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let storage: Arc<dyn SyncStorage> = Arc::new(LayeredStorage::memory());
    let state = AppState::new(storage);
    let app = app::build_http_app(state.clone());
    TestContext {
        temp_dir,
        state,
        app,
    }
}

/// Server customized through its state (hash key, decryptor, subnet).
pub fn build_context_with(customize: impl FnOnce(AppState) -> AppState) -> TestContext {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let storage: Arc<dyn SyncStorage> = Arc::new(LayeredStorage::memory());
    let state = customize(AppState::new(storage));
    let app = app::build_http_app(state.clone());
    TestContext {
        temp_dir,
        state,
        app,
    }
}

/// Server over a sync-mode file-backed store at `path`.
pub async fn build_file_context(path: &Path, restore: bool) -> TestContext {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sink = Arc::new(FileSink::new(path));
    let storage: Arc<dyn SyncStorage> = Arc::new(
        LayeredStorage::open(sink, true, restore)
            .await
            .expect("open layered storage"),
    );
    let state = AppState::new(storage);
    let app = app::build_http_app(state.clone());
    TestContext {
        temp_dir,
        state,
        app,
    }
}

/// Sends one request and returns `(status, body bytes)`.
pub async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    body: Vec<u8>,
    headers: &[(&str, &str)],
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(body)).expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, bytes.to_vec())
}

pub async fn request_text(
    app: &Router,
    method: &str,
    uri: &str,
) -> (StatusCode, String) {
    let (status, body) = request(app, method, uri, Vec::new(), &[]).await;
    (status, String::from_utf8_lossy(&body).to_string())
}

pub async fn request_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Vec<u8>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let (status, bytes) = request(app, method, uri, body, headers).await;
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}
