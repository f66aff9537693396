//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use voxgate::{AppState, ServerConfig, routes};

pub const ADMIN_SECRET: &str = "vg_admin_secret_for_tests_0001";

/// App with authentication required and a seeded admin key
pub async fn authed_app() -> (Router, Arc<AppState>) {
    let mut config = ServerConfig::default();
    config.admin_api_key = Some(ADMIN_SECRET.to_string());
    let state = Arc::new(AppState::new(config).await.unwrap());
    (routes::build_router(state.clone()), state)
}

/// App with authentication disabled (development mode)
pub async fn open_app() -> (Router, Arc<AppState>) {
    let mut config = ServerConfig::default();
    config.auth_required = false;
    let state = Arc::new(AppState::new(config).await.unwrap());
    (routes::build_router(state.clone()), state)
}

pub fn get(path: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(
    method: &str,
    path: &str,
    api_key: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

/// Assert the standard error envelope and return its code
pub async fn error_code(response: Response<Body>, expected_status: StatusCode) -> String {
    assert_eq!(response.status(), expected_status);
    let body = body_json(response).await;
    assert!(body["error"]["request_id"].is_string());
    body["error"]["code"].as_str().unwrap().to_string()
}
