#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use speechpace_api::config::ServerConfig;
use speechpace_api::router::build_app_router;
use speechpace_api::state::AppState;
use speechpace_core::dispatch::Dispatcher;
use speechpace_core::mock::{MockLauncher, MockLocator};
use tower::ServiceExt;

/// Origin allowed by [`test_config`].
pub const TEST_ORIGIN: &str = "http://localhost:3000";

/// Build a test `ServerConfig` with the development defaults, a short
/// script timeout, and the given fallback policy.
pub fn test_config(retry_on_bad_output: bool) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        script_timeout_secs: 1,
        request_timeout_secs: 5,
        retry_on_bad_output,
        ..ServerConfig::default()
    }
}

/// Build the full application router around a mock launcher and locator.
///
/// Goes through [`build_app_router`] so tests exercise the same middleware
/// stack (CORS, request ID, timeout, tracing, panic recovery) as production.
pub fn build_test_app_with(
    launcher: &MockLauncher,
    locator: MockLocator,
    config: ServerConfig,
) -> Router {
    let dispatcher = Dispatcher::new(
        Arc::new(launcher.clone()),
        Arc::new(locator),
        config.dispatch_config(),
    );
    let state = AppState {
        config: Arc::new(config.clone()),
        dispatcher: Arc::new(dispatcher),
    };
    build_app_router(state, &config)
}

/// Default app: consistent fallback policy, no scripts on disk.
pub fn build_test_app(launcher: &MockLauncher) -> Router {
    build_test_app_with(launcher, MockLocator::empty(), test_config(true))
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    post_raw(app, uri, serde_json::to_vec(&body).unwrap()).await
}

pub async fn post_raw(app: Router, uri: &str, body: impl Into<Body>) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
