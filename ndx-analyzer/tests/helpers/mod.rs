//! Test Helper Utilities
//!
//! Shared utilities for testing ndx-analyzer: in-process app construction,
//! request helpers and simulated provider servers.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use ndx_analyzer::AppState;
use ndx_common::config::ServiceConfig;
use serde_json::Value;
use std::time::Duration;
use tower::util::ServiceExt;

/// Defaults with no pacing, a short provider timeout and no server keys
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.pipeline.pacing_ms = 0;
    config.pipeline.provider_timeout_secs = 1;
    config.providers.openrouter_api_key = None;
    config.providers.perplexity_api_key = None;
    config
}

/// Test helper: create test app from a config
pub fn create_test_app(config: ServiceConfig) -> (Router, AppState) {
    let state = AppState::new(config).expect("Failed to build app state");
    (ndx_analyzer::build_router(state.clone()), state)
}

/// Serve a simulated provider on an ephemeral local port
pub async fn spawn_provider(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind provider listener");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{}", addr)
}

pub async fn post_json(app: &Router, uri: &str, body: &Value) -> Response {
    post_json_from(app, uri, body, None).await
}

/// POST with an optional X-Forwarded-For client identity
pub async fn post_json_from(
    app: &Router,
    uri: &str,
    body: &Value,
    client: Option<&str>,
) -> Response {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(client) = client {
        builder = builder.header("x-forwarded-for", client);
    }
    app.clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// Poll a background run until it reaches a terminal state
pub async fn wait_for_terminal(app: &Router, run_id: &str) -> Value {
    for _ in 0..200 {
        let response = get(app, &format!("/api/runs/{}", run_id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let status = body_json(response).await;
        if status["state"] != "RUNNING" {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("run {} did not finish", run_id);
}
