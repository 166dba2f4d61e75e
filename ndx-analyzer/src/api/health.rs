//! Health check endpoint
//!
//! Read-only report of uptime, provider credential status and feature flags.
//! Nothing here feeds back into the pipeline.

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use ndx_common::api::ProviderId;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::{provider_status, ProviderStatus};
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("ndx-analyzer")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Short commit hash captured at build time
    pub git_hash: String,
    pub build_timestamp: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
    /// Server-side credential status per provider
    pub apis: BTreeMap<ProviderId, ProviderStatus>,
    pub features: FeatureFlags,
    /// Background runs currently in flight
    pub active_runs: usize,
    /// Last error message if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    pub gender_analysis: bool,
    pub origin_analysis: bool,
    pub age_analysis: bool,
}

/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Utc::now();
    let uptime_seconds = now.signed_duration_since(state.startup_time).num_seconds().max(0) as u64;

    let apis = ProviderId::ALL
        .into_iter()
        .map(|provider| (provider, provider_status(provider, &state.config.providers)))
        .collect();

    let features = FeatureFlags {
        gender_analysis: true,
        origin_analysis: state.config.features.origin_analysis,
        age_analysis: state.config.features.age_analysis,
    };

    let active_runs = state.cancellation_tokens.read().await.len();
    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "ndx-analyzer".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("NDX_GIT_HASH").to_string(),
        build_timestamp: env!("NDX_BUILD_TIMESTAMP").to_string(),
        uptime_seconds,
        timestamp: now,
        apis,
        features,
        active_runs,
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/api/health", get(health_check))
}
