//! ndx-analyzer library interface
//!
//! Name demographics enrichment service. Exposes the router and state for the
//! binary and for integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use crate::api::runs::RunEntry;
use crate::services::{AnalysisOrchestrator, ProviderRegistry, RateLimiter};
use axum::Router;
use chrono::{DateTime, Utc};
use ndx_common::config::ServiceConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub orchestrator: Arc<AnalysisOrchestrator>,
    /// Per-client admission limiter, consulted before a run is accepted
    pub rate_limiter: Arc<RateLimiter>,
    /// Background runs, in flight and retained finished ones
    pub runs: Arc<RwLock<HashMap<Uuid, RunEntry>>>,
    /// Cancellation tokens for in-flight background runs
    pub cancellation_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last internal error for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// State with the built-in provider registry
    pub fn new(config: ServiceConfig) -> ndx_common::Result<Self> {
        let registry = ProviderRegistry::from_config(&config)?;
        let orchestrator = AnalysisOrchestrator::new(Arc::new(registry), &config);
        Ok(Self::with_orchestrator(config, orchestrator))
    }

    /// State around an existing orchestrator (custom registries, test fakes)
    pub fn with_orchestrator(config: ServiceConfig, orchestrator: AnalysisOrchestrator) -> Self {
        Self {
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            runs: Arc::new(RwLock::new(HashMap::new())),
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Cancel every in-flight background run; returns how many were signalled
    pub async fn cancel_all_runs(&self) -> usize {
        let tokens = self.cancellation_tokens.read().await;
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::analyze_routes())
        .merge(api::run_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
