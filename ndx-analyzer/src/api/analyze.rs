//! Synchronous analysis endpoint
//!
//! POST /api/analyze-demographics runs the whole pipeline inside the request
//! and returns `{results, summary}`.

use crate::api::client::client_id;
use crate::config::resolve_credentials;
use crate::models::{AnalysisRequest, Credentials};
use crate::services::{request_validator, RateDecision};
use crate::{ApiError, ApiResult, AppState};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use tokio_util::sync::CancellationToken;

/// Request that passed admission, validation and preflight
pub(crate) struct AdmittedRun {
    pub request: AnalysisRequest,
    pub credentials: Credentials,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl AdmittedRun {
    /// Attach X-RateLimit-* headers
    pub fn rate_limit_headers(&self, response: &mut Response) {
        let headers = response.headers_mut();
        headers.insert("x-ratelimit-remaining", HeaderValue::from(self.remaining));
        if let Ok(reset) =
            HeaderValue::from_str(&self.reset_at.to_rfc3339_opts(SecondsFormat::Secs, true))
        {
            headers.insert("x-ratelimit-reset", reset);
        }
    }
}

/// Rate limit, then validate, then check provider configuration
pub(crate) async fn admit(
    state: &AppState,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    body: &[u8],
) -> ApiResult<AdmittedRun> {
    let client = client_id(headers, peer);
    let (remaining, reset_at) = match state.rate_limiter.check(&client).await {
        RateDecision::Allowed {
            remaining,
            reset_at,
        } => (remaining, reset_at),
        RateDecision::Limited {
            retry_after_secs, ..
        } => return Err(ApiError::RateLimited { retry_after_secs }),
    };

    let raw: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?;
    let request = request_validator::validate(&raw)?;

    let credentials = resolve_credentials(&request.credentials, &state.config.providers);
    state.orchestrator.preflight(&request, &credentials)?;

    tracing::debug!(
        client = %client,
        names = request.names.len(),
        remaining,
        "Analysis request admitted"
    );

    Ok(AdmittedRun {
        request,
        credentials,
        remaining,
        reset_at,
    })
}

/// POST /api/analyze-demographics
pub async fn analyze_demographics(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let admitted = admit(&state, &headers, peer.map(|ConnectInfo(addr)| addr), &body).await?;

    let outcome = state
        .orchestrator
        .run(
            &admitted.request,
            &admitted.credentials,
            &CancellationToken::new(),
            &AtomicUsize::new(0),
        )
        .await?;

    let mut response = Json(outcome.response).into_response();
    admitted.rate_limit_headers(&mut response);
    Ok(response)
}

/// Build synchronous analysis routes
pub fn analyze_routes() -> Router<AppState> {
    Router::new().route("/api/analyze-demographics", post(analyze_demographics))
}
