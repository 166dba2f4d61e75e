//! Background analysis runs
//!
//! - POST /api/runs starts a run and returns 202 with its id
//! - GET /api/runs/:run_id polls progress and, once terminal, the response
//! - POST /api/runs/:run_id/cancel requests cooperative cancellation
//!
//! Finished runs stay in memory up to `pipeline.max_retained_runs`; the
//! oldest finished run is evicted first.

use crate::api::analyze::admit;
use crate::models::{RunRecord, RunState};
use crate::services::{ConfigurationError, RunOutcome};
use crate::{ApiError, ApiResult, AppState};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use ndx_common::api::{NameResult, RunSummary};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Stored run with its live progress counter
#[derive(Debug, Clone)]
pub struct RunEntry {
    pub record: RunRecord,
    pub progress: Arc<AtomicUsize>,
}

impl RunEntry {
    fn status(&self) -> RunStatusResponse {
        let record = &self.record;
        let processed = if record.is_terminal() {
            record.processed
        } else {
            self.progress.load(Ordering::Acquire)
        };
        RunStatusResponse {
            run_id: record.run_id,
            state: record.state,
            processed,
            total: record.total,
            started_at: record.started_at,
            ended_at: record.ended_at,
            results: record.response.as_ref().map(|r| r.results.clone()),
            summary: record.response.as_ref().map(|r| r.summary.clone()),
            error: record.error.clone(),
        }
    }
}

/// POST /api/runs response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStartedResponse {
    pub run_id: Uuid,
    pub state: RunState,
    pub total: usize,
    pub started_at: DateTime<Utc>,
}

/// GET /api/runs/:run_id response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusResponse {
    pub run_id: Uuid,
    pub state: RunState,
    pub processed: usize,
    pub total: usize,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<NameResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /api/runs/:run_id/cancel response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub run_id: Uuid,
    pub state: RunState,
    pub message: String,
}

/// POST /api/runs
pub async fn start_run(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let admitted = admit(&state, &headers, peer.map(|ConnectInfo(addr)| addr), &body).await?;

    let record = RunRecord::new(admitted.request.names.len());
    let run_id = record.run_id;
    let progress = Arc::new(AtomicUsize::new(0));
    let cancel_token = CancellationToken::new();

    let started = RunStartedResponse {
        run_id,
        state: record.state,
        total: record.total,
        started_at: record.started_at,
    };
    let mut response = (StatusCode::ACCEPTED, Json(started)).into_response();
    admitted.rate_limit_headers(&mut response);

    state.runs.write().await.insert(
        run_id,
        RunEntry {
            record,
            progress: progress.clone(),
        },
    );
    state
        .cancellation_tokens
        .write()
        .await
        .insert(run_id, cancel_token.clone());

    tracing::info!(
        run_id = %run_id,
        names = admitted.request.names.len(),
        "Background run accepted"
    );

    let task_state = state.clone();
    let span = tracing::info_span!("run", run_id = %run_id);
    tokio::spawn(
        async move {
            let orchestrator = task_state.orchestrator.clone();
            // Inner task so a panic surfaces as a JoinError instead of a lost run
            let worker = tokio::spawn(
                async move {
                    orchestrator
                        .run(
                            &admitted.request,
                            &admitted.credentials,
                            &cancel_token,
                            &progress,
                        )
                        .await
                }
                .in_current_span(),
            );

            finish_run(&task_state, run_id, worker.await).await;
        }
        .instrument(span),
    );

    Ok(response)
}

/// Settle a run record once its worker returns
async fn finish_run(
    state: &AppState,
    run_id: Uuid,
    result: Result<Result<RunOutcome, ConfigurationError>, JoinError>,
) {
    state.cancellation_tokens.write().await.remove(&run_id);

    let mut runs = state.runs.write().await;
    let Some(entry) = runs.get_mut(&run_id) else {
        tracing::warn!(run_id = %run_id, "Finished run no longer tracked");
        return;
    };

    let transition = match result {
        Ok(Ok(outcome)) => entry.record.finish(outcome.response, outcome.cancelled),
        Ok(Err(err)) => entry.record.fail(err.to_string()),
        Err(join_err) => {
            let message = format!("Run worker failed: {}", join_err);
            *state.last_error.write().await = Some(message.clone());
            entry.record.fail(message)
        }
    };

    tracing::info!(
        run_id = %run_id,
        old_state = ?transition.old_state,
        new_state = ?transition.new_state,
        processed = entry.record.processed,
        "Background run finished"
    );

    evict_finished_runs(&mut runs, state.config.pipeline.max_retained_runs);
}

/// Drop the oldest finished runs beyond `max_retained`
pub fn evict_finished_runs(runs: &mut HashMap<Uuid, RunEntry>, max_retained: usize) {
    let mut finished: Vec<(DateTime<Utc>, Uuid)> = runs
        .values()
        .filter(|entry| entry.record.is_terminal())
        .map(|entry| {
            let ended = entry.record.ended_at.unwrap_or(entry.record.started_at);
            (ended, entry.record.run_id)
        })
        .collect();

    if finished.len() <= max_retained {
        return;
    }

    finished.sort();
    let excess = finished.len() - max_retained;
    for (_, run_id) in finished.into_iter().take(excess) {
        runs.remove(&run_id);
        tracing::debug!(run_id = %run_id, "Evicted finished run");
    }
}

/// GET /api/runs/:run_id
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<RunStatusResponse>> {
    let runs = state.runs.read().await;
    let entry = runs
        .get(&run_id)
        .ok_or_else(|| ApiError::NotFound(format!("Run {}", run_id)))?;
    Ok(Json(entry.status()))
}

/// POST /api/runs/:run_id/cancel
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<CancelResponse>> {
    let current_state = {
        let runs = state.runs.read().await;
        let entry = runs
            .get(&run_id)
            .ok_or_else(|| ApiError::NotFound(format!("Run {}", run_id)))?;
        entry.record.state
    };

    if current_state.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "Run {} already finished ({:?})",
            run_id, current_state
        )));
    }

    if let Some(token) = state.cancellation_tokens.read().await.get(&run_id) {
        token.cancel();
    }

    tracing::info!(run_id = %run_id, "Run cancellation requested");

    Ok(Json(CancelResponse {
        run_id,
        state: current_state,
        message: "Cancellation requested".to_string(),
    }))
}

/// Build background run routes
pub fn run_routes() -> Router<AppState> {
    Router::new()
        .route("/api/runs", post(start_run))
        .route("/api/runs/:run_id", get(get_run))
        .route("/api/runs/:run_id/cancel", post(cancel_run))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(state: RunState, ended_offset_secs: i64) -> RunEntry {
        let mut record = RunRecord::new(1);
        if state.is_terminal() {
            record.transition_to(state);
            record.ended_at = Some(Utc::now() + chrono::Duration::seconds(ended_offset_secs));
        }
        RunEntry {
            record,
            progress: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[test]
    fn test_eviction_keeps_running_and_newest_finished() {
        let mut runs = HashMap::new();
        let running = entry(RunState::Running, 0);
        let old = entry(RunState::Completed, -30);
        let newer = entry(RunState::Cancelled, -10);
        let newest = entry(RunState::Failed, 0);
        let ids = [
            running.record.run_id,
            old.record.run_id,
            newer.record.run_id,
            newest.record.run_id,
        ];
        for e in [running, old, newer, newest] {
            runs.insert(e.record.run_id, e);
        }

        evict_finished_runs(&mut runs, 2);

        assert!(runs.contains_key(&ids[0]));
        assert!(!runs.contains_key(&ids[1]));
        assert!(runs.contains_key(&ids[2]));
        assert!(runs.contains_key(&ids[3]));
    }

    #[test]
    fn test_running_status_reads_live_progress() {
        let e = entry(RunState::Running, 0);
        e.progress.store(7, Ordering::Release);
        let status = e.status();
        assert_eq!(status.processed, 7);
        assert!(status.results.is_none());
    }
}
