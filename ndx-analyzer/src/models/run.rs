//! Background analysis run state machine
//!
//! A run starts in RUNNING and ends in exactly one of COMPLETED, CANCELLED or
//! FAILED. Terminal runs carry their (possibly partial) response.

use chrono::{DateTime, Utc};
use ndx_common::api::AnalysisResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Background run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    /// Names are being classified
    Running,
    /// Every name produced a result
    Completed,
    /// Stopped by the caller; results are partial
    Cancelled,
    /// Aborted by an internal error
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Cancelled | RunState::Failed)
    }
}

/// Recorded state change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: RunState,
    pub new_state: RunState,
    pub transitioned_at: DateTime<Utc>,
}

/// In-memory record of one background run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: Uuid,
    pub state: RunState,
    /// Names classified so far
    pub processed: usize,
    /// Names accepted by validation
    pub total: usize,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Set once the run is terminal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<AnalysisResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    pub fn new(total: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: RunState::Running,
            processed: 0,
            total,
            started_at: Utc::now(),
            ended_at: None,
            response: None,
            error: None,
        }
    }

    /// Move to a new state, stamping the end time for terminal states
    pub fn transition_to(&mut self, new_state: RunState) -> StateTransition {
        let transition = StateTransition {
            run_id: self.run_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        transition
    }

    /// Store the final response and settle the state
    pub fn finish(&mut self, response: AnalysisResponse, cancelled: bool) -> StateTransition {
        self.processed = response.summary.processed;
        self.response = Some(response);
        self.transition_to(if cancelled {
            RunState::Cancelled
        } else {
            RunState::Completed
        })
    }

    /// Record an internal failure
    pub fn fail(&mut self, error: impl Into<String>) -> StateTransition {
        self.error = Some(error.into());
        self.transition_to(RunState::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
