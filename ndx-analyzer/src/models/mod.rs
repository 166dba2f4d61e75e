//! Data models for the analyzer service

pub mod analysis_request;
pub mod run;

pub use analysis_request::{AnalysisRequest, Credentials};
pub use run::{RunRecord, RunState, StateTransition};
