//! Result aggregation
//!
//! Pure fold over completed name results into the response shape.

use ndx_common::api::{AnalysisResponse, AnalysisType, NameResult, RunSummary};

/// Count processed, failed and fallback names
pub fn summarize(results: &[NameResult], analysis_types: &[AnalysisType]) -> RunSummary {
    RunSummary {
        processed: results.len(),
        failed: results.iter().filter(|r| r.any_error()).count(),
        fallbacks: results.iter().filter(|r| r.any_fallback()).count(),
        analysis_types: analysis_types.to_vec(),
    }
}

pub fn build_response(results: Vec<NameResult>, analysis_types: &[AnalysisType]) -> AnalysisResponse {
    let summary = summarize(&results, analysis_types);
    AnalysisResponse { results, summary }
}
