//! Shared API types for NDX services

pub mod types;

pub use types::{
    AnalysisResponse, AnalysisType, Gender, NameResult, Prediction, ProviderId, RunSummary,
};
