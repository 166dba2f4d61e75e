//! Enrichment pipeline services
//!
//! Leaf-first: name normalization, request validation, classifiers and their
//! registry, the per-client admission limiter, the orchestrator and the
//! result aggregator.

pub mod aggregator;
pub mod name_normalizer;
pub mod orchestrator;
pub mod providers;
pub mod rate_limiter;
pub mod request_validator;

pub use orchestrator::{AnalysisOrchestrator, RunOutcome};
pub use providers::{Classifier, ConfigurationError, ProviderError, ProviderRegistry};
pub use rate_limiter::{RateDecision, RateLimiter};
pub use request_validator::ValidationError;
