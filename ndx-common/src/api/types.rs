//! Shared analysis request/response types
//!
//! These types form the wire contract between the analyzer service and its
//! callers (browser front end, export tooling). Field names are camelCase on
//! the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ========================================
// Enumerations
// ========================================

/// Kind of demographic prediction requested for each name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Gender,
    Origin,
    Age,
}

impl AnalysisType {
    /// Every analysis type accepted by the validator
    pub const ALL: [AnalysisType; 3] = [AnalysisType::Gender, AnalysisType::Origin, AnalysisType::Age];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Gender => "gender",
            AnalysisType::Origin => "origin",
            AnalysisType::Age => "age",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Invalid analysis type: {}", s))
    }
}

/// Identifier of a classification provider
///
/// A provider id is global; the same id may serve several analysis types once
/// the corresponding classifiers exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Local rule-based classifier (no external dependency)
    Simple,
    /// genderize.io statistics endpoint
    Genderize,
    /// OpenRouter chat completion API
    OpenRouter,
    /// Perplexity chat completion API
    Perplexity,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::Simple,
        ProviderId::Genderize,
        ProviderId::OpenRouter,
        ProviderId::Perplexity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Simple => "simple",
            ProviderId::Genderize => "genderize",
            ProviderId::OpenRouter => "openrouter",
            ProviderId::Perplexity => "perplexity",
        }
    }

    /// Human-readable provider name
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::Simple => "Simple Rules",
            ProviderId::Genderize => "Genderize.io",
            ProviderId::OpenRouter => "OpenRouter",
            ProviderId::Perplexity => "Perplexity AI",
        }
    }

    /// Whether the provider cannot run without a caller or server credential
    pub fn requires_credential(&self) -> bool {
        matches!(self, ProviderId::OpenRouter | ProviderId::Perplexity)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Unknown provider: {}", s))
    }
}

/// Gender prediction label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ========================================
// Prediction
// ========================================

/// Output of one classifier invocation for one (name, analysis type) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// Predicted label
    pub value: Gender,

    /// Reliability estimate, 0-100
    pub confidence: u8,

    /// Provider that produced this value (the fallback provider when one fired)
    pub provider: ProviderId,

    /// True when the value came from the fallback path
    #[serde(default)]
    pub fallback: bool,

    /// Failure that still produced a best-effort value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Primary provider failure recovered by the fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_error: Option<String>,

    /// Classification method label (e.g. "rule-based")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Provider-specific auxiliary fields, opaque to the orchestrator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Prediction {
    /// Create a prediction; confidence is clamped to 100
    pub fn new(value: Gender, confidence: u8, provider: ProviderId) -> Self {
        Self {
            value,
            confidence: confidence.min(100),
            provider,
            fallback: false,
            error: None,
            original_error: None,
            method: None,
            metadata: None,
        }
    }

    /// Terminal floor record: `unknown@0` carrying the failure message
    pub fn failure(provider: ProviderId, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(Gender::Unknown, 0, provider)
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

// ========================================
// Results
// ========================================

/// Per-name analysis record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameResult {
    /// Original input string, unmodified
    pub name: String,

    /// Normalized first-name query key
    pub first_name: String,

    /// One prediction per requested analysis type
    pub demographics: BTreeMap<AnalysisType, Prediction>,
}

impl NameResult {
    pub fn any_error(&self) -> bool {
        self.demographics.values().any(Prediction::has_error)
    }

    pub fn any_fallback(&self) -> bool {
        self.demographics.values().any(|p| p.fallback)
    }
}

/// Aggregate counters for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Number of names processed (less than the input when cancelled)
    pub processed: usize,

    /// Names with at least one prediction carrying an error
    pub failed: usize,

    /// Names with at least one fallback prediction
    pub fallbacks: usize,

    /// Echo of the requested analysis types
    pub analysis_types: Vec<AnalysisType>,
}

/// Response body of a completed (or cancelled) run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub results: Vec<NameResult>,
    pub summary: RunSummary,
}
