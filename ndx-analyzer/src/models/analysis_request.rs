//! Validated analysis request and per-run credentials

use ndx_common::api::{AnalysisType, ProviderId};
use ndx_common::config::{is_valid_key, ProvidersConfig};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum names accepted per request
pub const MAX_NAMES: usize = 1000;

/// Maximum characters per (trimmed) name
pub const MAX_NAME_CHARS: usize = 200;

/// Batch size when the caller does not set one
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Inclusive batch size bounds
pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 50;

/// Sanitized, bounded analysis request
///
/// Only produced by the request validator; the orchestrator reads it and never
/// mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    /// Trimmed names in input order, 1..=1000 entries
    pub names: Vec<String>,
    /// Requested analysis types, duplicates removed, first-seen order
    pub analysis_types: Vec<AnalysisType>,
    /// Provider per analysis type; every requested type has an entry
    pub providers: BTreeMap<AnalysisType, ProviderId>,
    /// Caller-supplied secrets
    pub credentials: Credentials,
    /// Names per pacing batch, 1..=50
    pub batch_size: usize,
}

impl AnalysisRequest {
    /// Provider selected for an analysis type
    pub fn provider_for(&self, analysis_type: AnalysisType) -> Option<ProviderId> {
        self.providers.get(&analysis_type).copied()
    }
}

/// Provider credentials for one run
///
/// Opaque secrets keyed by provider. The `Debug` output never shows values.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials(BTreeMap<ProviderId, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a credential; blank values are ignored
    pub fn insert(&mut self, provider: ProviderId, secret: impl Into<String>) {
        let secret = secret.into();
        if is_valid_key(&secret) {
            self.0.insert(provider, secret);
        }
    }

    pub fn get(&self, provider: ProviderId) -> Option<&str> {
        self.0.get(&provider).map(String::as_str)
    }

    pub fn contains(&self, provider: ProviderId) -> bool {
        self.0.contains_key(&provider)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fill providers the caller did not supply from server configuration
    ///
    /// Caller-supplied credentials take priority over server keys.
    pub fn with_server_defaults(mut self, config: &ProvidersConfig) -> Self {
        for provider in ProviderId::ALL {
            if self.contains(provider) {
                continue;
            }
            if let Some(key) = config.api_key(provider) {
                tracing::debug!(provider = %provider, "Using server-configured credential");
                self.0.insert(provider, key.to_string());
            }
        }
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|provider| (provider, "<redacted>")))
            .finish()
    }
}

impl FromIterator<(ProviderId, String)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (ProviderId, String)>>(iter: I) -> Self {
        let mut credentials = Credentials::new();
        for (provider, secret) in iter {
            credentials.insert(provider, secret);
        }
        credentials
    }
}
