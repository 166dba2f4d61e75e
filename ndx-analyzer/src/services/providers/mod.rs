//! Classification providers
//!
//! Every provider implements [`Classifier`] for one analysis type. The
//! [`ProviderRegistry`] maps `(analysis type, provider id)` pairs to
//! classifiers and is built once at startup; unknown pairs and missing
//! credentials are rejected before a run starts.

pub mod genderize;
pub mod model_backed;
pub mod simple;

pub use genderize::GenderizeClassifier;
pub use model_backed::ModelClassifier;
pub use simple::SimpleClassifier;

use crate::models::{AnalysisRequest, Credentials};
use async_trait::async_trait;
use ndx_common::api::{AnalysisType, Prediction, ProviderId};
use ndx_common::config::ServiceConfig;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// User-Agent sent with every outbound request
pub const USER_AGENT: &str = concat!("NDX-Analyzer/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure of one classifier call for one name
///
/// Recovered by the orchestrator's fallback policy; never fails a run.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0} API key not configured")]
    MissingCredential(&'static str),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Network(format!("request timed out: {}", err))
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// Run-level configuration problem, reported before any name is processed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Provider {provider} does not support {analysis_type} analysis")]
    UnsupportedProvider {
        analysis_type: AnalysisType,
        provider: ProviderId,
    },

    #[error("{} API key not configured", .provider.display_name())]
    MissingCredential { provider: ProviderId },
}

/// Single classification capability
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Provider this classifier implements
    fn provider(&self) -> ProviderId;

    /// Whether a credential must be present before a run may start
    fn requires_credential(&self) -> bool {
        self.provider().requires_credential()
    }

    /// Classify one first name
    ///
    /// Failures may be reported either as `Err` or as an `Ok` prediction with
    /// `error` set; the orchestrator treats both as a primary failure.
    async fn classify(
        &self,
        first_name: &str,
        credentials: &Credentials,
    ) -> Result<Prediction, ProviderError>;
}

/// Static capability table: `(analysis type, provider id) -> classifier`
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    classifiers: HashMap<(AnalysisType, ProviderId), Arc<dyn Classifier>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in gender classifier
    pub fn from_config(config: &ServiceConfig) -> ndx_common::Result<Self> {
        let timeout = config.pipeline.provider_timeout();
        let providers = &config.providers;
        let client = http_client(timeout)?;

        let mut registry = Self::new();
        registry.register(AnalysisType::Gender, Arc::new(SimpleClassifier::new()));
        registry.register(
            AnalysisType::Gender,
            Arc::new(GenderizeClassifier::new(
                client.clone(),
                providers.genderize_url.clone(),
            )),
        );
        registry.register(
            AnalysisType::Gender,
            Arc::new(ModelClassifier::openrouter(
                client.clone(),
                providers.openrouter_url.clone(),
                providers.openrouter_model.clone(),
                providers.app_url.clone(),
            )),
        );
        registry.register(
            AnalysisType::Gender,
            Arc::new(ModelClassifier::perplexity(
                client,
                providers.perplexity_url.clone(),
                providers.perplexity_model.clone(),
            )),
        );

        tracing::info!(
            classifiers = registry.len(),
            timeout_secs = timeout.as_secs(),
            "Provider registry initialized"
        );
        Ok(registry)
    }

    /// Add or replace the classifier for its provider under `analysis_type`
    pub fn register(&mut self, analysis_type: AnalysisType, classifier: Arc<dyn Classifier>) {
        self.classifiers
            .insert((analysis_type, classifier.provider()), classifier);
    }

    pub fn get(
        &self,
        analysis_type: AnalysisType,
        provider: ProviderId,
    ) -> Option<Arc<dyn Classifier>> {
        self.classifiers.get(&(analysis_type, provider)).cloned()
    }

    pub fn supports(&self, analysis_type: AnalysisType, provider: ProviderId) -> bool {
        self.classifiers.contains_key(&(analysis_type, provider))
    }

    fn len(&self) -> usize {
        self.classifiers.len()
    }

    /// Check that every requested pair is registered and has its credential
    pub fn preflight(
        &self,
        request: &AnalysisRequest,
        credentials: &Credentials,
    ) -> Result<(), ConfigurationError> {
        for &analysis_type in &request.analysis_types {
            let provider = request
                .provider_for(analysis_type)
                .ok_or(ConfigurationError::UnsupportedProvider {
                    analysis_type,
                    provider: ProviderId::Simple,
                })?;

            let classifier = self.get(analysis_type, provider).ok_or(
                ConfigurationError::UnsupportedProvider {
                    analysis_type,
                    provider,
                },
            )?;

            if classifier.requires_credential() && !credentials.contains(provider) {
                return Err(ConfigurationError::MissingCredential { provider });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut pairs: Vec<_> = self.classifiers.keys().collect();
        pairs.sort();
        f.debug_struct("ProviderRegistry").field("pairs", &pairs).finish()
    }
}

/// Shared outbound HTTP client
pub fn http_client(timeout: Duration) -> ndx_common::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ndx_common::Error::Internal(format!("Failed to build HTTP client: {}", e)))
}

/// Loose format check for model-backed provider keys
///
/// OpenRouter keys start with `sk-or-`, Perplexity keys with `pplx-`; both are
/// at least 20 characters. Key-less providers accept anything.
pub fn validate_api_key_format(provider: ProviderId, key: &str) -> bool {
    const MIN_KEY_LEN: usize = 20;

    let key = key.trim();
    match provider {
        ProviderId::OpenRouter => key.starts_with("sk-or-") && key.len() >= MIN_KEY_LEN,
        ProviderId::Perplexity => key.starts_with("pplx-") && key.len() >= MIN_KEY_LEN,
        ProviderId::Simple | ProviderId::Genderize => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndx_common::api::Gender;
    use std::collections::BTreeMap;

    struct NeedsKey;

    #[async_trait]
    impl Classifier for NeedsKey {
        fn provider(&self) -> ProviderId {
            ProviderId::OpenRouter
        }

        async fn classify(
            &self,
            _first_name: &str,
            _credentials: &Credentials,
        ) -> Result<Prediction, ProviderError> {
            Ok(Prediction::new(Gender::Male, 85, ProviderId::OpenRouter))
        }
    }

    fn request(analysis_type: AnalysisType, provider: ProviderId) -> AnalysisRequest {
        let mut providers = BTreeMap::new();
        providers.insert(analysis_type, provider);
        AnalysisRequest {
            names: vec!["Maria".to_string()],
            analysis_types: vec![analysis_type],
            providers,
            credentials: Credentials::new(),
            batch_size: 10,
        }
    }

    #[test]
    fn test_from_config_registers_gender_providers() {
        let registry = ProviderRegistry::from_config(&ServiceConfig::default()).unwrap();
        for provider in ProviderId::ALL {
            assert!(registry.supports(AnalysisType::Gender, provider));
            assert!(!registry.supports(AnalysisType::Origin, provider));
        }
    }

    #[test]
    fn test_preflight_unknown_pair() {
        let registry = ProviderRegistry::from_config(&ServiceConfig::default()).unwrap();
        let err = registry
            .preflight(&request(AnalysisType::Age, ProviderId::Simple), &Credentials::new())
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnsupportedProvider {
                analysis_type: AnalysisType::Age,
                provider: ProviderId::Simple
            }
        );
    }

    #[test]
    fn test_preflight_missing_credential() {
        let mut registry = ProviderRegistry::new();
        registry.register(AnalysisType::Gender, Arc::new(NeedsKey));
        let req = request(AnalysisType::Gender, ProviderId::OpenRouter);

        let err = registry.preflight(&req, &Credentials::new()).unwrap_err();
        assert_eq!(err.to_string(), "OpenRouter API key not configured");

        let credentials: Credentials =
            [(ProviderId::OpenRouter, "sk-or-abc".to_string())].into_iter().collect();
        assert!(registry.preflight(&req, &credentials).is_ok());
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = ProviderRegistry::new();
        registry.register(AnalysisType::Gender, Arc::new(NeedsKey));
        registry.register(AnalysisType::Gender, Arc::new(NeedsKey));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_key_format() {
        assert!(validate_api_key_format(ProviderId::OpenRouter, "sk-or-v1-0123456789abcdef"));
        assert!(!validate_api_key_format(ProviderId::OpenRouter, "sk-or-short"));
        assert!(!validate_api_key_format(ProviderId::OpenRouter, "pplx-0123456789abcdefgh"));
        assert!(validate_api_key_format(ProviderId::Perplexity, "pplx-0123456789abcdefgh"));
        assert!(validate_api_key_format(ProviderId::Genderize, ""));
    }
}
