//! Configuration loading for NDX services
//!
//! Resolution order, lowest priority first:
//! 1. Compiled defaults
//! 2. TOML config file
//! 3. Environment variables
//! 4. Command-line arguments (applied by the binary)
//!
//! A missing config file is not fatal: the service logs a warning and starts
//! on defaults. A malformed file, or one with unknown keys, is rejected.

use crate::api::{AnalysisType, ProviderId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "NDX_CONFIG";

/// Compiled defaults
pub struct CompiledDefaults;

impl CompiledDefaults {
    pub const BIND_ADDRESS: &'static str = "127.0.0.1";
    pub const PORT: u16 = 5780;
    pub const LOG_LEVEL: &'static str = "info";
    pub const PACING_MS: u64 = 500;
    pub const PROVIDER_TIMEOUT_SECS: u64 = 10;
    pub const MAX_RETAINED_RUNS: usize = 64;
    pub const RATE_LIMIT_WINDOW_SECS: u64 = 60 * 60;
    pub const RATE_LIMIT_MAX_REQUESTS: u32 = 100;
    pub const RATE_LIMIT_MAX_CLIENTS: usize = 10_000;
    pub const RATE_LIMIT_SWEEP_SECS: u64 = 60;
    pub const GENDERIZE_URL: &'static str = "https://api.genderize.io";
    pub const OPENROUTER_URL: &'static str = "https://openrouter.ai/api/v1/chat/completions";
    pub const OPENROUTER_MODEL: &'static str = "anthropic/claude-3.5-sonnet";
    pub const PERPLEXITY_URL: &'static str = "https://api.perplexity.ai/chat/completions";
    pub const PERPLEXITY_MODEL: &'static str = "llama-3.1-sonar-large-128k-online";
    pub const APP_URL: &'static str = "http://localhost:3000";
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter level when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: CompiledDefaults::LOG_LEVEL.to_string(),
        }
    }
}

/// Orchestration pipeline tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pause between consecutive batches
    pub pacing_ms: u64,
    /// Total timeout for each outbound classifier call
    pub provider_timeout_secs: u64,
    /// Finished background runs kept in memory for polling
    pub max_retained_runs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pacing_ms: CompiledDefaults::PACING_MS,
            provider_timeout_secs: CompiledDefaults::PROVIDER_TIMEOUT_SECS,
            max_retained_runs: CompiledDefaults::MAX_RETAINED_RUNS,
        }
    }
}

impl PipelineConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

/// Per-client request admission window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
    /// Upper bound on tracked client identities
    pub max_clients: usize,
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: CompiledDefaults::RATE_LIMIT_WINDOW_SECS,
            max_requests: CompiledDefaults::RATE_LIMIT_MAX_REQUESTS,
            max_clients: CompiledDefaults::RATE_LIMIT_MAX_CLIENTS,
            sweep_interval_secs: CompiledDefaults::RATE_LIMIT_SWEEP_SECS,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// External provider endpoints and server-side credentials
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvidersConfig {
    pub genderize_url: String,
    pub openrouter_url: String,
    pub openrouter_model: String,
    pub openrouter_api_key: Option<String>,
    pub perplexity_url: String,
    pub perplexity_model: String,
    pub perplexity_api_key: Option<String>,
    /// Sent as HTTP-Referer to OpenRouter
    pub app_url: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            genderize_url: CompiledDefaults::GENDERIZE_URL.to_string(),
            openrouter_url: CompiledDefaults::OPENROUTER_URL.to_string(),
            openrouter_model: CompiledDefaults::OPENROUTER_MODEL.to_string(),
            openrouter_api_key: None,
            perplexity_url: CompiledDefaults::PERPLEXITY_URL.to_string(),
            perplexity_model: CompiledDefaults::PERPLEXITY_MODEL.to_string(),
            perplexity_api_key: None,
            app_url: CompiledDefaults::APP_URL.to_string(),
        }
    }
}

// Keys stay out of logs
impl std::fmt::Debug for ProvidersConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvidersConfig")
            .field("genderize_url", &self.genderize_url)
            .field("openrouter_url", &self.openrouter_url)
            .field("openrouter_model", &self.openrouter_model)
            .field("openrouter_api_key", &self.openrouter_api_key.as_ref().map(|_| "<redacted>"))
            .field("perplexity_url", &self.perplexity_url)
            .field("perplexity_model", &self.perplexity_model)
            .field("perplexity_api_key", &self.perplexity_api_key.as_ref().map(|_| "<redacted>"))
            .field("app_url", &self.app_url)
            .finish()
    }
}

impl ProvidersConfig {
    /// Server-side credential for a provider, ignoring blank values
    pub fn api_key(&self, provider: ProviderId) -> Option<&str> {
        let key = match provider {
            ProviderId::OpenRouter => self.openrouter_api_key.as_deref(),
            ProviderId::Perplexity => self.perplexity_api_key.as_deref(),
            ProviderId::Simple | ProviderId::Genderize => None,
        };
        key.filter(|k| is_valid_key(k))
    }
}

/// Feature flags reported by the health endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeaturesConfig {
    pub origin_analysis: bool,
    pub age_analysis: bool,
}

/// Complete analyzer service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub port: u16,
    pub logging: LoggingConfig,
    pub pipeline: PipelineConfig,
    pub rate_limit: RateLimitConfig,
    pub providers: ProvidersConfig,
    pub features: FeaturesConfig,
    /// Fallback provider per analysis type; types without an entry get none
    #[serde(
        serialize_with = "serialize_fallback_table",
        deserialize_with = "deserialize_fallback_table"
    )]
    pub fallback: BTreeMap<AnalysisType, ProviderId>,
}

// TOML keys are plain strings; parse them into analysis types explicitly
fn deserialize_fallback_table<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<AnalysisType, ProviderId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, ProviderId>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, provider)| {
            key.parse::<AnalysisType>()
                .map(|analysis_type| (analysis_type, provider))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

fn serialize_fallback_table<S>(
    table: &BTreeMap<AnalysisType, ProviderId>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let raw: BTreeMap<&str, ProviderId> = table.iter().map(|(t, p)| (t.as_str(), *p)).collect();
    raw.serialize(serializer)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let mut fallback = BTreeMap::new();
        fallback.insert(AnalysisType::Gender, ProviderId::Simple);

        Self {
            bind_address: CompiledDefaults::BIND_ADDRESS.to_string(),
            port: CompiledDefaults::PORT,
            logging: LoggingConfig::default(),
            pipeline: PipelineConfig::default(),
            rate_limit: RateLimitConfig::default(),
            providers: ProvidersConfig::default(),
            features: FeaturesConfig::default(),
            fallback,
        }
    }
}

impl ServiceConfig {
    /// Load configuration: defaults, then TOML file, then environment
    ///
    /// `explicit_path` is the `--config` / `NDX_CONFIG` value; without it the
    /// platform config directory is used.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::from_toml_file(&path)?
            }
            Some(path) => {
                warn!(
                    "Config file not found at {}, using compiled defaults",
                    path.display()
                );
                Self::default()
            }
            None => {
                warn!("Could not determine config directory, using compiled defaults");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file, rejecting unknown keys
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply NDX_* and provider key environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("NDX_PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("NDX_PORT is not a valid port: {}", port)))?;
        }
        if let Ok(addr) = std::env::var("NDX_BIND_ADDRESS") {
            self.bind_address = addr;
        }
        if let Ok(level) = std::env::var("NDX_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
            if is_valid_key(&key) {
                self.providers.openrouter_api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("PERPLEXITY_API_KEY") {
            if is_valid_key(&key) {
                self.providers.perplexity_api_key = Some(key);
            }
        }
        Ok(())
    }

    /// Reject values that would make the service unusable
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.provider_timeout_secs == 0 {
            return Err(Error::Config(
                "pipeline.provider_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.pipeline.max_retained_runs == 0 {
            return Err(Error::Config(
                "pipeline.max_retained_runs must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.window_secs == 0 || self.rate_limit.max_requests == 0 {
            return Err(Error::Config(
                "rate_limit.window_secs and rate_limit.max_requests must be positive".to_string(),
            ));
        }
        if self.rate_limit.max_clients == 0 {
            return Err(Error::Config("rate_limit.max_clients must be positive".to_string()));
        }
        if self.rate_limit.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "rate_limit.sweep_interval_secs must be positive".to_string(),
            ));
        }
        for (analysis_type, provider) in &self.fallback {
            if provider.requires_credential() {
                return Err(Error::Config(format!(
                    "Fallback provider for {} must not require a credential: {}",
                    analysis_type, provider
                )));
            }
        }
        Ok(())
    }
}

/// Platform config file location: `<config_dir>/ndx/ndx-analyzer.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ndx").join("ndx-analyzer.toml"))
}

/// API key is usable when it is not blank
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
