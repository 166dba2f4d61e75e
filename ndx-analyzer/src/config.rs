//! Credential resolution for analysis runs
//!
//! Priority per provider: request credentials, then server configuration
//! (TOML file folded with `OPENROUTER_API_KEY` / `PERPLEXITY_API_KEY`).
//! Secrets are never logged, only where they came from.

use crate::models::Credentials;
use crate::services::providers::validate_api_key_format;
use ndx_common::api::ProviderId;
use ndx_common::config::ProvidersConfig;
use serde::Serialize;
use tracing::debug;

/// Merge caller credentials with server-configured keys
pub fn resolve_credentials(requested: &Credentials, providers: &ProvidersConfig) -> Credentials {
    for provider in ProviderId::ALL {
        if !provider.requires_credential() {
            continue;
        }
        match (requested.contains(provider), providers.api_key(provider).is_some()) {
            (true, true) => debug!(
                provider = %provider,
                "Credential found in request and server config, using request"
            ),
            (true, false) => debug!(provider = %provider, "Credential loaded from request"),
            (false, true) => debug!(provider = %provider, "Credential loaded from server config"),
            (false, false) => {}
        }
    }

    requested.clone().with_server_defaults(providers)
}

/// Server-side availability of a provider, as reported by the health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    /// Needs no credential
    Available,
    /// Server key present and well-formed
    Configured,
    /// No server key; callers must supply one
    NotConfigured,
    /// Server key present but not in the provider's key format
    InvalidFormat,
}

pub fn provider_status(provider: ProviderId, providers: &ProvidersConfig) -> ProviderStatus {
    if !provider.requires_credential() {
        return ProviderStatus::Available;
    }
    match providers.api_key(provider) {
        None => ProviderStatus::NotConfigured,
        Some(key) if validate_api_key_format(provider, key) => ProviderStatus::Configured,
        Some(_) => ProviderStatus::InvalidFormat,
    }
}
