//! Analysis orchestrator
//!
//! Drives one run: names are processed one at a time in input order, every
//! requested analysis type is classified independently, failures go through
//! the per-type fallback policy, and a fixed pause separates consecutive
//! batches. Cancellation is observed before each name and during the pause;
//! results already produced are always kept.

use crate::models::{AnalysisRequest, Credentials};
use crate::services::aggregator;
use crate::services::name_normalizer::extract_first_name;
use crate::services::providers::{Classifier, ConfigurationError, ProviderError, ProviderRegistry};
use ndx_common::api::{AnalysisResponse, AnalysisType, NameResult, Prediction, ProviderId};
use ndx_common::config::ServiceConfig;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Response of a run plus whether it stopped early
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub response: AnalysisResponse,
    pub cancelled: bool,
}

pub struct AnalysisOrchestrator {
    registry: Arc<ProviderRegistry>,
    /// Fallback provider per analysis type
    fallback: BTreeMap<AnalysisType, ProviderId>,
    /// Pause between consecutive batches
    pacing: Duration,
    /// Bound on each classifier call
    call_timeout: Duration,
}

impl AnalysisOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, config: &ServiceConfig) -> Self {
        Self {
            registry,
            fallback: config.fallback.clone(),
            pacing: config.pipeline.pacing(),
            call_timeout: config.pipeline.provider_timeout(),
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Reject runs whose providers are unknown or lack credentials
    pub fn preflight(
        &self,
        request: &AnalysisRequest,
        credentials: &Credentials,
    ) -> Result<(), ConfigurationError> {
        self.registry.preflight(request, credentials)
    }

    /// Execute a run
    ///
    /// `credentials` are the resolved credentials (caller first, then server).
    /// `progress` is updated with the number of finished names.
    pub async fn run(
        &self,
        request: &AnalysisRequest,
        credentials: &Credentials,
        cancel: &CancellationToken,
        progress: &AtomicUsize,
    ) -> Result<RunOutcome, ConfigurationError> {
        self.preflight(request, credentials)?;

        let start_time = Instant::now();
        let batch_size = request.batch_size.max(1);
        let total = request.names.len();

        tracing::info!(
            names = total,
            batch_size,
            analysis_types = ?request.analysis_types,
            providers = ?request.providers,
            "Starting analysis run"
        );

        let mut results = Vec::with_capacity(total);
        let mut cancelled = false;

        'batches: for (batch_index, batch) in request.names.chunks(batch_size).enumerate() {
            if batch_index > 0 && !self.pacing.is_zero() {
                tracing::debug!(
                    batch = batch_index,
                    pause_ms = self.pacing.as_millis() as u64,
                    "Pausing between batches"
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break 'batches;
                    }
                    _ = tokio::time::sleep(self.pacing) => {}
                }
            }

            for name in batch {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'batches;
                }
                results.push(self.analyze_name(name, request, credentials).await);
                progress.store(results.len(), Ordering::Release);
            }
        }

        if cancelled {
            tracing::info!(processed = results.len(), total, "Analysis run cancelled");
        }

        let response = aggregator::build_response(results, &request.analysis_types);

        tracing::info!(
            processed = response.summary.processed,
            failed = response.summary.failed,
            fallbacks = response.summary.fallbacks,
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Analysis run finished"
        );

        Ok(RunOutcome {
            response,
            cancelled,
        })
    }

    async fn analyze_name(
        &self,
        name: &str,
        request: &AnalysisRequest,
        credentials: &Credentials,
    ) -> NameResult {
        let first_name = extract_first_name(name);
        let mut demographics = BTreeMap::new();

        for &analysis_type in &request.analysis_types {
            let Some(provider) = request.provider_for(analysis_type) else {
                continue;
            };
            let prediction = self
                .classify_with_fallback(analysis_type, provider, &first_name, credentials)
                .await;

            tracing::debug!(
                name = %name,
                first_name = %first_name,
                analysis_type = %analysis_type,
                provider = %prediction.provider,
                value = %prediction.value,
                confidence = prediction.confidence,
                fallback = prediction.fallback,
                "Classified name"
            );
            demographics.insert(analysis_type, prediction);
        }

        NameResult {
            name: name.to_string(),
            first_name,
            demographics,
        }
    }

    /// Primary provider, then the configured fallback, then the terminal floor
    async fn classify_with_fallback(
        &self,
        analysis_type: AnalysisType,
        provider: ProviderId,
        first_name: &str,
        credentials: &Credentials,
    ) -> Prediction {
        let Some(primary) = self.registry.get(analysis_type, provider) else {
            return Prediction::failure(
                provider,
                format!("No {} classifier for provider {}", analysis_type, provider),
            );
        };

        let primary_error = match self.invoke(primary.as_ref(), first_name, credentials).await {
            Ok(prediction) if !prediction.has_error() => return prediction,
            Ok(prediction) => prediction.error.unwrap_or_default(),
            Err(err) => err.to_string(),
        };

        let fallback = self
            .fallback
            .get(&analysis_type)
            .copied()
            .filter(|fallback| *fallback != provider)
            .and_then(|fallback| self.registry.get(analysis_type, fallback));

        let Some(fallback) = fallback else {
            tracing::warn!(
                name = %first_name,
                provider = %provider,
                error = %primary_error,
                "Classification failed, no fallback available"
            );
            return Prediction::failure(provider, primary_error);
        };

        tracing::warn!(
            name = %first_name,
            provider = %provider,
            fallback = %fallback.provider(),
            error = %primary_error,
            "Primary provider failed, using fallback"
        );

        match self.invoke(fallback.as_ref(), first_name, credentials).await {
            Ok(prediction) if !prediction.has_error() => Prediction {
                fallback: true,
                original_error: Some(primary_error),
                ..prediction
            },
            Ok(prediction) => {
                Prediction::failure(provider, prediction.error.unwrap_or(primary_error))
            }
            Err(err) => {
                tracing::error!(name = %first_name, error = %err, "Fallback provider failed");
                Prediction::failure(provider, err.to_string())
            }
        }
    }

    async fn invoke(
        &self,
        classifier: &dyn Classifier,
        first_name: &str,
        credentials: &Credentials,
    ) -> Result<Prediction, ProviderError> {
        match tokio::time::timeout(self.call_timeout, classifier.classify(first_name, credentials))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.call_timeout)),
        }
    }
}
