//! genderize.io client
//!
//! Free statistics lookup, no credential. Upstream failures never escape as
//! `Err`: they become an `unknown@0` prediction with `error` set and
//! `fallback` flagged, so the orchestrator can recover with the rule-based
//! classifier.

use super::{Classifier, ProviderError};
use crate::models::Credentials;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use ndx_common::api::{Gender, Prediction, ProviderId};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::num::NonZeroU32;

/// Outbound politeness quota
const REQUESTS_PER_SECOND: u32 = 10;

/// genderize.io lookup response
#[derive(Debug, Deserialize)]
struct GenderizeResponse {
    gender: Option<String>,
    probability: Option<f64>,
    count: Option<u64>,
    country_id: Option<String>,
}

pub struct GenderizeClassifier {
    client: Client,
    base_url: String,
    rate_limiter: DefaultDirectRateLimiter,
}

impl GenderizeClassifier {
    pub fn new(client: Client, base_url: String) -> Self {
        let per_second = NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);
        Self {
            client,
            base_url,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        }
    }

    async fn lookup(&self, first_name: &str) -> Result<Prediction, ProviderError> {
        self.rate_limiter.until_ready().await;

        tracing::debug!(name = %first_name, "Querying genderize");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("name", first_name)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let data: GenderizeResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("Invalid genderize response: {}", e)))?;

        Ok(to_prediction(data))
    }
}

fn to_prediction(data: GenderizeResponse) -> Prediction {
    let value = match data.gender.as_deref() {
        Some("male") => Gender::Male,
        Some("female") => Gender::Female,
        _ => Gender::Unknown,
    };

    let confidence = match (value, data.probability) {
        (Gender::Unknown, _) | (_, None) => 0,
        (_, Some(p)) => (p.clamp(0.0, 1.0) * 100.0).round() as u8,
    };

    let mut metadata = Map::new();
    metadata.insert("count".to_string(), data.count.map_or(Value::Null, Value::from));
    metadata.insert(
        "probability".to_string(),
        data.probability.map_or(Value::Null, Value::from),
    );
    metadata.insert(
        "country_id".to_string(),
        data.country_id.map_or(Value::Null, Value::from),
    );

    Prediction::new(value, confidence, ProviderId::Genderize).with_metadata(metadata)
}

#[async_trait]
impl Classifier for GenderizeClassifier {
    fn provider(&self) -> ProviderId {
        ProviderId::Genderize
    }

    async fn classify(
        &self,
        first_name: &str,
        _credentials: &Credentials,
    ) -> Result<Prediction, ProviderError> {
        match self.lookup(first_name).await {
            Ok(prediction) => Ok(prediction),
            Err(err) => {
                tracing::warn!(name = %first_name, error = %err, "Genderize lookup failed");
                let mut prediction = Prediction::failure(ProviderId::Genderize, err.to_string());
                prediction.fallback = true;
                Ok(prediction)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::http_client;
    use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn classifier(url: String) -> GenderizeClassifier {
        GenderizeClassifier::new(http_client(Duration::from_secs(2)).unwrap(), url)
    }

    #[test]
    fn test_null_gender_is_unknown_zero() {
        let p = to_prediction(GenderizeResponse {
            gender: None,
            probability: Some(0.0),
            count: Some(0),
            country_id: None,
        });
        assert_eq!((p.value, p.confidence), (Gender::Unknown, 0));
        assert!(!p.has_error());
    }

    #[tokio::test]
    async fn test_probability_maps_to_confidence() {
        let router = Router::new().route(
            "/",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                Json(json!({
                    "name": q.get("name").cloned().unwrap_or_default(),
                    "gender": "female",
                    "probability": 0.97,
                    "count": 1234
                }))
            }),
        );
        let url = spawn(router).await;

        let p = classifier(url).classify("Maria", &Credentials::new()).await.unwrap();
        assert_eq!(p.value, Gender::Female);
        assert_eq!(p.confidence, 97);
        assert_eq!(p.provider, ProviderId::Genderize);
        assert!(!p.fallback);
        let metadata = p.metadata.unwrap();
        assert_eq!(metadata["count"], json!(1234));
        assert_eq!(metadata["probability"], json!(0.97));
    }

    #[tokio::test]
    async fn test_upstream_error_becomes_flagged_prediction() {
        let router = Router::new().route(
            "/",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, "quota exceeded") }),
        );
        let url = spawn(router).await;

        let p = classifier(url).classify("Maria", &Credentials::new()).await.unwrap();
        assert_eq!((p.value, p.confidence), (Gender::Unknown, 0));
        assert!(p.fallback);
        assert!(p.error.unwrap().contains("429"));
    }

    #[tokio::test]
    async fn test_malformed_body_becomes_flagged_prediction() {
        let router = Router::new().route("/", get(|| async { "not json" }));
        let url = spawn(router).await;

        let p = classifier(url).classify("Maria", &Credentials::new()).await.unwrap();
        assert!(p.has_error());
        assert!(p.fallback);
    }
}
