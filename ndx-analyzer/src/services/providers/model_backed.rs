//! Chat-completion backed classifiers (OpenRouter, Perplexity)
//!
//! Both services speak the same chat completion dialect. One constrained
//! prompt is sent per name (temperature 0, tiny output budget) and the answer
//! text is mapped onto a gender label with a fixed confidence.

use super::{Classifier, ProviderError};
use crate::models::Credentials;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use ndx_common::api::{Gender, Prediction, ProviderId};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::num::NonZeroU32;

const REQUESTS_PER_SECOND: u32 = 5;
const MAX_TOKENS: u32 = 10;
const CLEAR_LABEL_CONFIDENCE: u8 = 85;
const APP_TITLE: &str = "Advanced Name Demographics Analyzer";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Model-backed gender classifier
pub struct ModelClassifier {
    provider: ProviderId,
    client: Client,
    url: String,
    model: String,
    /// Prompt with a `{name}` placeholder
    prompt: &'static str,
    /// Confidence when the answer contains no clear label
    unclear_confidence: u8,
    /// Extra request headers (attribution)
    headers: Vec<(&'static str, String)>,
    rate_limiter: DefaultDirectRateLimiter,
}

impl ModelClassifier {
    fn new(
        provider: ProviderId,
        client: Client,
        url: String,
        model: String,
        prompt: &'static str,
        unclear_confidence: u8,
    ) -> Self {
        let per_second = NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);
        Self {
            provider,
            client,
            url,
            model,
            prompt,
            unclear_confidence,
            headers: Vec::new(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        }
    }

    pub fn openrouter(client: Client, url: String, model: String, app_url: String) -> Self {
        let mut classifier = Self::new(
            ProviderId::OpenRouter,
            client,
            url,
            model,
            "Analyze the first name \"{name}\" and predict the most likely gender. \
             Consider cultural context and global name patterns. \
             Respond with only: male, female, or unknown",
            75,
        );
        classifier.headers = vec![("HTTP-Referer", app_url), ("X-Title", APP_TITLE.to_string())];
        classifier
    }

    pub fn perplexity(client: Client, url: String, model: String) -> Self {
        Self::new(
            ProviderId::Perplexity,
            client,
            url,
            model,
            "What is the most likely gender for the first name \"{name}\"? \
             Consider etymology, cultural origins, and statistical patterns. \
             Respond with only: male, female, or unknown",
            80,
        )
    }

    fn to_prediction(&self, answer: &str) -> Prediction {
        let (value, confidence) = match parse_label(answer) {
            Gender::Unknown => (Gender::Unknown, self.unclear_confidence),
            label => (label, CLEAR_LABEL_CONFIDENCE),
        };

        let mut metadata = Map::new();
        metadata.insert("model".to_string(), Value::from(self.model.as_str()));
        metadata.insert("rawResponse".to_string(), Value::from(answer));

        Prediction::new(value, confidence, self.provider).with_metadata(metadata)
    }
}

/// Map free answer text onto a label; "female" is checked first since it
/// contains "male"
fn parse_label(answer: &str) -> Gender {
    let answer = answer.trim().to_lowercase();
    if answer.contains("female") {
        Gender::Female
    } else if answer.contains("male") {
        Gender::Male
    } else {
        Gender::Unknown
    }
}

#[async_trait]
impl Classifier for ModelClassifier {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn classify(
        &self,
        first_name: &str,
        credentials: &Credentials,
    ) -> Result<Prediction, ProviderError> {
        let key = credentials
            .get(self.provider)
            .ok_or(ProviderError::MissingCredential(self.provider.display_name()))?;

        self.rate_limiter.until_ready().await;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: self.prompt.replace("{name}", first_name),
            }],
            temperature: 0.0,
            max_tokens: MAX_TOKENS,
        };

        tracing::debug!(provider = %self.provider, name = %first_name, model = %self.model, "Requesting model classification");

        let mut request = self.client.post(&self.url).bearer_auth(key).json(&body);
        for (name, value) in &self.headers {
            request = request.header(*name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("Invalid {} response: {}", self.provider, e)))?;

        let answer = chat
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Parse(format!("{} returned no choices", self.provider)))?;

        Ok(self.to_prediction(&answer))
    }
}
