//! Rule-based gender classifier
//!
//! Static name lists with a suffix heuristic. No I/O and no state, so it
//! serves as the universal fallback.

use super::{Classifier, ProviderError};
use crate::models::Credentials;
use async_trait::async_trait;
use ndx_common::api::{Gender, Prediction, ProviderId};

const MALE_NAMES: &[&str] = &[
    "john", "michael", "david", "james", "robert", "william", "richard", "charles", "joseph",
    "thomas", "christopher", "daniel", "paul", "mark", "donald", "steven", "andrew", "joshua",
    "kenneth", "matthew", "alexander", "patrick", "jack", "ryan",
];

const FEMALE_NAMES: &[&str] = &[
    "mary", "patricia", "jennifer", "linda", "elizabeth", "barbara", "susan", "jessica", "sarah",
    "karen", "nancy", "lisa", "betty", "helen", "sandra", "donna", "carol", "ruth", "sharon",
    "michelle", "laura", "kimberly", "deborah", "dorothy", "amy",
];

const FEMALE_SUFFIXES: &[&str] = &["a", "ia", "ine"];
const MALE_SUFFIXES: &[&str] = &["er", "on", "us"];

const LIST_CONFIDENCE: u8 = 85;
const SUFFIX_CONFIDENCE: u8 = 60;
const UNKNOWN_CONFIDENCE: u8 = 50;

pub const METHOD: &str = "rule-based";

#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleClassifier;

impl SimpleClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify without going through the async trait
    pub fn predict(&self, first_name: &str) -> Prediction {
        let key = first_name.trim().to_lowercase();

        let (value, confidence) = if MALE_NAMES.contains(&key.as_str()) {
            (Gender::Male, LIST_CONFIDENCE)
        } else if FEMALE_NAMES.contains(&key.as_str()) {
            (Gender::Female, LIST_CONFIDENCE)
        } else if FEMALE_SUFFIXES.iter().any(|s| key.ends_with(s)) {
            (Gender::Female, SUFFIX_CONFIDENCE)
        } else if MALE_SUFFIXES.iter().any(|s| key.ends_with(s)) {
            (Gender::Male, SUFFIX_CONFIDENCE)
        } else {
            (Gender::Unknown, UNKNOWN_CONFIDENCE)
        };

        Prediction::new(value, confidence, ProviderId::Simple).with_method(METHOD)
    }
}

#[async_trait]
impl Classifier for SimpleClassifier {
    fn provider(&self) -> ProviderId {
        ProviderId::Simple
    }

    async fn classify(
        &self,
        first_name: &str,
        _credentials: &Credentials,
    ) -> Result<Prediction, ProviderError> {
        Ok(self.predict(first_name))
    }
}
