//! Request validation
//!
//! Converts a raw JSON request body into an [`AnalysisRequest`]. Every problem
//! found is collected into one [`ValidationError`]; a request is either fully
//! accepted or rejected, never partially.

use crate::models::analysis_request::{
    AnalysisRequest, Credentials, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE, MAX_NAMES, MAX_NAME_CHARS,
    MIN_BATCH_SIZE,
};
use ndx_common::api::{AnalysisType, ProviderId};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

const REQUEST_FIELDS: &[&str] = &[
    "names",
    "analysisTypes",
    "providers",
    "credentials",
    "apiKeys",
    "options",
];

const OPTION_FIELDS: &[&str] = &["batchSize"];

/// Aggregated request validation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Request validation failed: {}", errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

/// Validate and sanitize a raw request body
pub fn validate(raw: &Value) -> Result<AnalysisRequest, ValidationError> {
    let Some(body) = raw.as_object() else {
        return Err(ValidationError {
            errors: vec!["Request body must be a JSON object".to_string()],
        });
    };

    let mut errors = Vec::new();

    check_unknown_fields(body, REQUEST_FIELDS, "", &mut errors);

    let names = validate_names(body.get("names"), &mut errors);
    let analysis_types = validate_analysis_types(body.get("analysisTypes"), &mut errors);
    let providers = validate_providers(body.get("providers"), &analysis_types, &mut errors);
    let credentials = validate_credentials(body, &mut errors);
    let batch_size = validate_options(body.get("options"), &mut errors);

    if !errors.is_empty() {
        tracing::debug!(error_count = errors.len(), "Rejected analysis request");
        return Err(ValidationError { errors });
    }

    Ok(AnalysisRequest {
        names,
        analysis_types,
        providers,
        credentials,
        batch_size,
    })
}

fn check_unknown_fields(
    object: &Map<String, Value>,
    allowed: &[&str],
    prefix: &str,
    errors: &mut Vec<String>,
) {
    for key in object.keys() {
        if !allowed.contains(&key.as_str()) {
            errors.push(format!("Unknown field: {}{}", prefix, key));
        }
    }
}

fn validate_names(value: Option<&Value>, errors: &mut Vec<String>) -> Vec<String> {
    let Some(items) = value.and_then(Value::as_array) else {
        errors.push("Names array is required".to_string());
        return Vec::new();
    };

    let mut names = Vec::with_capacity(items.len().min(MAX_NAMES));
    for (index, item) in items.iter().enumerate() {
        let Some(name) = item.as_str() else {
            errors.push(format!("Invalid name at index {}: must be a string", index));
            continue;
        };

        let trimmed = name.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.chars().count() > MAX_NAME_CHARS {
            errors.push(format!(
                "Name at index {} is too long (max {} characters)",
                index, MAX_NAME_CHARS
            ));
            continue;
        }
        names.push(trimmed.to_string());
    }

    if names.is_empty() {
        errors.push("No valid names provided".to_string());
    } else if names.len() > MAX_NAMES {
        errors.push(format!(
            "Maximum {} names allowed per request (got {})",
            MAX_NAMES,
            names.len()
        ));
    }

    names
}

fn validate_analysis_types(value: Option<&Value>, errors: &mut Vec<String>) -> Vec<AnalysisType> {
    let Some(items) = value.and_then(Value::as_array) else {
        errors.push("Analysis types array is required".to_string());
        return Vec::new();
    };

    if items.is_empty() {
        errors.push("At least one analysis type is required".to_string());
        return Vec::new();
    }

    let mut types = Vec::new();
    for item in items {
        match item.as_str().map(str::parse::<AnalysisType>) {
            Some(Ok(analysis_type)) => {
                if !types.contains(&analysis_type) {
                    types.push(analysis_type);
                }
            }
            Some(Err(message)) => errors.push(message),
            None => errors.push(format!("Invalid analysis type: {}", item)),
        }
    }
    types
}

fn validate_providers(
    value: Option<&Value>,
    analysis_types: &[AnalysisType],
    errors: &mut Vec<String>,
) -> BTreeMap<AnalysisType, ProviderId> {
    let Some(object) = value.and_then(Value::as_object) else {
        errors.push("Providers configuration is required".to_string());
        return BTreeMap::new();
    };

    let mut providers = BTreeMap::new();
    for (key, provider) in object {
        let analysis_type = match key.parse::<AnalysisType>() {
            Ok(analysis_type) => analysis_type,
            Err(_) => {
                errors.push(format!("Invalid analysis type in providers: {}", key));
                continue;
            }
        };
        match provider.as_str().map(str::parse::<ProviderId>) {
            Some(Ok(provider_id)) => {
                providers.insert(analysis_type, provider_id);
            }
            _ => errors.push(format!("Unknown provider for {}: {}", analysis_type, provider)),
        }
    }

    for analysis_type in analysis_types {
        if !object.contains_key(analysis_type.as_str()) {
            errors.push(format!("Provider not specified for {} analysis", analysis_type));
        }
    }

    providers
}

fn validate_credentials(body: &Map<String, Value>, errors: &mut Vec<String>) -> Credentials {
    let (field, value) = match (body.get("credentials"), body.get("apiKeys")) {
        (Some(_), Some(_)) => {
            errors.push("Use either credentials or apiKeys, not both".to_string());
            return Credentials::new();
        }
        (Some(value), None) => ("credentials", value),
        (None, Some(value)) => ("apiKeys", value),
        (None, None) => return Credentials::new(),
    };

    if value.is_null() {
        return Credentials::new();
    }
    let Some(object) = value.as_object() else {
        errors.push(format!("{} must be an object", field));
        return Credentials::new();
    };

    let mut credentials = Credentials::new();
    for (key, secret) in object {
        let provider = match key.parse::<ProviderId>() {
            Ok(provider) => provider,
            Err(message) => {
                errors.push(format!("{} in {}", message, field));
                continue;
            }
        };
        match secret {
            Value::String(secret) => credentials.insert(provider, secret.clone()),
            Value::Null => {}
            _ => errors.push(format!("Credential for {} must be a string", provider)),
        }
    }
    credentials
}

fn validate_options(value: Option<&Value>, errors: &mut Vec<String>) -> usize {
    let object = match value {
        None | Some(Value::Null) => return DEFAULT_BATCH_SIZE,
        Some(Value::Object(object)) => object,
        Some(_) => {
            errors.push("options must be an object".to_string());
            return DEFAULT_BATCH_SIZE;
        }
    };

    check_unknown_fields(object, OPTION_FIELDS, "options.", errors);

    match object.get("batchSize") {
        None | Some(Value::Null) => DEFAULT_BATCH_SIZE,
        Some(raw) => match integral_batch_size(raw) {
            Some(size) => size,
            None => {
                errors.push(format!(
                    "Batch size must be an integer between {} and {}",
                    MIN_BATCH_SIZE, MAX_BATCH_SIZE
                ));
                DEFAULT_BATCH_SIZE
            }
        },
    }
}

/// Whole JSON number within the batch bounds; `10` and `10.0` are equivalent
fn integral_batch_size(raw: &Value) -> Option<usize> {
    let size = match raw.as_u64() {
        Some(n) => usize::try_from(n).ok()?,
        None => {
            let f = raw.as_f64().filter(|f| f.fract() == 0.0)?;
            if f < MIN_BATCH_SIZE as f64 || f > MAX_BATCH_SIZE as f64 {
                return None;
            }
            f as usize
        }
    };
    (MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&size).then_some(size)
}
