//! End-to-end pipeline tests against simulated providers

mod helpers;

use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use helpers::{body_json, create_test_app, post_json, spawn_provider, test_config};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// genderize.io stand-in answering from a fixed table
fn genderize_router(table: HashMap<&'static str, (&'static str, f64)>) -> Router {
    let table = Arc::new(table);
    Router::new().route(
        "/",
        get(move |Query(query): Query<HashMap<String, String>>| {
            let table = table.clone();
            async move {
                let name = query.get("name").cloned().unwrap_or_default();
                match table.get(name.as_str()) {
                    Some((gender, probability)) => Json(json!({
                        "name": name,
                        "gender": gender,
                        "probability": probability,
                        "count": 5000
                    })),
                    None => Json(json!({"name": name, "gender": null, "probability": 0.0, "count": 0})),
                }
            }
        }),
    )
}

fn genderize_request(names: Value) -> Value {
    json!({
        "names": names,
        "analysisTypes": ["gender"],
        "providers": {"gender": "genderize"}
    })
}

#[tokio::test]
async fn test_maria_garcia_end_to_end() {
    let url = spawn_provider(genderize_router(HashMap::from([("Maria", ("female", 0.97))]))).await;
    let mut config = test_config();
    config.providers.genderize_url = url;
    let (app, _state) = create_test_app(config);

    let response = post_json(
        &app,
        "/api/analyze-demographics",
        &genderize_request(json!(["Maria Garcia"])),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let result = &json["results"][0];
    assert_eq!(result["name"], "Maria Garcia");
    assert_eq!(result["firstName"], "Maria");
    let gender = &result["demographics"]["gender"];
    assert_eq!(gender["value"], "female");
    assert_eq!(gender["confidence"], 97);
    assert_eq!(gender["provider"], "genderize");
    assert_eq!(gender["fallback"], false);
    assert!(gender.get("error").is_none());
    assert_eq!(gender["metadata"]["count"], 5000);
    assert_eq!(
        json["summary"],
        json!({"processed": 1, "failed": 0, "fallbacks": 0, "analysisTypes": ["gender"]})
    );
}

#[tokio::test]
async fn test_provider_timeout_recovers_with_fallback() {
    let slow = Router::new().route(
        "/",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"gender": "female", "probability": 0.97}))
        }),
    );
    let url = spawn_provider(slow).await;
    let mut config = test_config();
    config.providers.genderize_url = url;
    let (app, _state) = create_test_app(config);

    let response = post_json(
        &app,
        "/api/analyze-demographics",
        &genderize_request(json!(["Maria Garcia"])),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let gender = &json["results"][0]["demographics"]["gender"];
    assert_eq!(gender["fallback"], true);
    assert_eq!(gender["provider"], "simple");
    assert_eq!(gender["value"], "female");
    assert!(gender["originalError"].is_string());
    assert!(gender.get("error").is_none());
    assert_eq!(json["summary"]["failed"], 0);
    assert_eq!(json["summary"]["fallbacks"], 1);
}

#[tokio::test]
async fn test_upstream_outage_falls_back_per_name() {
    let failures = Arc::new(AtomicUsize::new(0));
    let counter = failures.clone();
    let flaky = Router::new().route(
        "/",
        get(move |Query(query): Query<HashMap<String, String>>| {
            let counter = counter.clone();
            async move {
                let name = query.get("name").cloned().unwrap_or_default();
                if name == "John" {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "down"})))
                } else {
                    (StatusCode::OK, Json(json!({"gender": "female", "probability": 0.9})))
                }
            }
        }),
    );
    let url = spawn_provider(flaky).await;
    let mut config = test_config();
    config.providers.genderize_url = url;
    let (app, _state) = create_test_app(config);

    let response = post_json(
        &app,
        "/api/analyze-demographics",
        &genderize_request(json!(["Anna Smith", "Mr. John Doe", "Lisa Ray"])),
    )
    .await;
    let json = body_json(response).await;
    let results = json["results"].as_array().unwrap();

    assert_eq!(results[0]["demographics"]["gender"]["provider"], "genderize");
    assert_eq!(results[1]["demographics"]["gender"]["provider"], "simple");
    assert_eq!(results[1]["demographics"]["gender"]["value"], "male");
    assert_eq!(results[1]["demographics"]["gender"]["fallback"], true);
    assert_eq!(results[2]["demographics"]["gender"]["provider"], "genderize");
    assert_eq!(json["summary"]["fallbacks"], 1);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_results_follow_input_order() {
    let url = spawn_provider(genderize_router(HashMap::new())).await;
    let mut config = test_config();
    config.providers.genderize_url = url;
    let (app, _state) = create_test_app(config);

    let names: Vec<String> = (0..37).map(|i| format!("Name{:02} Surname", i)).collect();
    let mut body = genderize_request(json!(names));
    body["options"] = json!({"batchSize": 5});

    let json = body_json(post_json(&app, "/api/analyze-demographics", &body).await).await;
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), names.len());
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result["name"], names[i].as_str());
        // null gender maps to unknown@0 without error
        assert_eq!(result["demographics"]["gender"]["value"], "unknown");
        assert_eq!(result["demographics"]["gender"]["confidence"], 0);
    }
}

#[tokio::test]
async fn test_model_provider_with_request_credential() {
    let router = Router::new().route(
        "/chat/completions",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                == Some("Bearer sk-or-from-request");
            if !authorized {
                return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
            }
            let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
            let answer = if prompt.contains("\"John\"") { "male" } else { "unknown" };
            (
                StatusCode::OK,
                Json(json!({"choices": [{"message": {"role": "assistant", "content": answer}}]})),
            )
        }),
    );
    let base = spawn_provider(router).await;
    let mut config = test_config();
    config.providers.openrouter_url = format!("{}/chat/completions", base);
    config.providers.openrouter_api_key = Some("sk-or-from-server".to_string());
    let (app, _state) = create_test_app(config);

    let response = post_json(
        &app,
        "/api/analyze-demographics",
        &json!({
            "names": ["Dr. John Smith", "Quinn Kelly"],
            "analysisTypes": ["gender"],
            "providers": {"gender": "openrouter"},
            "credentials": {"openrouter": "sk-or-from-request"}
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let john = &json["results"][0]["demographics"]["gender"];
    assert_eq!(john["value"], "male");
    assert_eq!(john["confidence"], 85);
    assert_eq!(john["provider"], "openrouter");
    assert_eq!(john["metadata"]["rawResponse"], "male");
    let quinn = &json["results"][1]["demographics"]["gender"];
    assert_eq!(quinn["value"], "unknown");
    assert_eq!(quinn["confidence"], 75);
    assert_eq!(json["summary"]["failed"], 0);
}

#[tokio::test]
async fn test_model_provider_uses_server_key_when_request_has_none() {
    let router = Router::new().route(
        "/chat/completions",
        post(|headers: HeaderMap| async move {
            let key = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Json(json!({"choices": [{"message": {"role": "assistant", "content": key}}]}))
        }),
    );
    let base = spawn_provider(router).await;
    let mut config = test_config();
    config.providers.perplexity_url = format!("{}/chat/completions", base);
    config.providers.perplexity_api_key = Some("pplx-server-key".to_string());
    let (app, _state) = create_test_app(config);

    let json = body_json(
        post_json(
            &app,
            "/api/analyze-demographics",
            &json!({
                "names": ["Maria"],
                "analysisTypes": ["gender"],
                "providers": {"gender": "perplexity"}
            }),
        )
        .await,
    )
    .await;

    let gender = &json["results"][0]["demographics"]["gender"];
    assert_eq!(gender["metadata"]["rawResponse"], "Bearer pplx-server-key");
    assert_eq!(gender["confidence"], 80);
}

#[tokio::test]
async fn test_model_provider_rejection_falls_back() {
    let router = Router::new().route(
        "/chat/completions",
        post(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid key"}))) }),
    );
    let base = spawn_provider(router).await;
    let mut config = test_config();
    config.providers.openrouter_url = format!("{}/chat/completions", base);
    let (app, _state) = create_test_app(config);

    let json = body_json(
        post_json(
            &app,
            "/api/analyze-demographics",
            &json!({
                "names": ["Ms. Sarah Johnson"],
                "analysisTypes": ["gender"],
                "providers": {"gender": "openrouter"},
                "credentials": {"openrouter": "sk-or-revoked"}
            }),
        )
        .await,
    )
    .await;

    let gender = &json["results"][0]["demographics"]["gender"];
    assert_eq!(gender["provider"], "simple");
    assert_eq!(gender["value"], "female");
    assert_eq!(gender["fallback"], true);
    assert!(gender["originalError"].as_str().unwrap().contains("401"));
}
