//! End-to-end protocol tests over a real loopback listener, using the
//! scripted in-memory driver from `common`.

mod common;

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};

use page_bridge::bridge::{Bridge, MAX_BODY_BYTES};
use page_bridge::capability::ConsoleLevel;

#[tokio::test]
async fn test_health_reports_handler_presence() {
    let bare = Arc::new(Bridge::new());
    let (base, _server) = common::spawn_bridge(bare).await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .expect("Failed to reach /health")
        .json()
        .await
        .expect("Failed to parse /health body");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["handler"], false);

    let (_driver, _manager, base) = common::spawn_stack().await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .expect("Failed to reach /health")
        .json()
        .await
        .expect("Failed to parse /health body");
    assert_eq!(body["handler"], true);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_missing_handler_yields_503() {
    let bare = Arc::new(Bridge::new());
    let (base, _server) = common::spawn_bridge(bare).await;
    let res = Client::new()
        .post(format!("{}/click", base))
        .json(&json!({ "selector": "#save" }))
        .send()
        .await
        .expect("Failed to POST /click");
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.expect("Failed to parse error body");
    assert_eq!(body["error"], "no browser handler registered on the bridge");
}

#[tokio::test]
async fn test_validation_runs_before_handler_lookup() {
    // No handler registered: a bad request must still fail as 400, not 503.
    let bare = Arc::new(Bridge::new());
    let (base, _server) = common::spawn_bridge(bare).await;
    let client = Client::new();

    let res = client
        .post(format!("{}/click", base))
        .json(&json!({ "selector": "   " }))
        .send()
        .await
        .expect("Failed to POST /click");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.expect("Failed to parse error body");
    assert_eq!(body["error"], "selector must be a non-empty string");

    let res = client
        .post(format!("{}/click", base))
        .json(&json!({}))
        .send()
        .await
        .expect("Failed to POST /click");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_distinct_from_schema_errors() {
    let (_driver, _manager, base) = common::spawn_stack().await;
    let res = Client::new()
        .post(format!("{}/click", base))
        .header("content-type", "application/json")
        .body("{ this is not json")
        .send()
        .await
        .expect("Failed to POST /click");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.expect("Failed to parse error body");
    let message = body["error"].as_str().expect("error must be a string");
    assert!(
        message.starts_with("malformed JSON body:"),
        "unexpected message: {}",
        message
    );
}

#[tokio::test]
async fn test_unknown_path_gets_404_with_uniform_body() {
    let (_driver, _manager, base) = common::spawn_stack().await;
    let res = Client::new()
        .post(format!("{}/frobnicate", base))
        .json(&json!({}))
        .send()
        .await
        .expect("Failed to POST unknown path");
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.expect("Failed to parse error body");
    assert_eq!(body["error"], "Unknown path: /frobnicate");
}

#[tokio::test]
async fn test_method_mismatch_is_rewrapped_as_json() {
    let (_driver, _manager, base) = common::spawn_stack().await;
    let res = reqwest::get(format!("{}/click", base))
        .await
        .expect("Failed to GET /click");
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    let content_type = res
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("application/json"), "got {}", content_type);
    let body: Value = res.json().await.expect("Failed to parse error body");
    assert_eq!(body["error"], "Method Not Allowed");
}

#[tokio::test]
async fn test_oversized_body_is_rejected_with_413() {
    let (_driver, _manager, base) = common::spawn_stack().await;
    let oversized = format!("{{\"selector\": \"{}\"}}", "a".repeat(MAX_BODY_BYTES));
    let res = Client::new()
        .post(format!("{}/click", base))
        .header("content-type", "application/json")
        .body(oversized)
        .send()
        .await
        .expect("Failed to POST oversized body");
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = res.json().await.expect("Failed to parse error body");
    assert_eq!(
        body["error"],
        format!("request body exceeds the {} byte limit", MAX_BODY_BYTES)
    );
}

#[tokio::test]
async fn test_jquery_selector_is_rejected_without_browser_work() {
    let (driver, _manager, base) = common::spawn_stack().await;
    let res = Client::new()
        .post(format!("{}/click", base))
        .json(&json!({ "selector": "button:contains('Go')" }))
        .send()
        .await
        .expect("Failed to POST /click");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.expect("Failed to parse error body");
    let message = body["error"].as_str().expect("error must be a string");
    assert!(message.contains(":contains is jQuery syntax"), "got: {}", message);
    assert!(message.contains("standard CSS selector"), "got: {}", message);
    // Rejected during validation: the driver saw nothing, not even a connect.
    assert!(driver.calls().is_empty(), "driver was reached: {:?}", driver.calls());
}

#[tokio::test]
async fn test_click_timeout_reports_the_configured_budget() {
    let (driver, _manager, base) = common::spawn_stack().await;
    driver.mark_missing("#missing");
    let res = Client::new()
        .post(format!("{}/click", base))
        .json(&json!({ "selector": "#missing", "options": { "timeoutMs": 90 } }))
        .send()
        .await
        .expect("Failed to POST /click");
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.expect("Failed to parse error body");
    assert_eq!(
        body["error"],
        "Click timeout: \"#missing\" not found within 90ms. \
         Run /inspect or /screenshot to see the current page."
    );
    // Two retries after the first attempt, then the budget is spent.
    assert_eq!(driver.calls_matching("click"), 3);
}

#[tokio::test]
async fn test_navigate_while_disconnected_connects_first() {
    let (driver, _manager, base) = common::spawn_stack().await;
    let res = Client::new()
        .post(format!("{}/navigate", base))
        .json(&json!({ "url": "localhost:3000" }))
        .send()
        .await
        .expect("Failed to POST /navigate");
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.expect("Failed to parse body");
    assert_eq!(body["success"], true);
    assert_eq!(body["url"], "http://localhost:3000");

    let calls = driver.calls();
    assert!(calls.iter().any(|c| c == "connect"), "no connect in {:?}", calls);
    assert!(
        calls.iter().any(|c| c == "navigate http://localhost:3000"),
        "no navigate in {:?}",
        calls
    );
}

#[tokio::test]
async fn test_inspect_by_point_reports_dialog_overlay() {
    let (_driver, _manager, base) = common::spawn_stack().await;
    let res = Client::new()
        .post(format!("{}/inspect", base))
        .json(&json!({ "x": 10, "y": 10 }))
        .send()
        .await
        .expect("Failed to POST /inspect");
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.expect("Failed to parse body");
    assert_eq!(body["overlay"]["type"], "dialog");
    assert_eq!(body["overlay"]["canDismiss"], true);
}

#[tokio::test]
async fn test_inspect_results_are_deterministic() {
    let (_driver, _manager, base) = common::spawn_stack().await;
    let client = Client::new();
    let mut payloads = Vec::new();
    for _ in 0..2 {
        let res = client
            .post(format!("{}/inspect", base))
            .json(&json!({ "selector": "#save" }))
            .send()
            .await
            .expect("Failed to POST /inspect");
        assert_eq!(res.status(), StatusCode::OK);
        payloads.push(res.json::<Value>().await.expect("Failed to parse body"));
    }
    assert_eq!(payloads[0], payloads[1]);
    assert_eq!(payloads[0]["selector"], "#save");
    assert_eq!(payloads[0]["tagName"], "button");
}

#[tokio::test]
async fn test_inspect_rejects_mixed_and_partial_targets() {
    let (_driver, _manager, base) = common::spawn_stack().await;
    let client = Client::new();

    for body in [
        json!({ "selector": "#a", "x": 1, "y": 2 }),
        json!({ "x": 5 }),
        json!({}),
    ] {
        let res = client
            .post(format!("{}/inspect", base))
            .json(&body)
            .send()
            .await
            .expect("Failed to POST /inspect");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body: {}", body);
    }
}

#[tokio::test]
async fn test_console_filters_by_level_and_limit() {
    let (driver, _manager, base) = common::spawn_stack().await;
    driver.push_console(ConsoleLevel::Log, "first");
    driver.push_console(ConsoleLevel::Error, "boom one");
    driver.push_console(ConsoleLevel::Log, "middle");
    driver.push_console(ConsoleLevel::Error, "boom two");

    let client = Client::new();
    let res = client
        .get(format!("{}/console", base))
        .send()
        .await
        .expect("Failed to GET /console");
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.expect("Failed to parse body");
    assert_eq!(body["messages"].as_array().map(Vec::len), Some(4));

    let res = client
        .post(format!("{}/console", base))
        .json(&json!({ "level": "error", "limit": 1 }))
        .send()
        .await
        .expect("Failed to POST /console");
    let body: Value = res.json().await.expect("Failed to parse body");
    let messages = body["messages"].as_array().expect("messages must be an array");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["text"], "boom two");
    assert_eq!(messages[0]["level"], "error");
}

#[tokio::test]
async fn test_screenshot_returns_base64_png() {
    let (_driver, _manager, base) = common::spawn_stack().await;
    let res = Client::new()
        .post(format!("{}/screenshot", base))
        .json(&json!({}))
        .send()
        .await
        .expect("Failed to POST /screenshot");
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.expect("Failed to parse body");
    assert_eq!(body["mimeType"], "image/png");
    assert_eq!(body["data"], BASE64.encode(common::PNG_STUB));
}

#[tokio::test]
async fn test_unsupported_operation_gets_501() {
    let (driver, _manager, base) = common::spawn_stack().await;
    let res = Client::new()
        .post(format!("{}/drag-and-drop", base))
        .json(&json!({ "source": "#a", "target": "#b" }))
        .send()
        .await
        .expect("Failed to POST /drag-and-drop");
    assert_eq!(res.status(), StatusCode::NOT_IMPLEMENTED);
    let body: Value = res.json().await.expect("Failed to parse error body");
    assert_eq!(
        body["error"],
        "Drag-and-drop is not supported by the connected browser driver"
    );
    // Gated before any session work: no connect attempt was made.
    assert!(driver.calls().is_empty(), "driver was reached: {:?}", driver.calls());
}

#[tokio::test]
async fn test_evaluate_requires_a_script() {
    let (_driver, _manager, base) = common::spawn_stack().await;
    let res = Client::new()
        .post(format!("{}/evaluate", base))
        .json(&json!({ "script": "  " }))
        .send()
        .await
        .expect("Failed to POST /evaluate");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.expect("Failed to parse error body");
    assert_eq!(body["error"], "script must be a non-empty string");
}

#[tokio::test]
async fn test_element_query_wrappers() {
    let (_driver, _manager, base) = common::spawn_stack().await;
    let client = Client::new();

    let res = client
        .post(format!("{}/get-text", base))
        .json(&json!({ "selector": "#save" }))
        .send()
        .await
        .expect("Failed to POST /get-text");
    let body: Value = res.json().await.expect("Failed to parse body");
    assert_eq!(body["text"], "Submit");

    let res = client
        .post(format!("{}/is-visible", base))
        .json(&json!({ "selector": "#save" }))
        .send()
        .await
        .expect("Failed to POST /is-visible");
    let body: Value = res.json().await.expect("Failed to parse body");
    assert_eq!(body["visible"], true);

    let res = client
        .post(format!("{}/get-attribute", base))
        .json(&json!({ "selector": "#save", "name": "data-missing" }))
        .send()
        .await
        .expect("Failed to POST /get-attribute");
    let body: Value = res.json().await.expect("Failed to parse body");
    assert_eq!(body["value"], Value::Null);
}

#[tokio::test]
async fn test_cors_echoes_loopback_origins_only() {
    let (_driver, _manager, base) = common::spawn_stack().await;
    let client = Client::new();

    let res = client
        .get(format!("{}/health", base))
        .header("Origin", "http://localhost:5173")
        .send()
        .await
        .expect("Failed to GET /health");
    let allow = res
        .headers()
        .get("access-control-allow-origin")
        .and_then(|v| v.to_str().ok());
    assert_eq!(allow, Some("http://localhost:5173"));

    let res = client
        .get(format!("{}/health", base))
        .header("Origin", "http://example.com")
        .send()
        .await
        .expect("Failed to GET /health");
    assert!(res.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_preflight_answers_204() {
    let (_driver, _manager, base) = common::spawn_stack().await;
    let client = Client::new();

    let res = client
        .request(Method::OPTIONS, format!("{}/click", base))
        .header("Origin", "http://127.0.0.1:5173")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .expect("Failed to send preflight");
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        res.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://127.0.0.1:5173")
    );
    assert_eq!(
        res.headers()
            .get("access-control-allow-methods")
            .and_then(|v| v.to_str().ok()),
        Some("GET, POST, OPTIONS")
    );

    // Non-loopback origins get the 204 but no grant.
    let res = client
        .request(Method::OPTIONS, format!("{}/click", base))
        .header("Origin", "https://example.com")
        .send()
        .await
        .expect("Failed to send preflight");
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(res.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_concurrent_clicks_are_serialized() {
    let (driver, _manager, base) = common::spawn_stack().await;
    driver.set_click_delay(Duration::from_millis(100));
    let client = Client::new();

    let first = client
        .post(format!("{}/click", base))
        .json(&json!({ "selector": "#a" }))
        .send();
    let second = client
        .post(format!("{}/click", base))
        .json(&json!({ "selector": "#b" }))
        .send();
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.expect("first click failed").status(), StatusCode::OK);
    assert_eq!(second.expect("second click failed").status(), StatusCode::OK);
    assert_eq!(
        driver.max_concurrent_clicks(),
        1,
        "clicks overlapped: {:?}",
        driver.calls()
    );
}

#[tokio::test]
async fn test_state_never_triggers_a_connect() {
    let (driver, _manager, base) = common::spawn_stack().await;
    let res = reqwest::get(format!("{}/state", base))
        .await
        .expect("Failed to GET /state");
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.expect("Failed to parse body");
    assert_eq!(body["connected"], false);
    assert_eq!(body["currentUrl"], "");
    assert_eq!(body["lastInspectedElement"], Value::Null);
    assert!(!driver.calls().iter().any(|c| c == "connect"), "state connected");
}

#[tokio::test]
async fn test_state_reflects_last_inspected_element() {
    let (_driver, _manager, base) = common::spawn_stack().await;
    let client = Client::new();
    client
        .post(format!("{}/inspect", base))
        .json(&json!({ "selector": "#save" }))
        .send()
        .await
        .expect("Failed to POST /inspect");

    let res = client
        .get(format!("{}/state", base))
        .send()
        .await
        .expect("Failed to GET /state");
    let body: Value = res.json().await.expect("Failed to parse body");
    assert_eq!(body["connected"], true);
    assert_eq!(body["currentUrl"], "http://localhost:3000/");
    assert_eq!(body["lastInspectedElement"]["selector"], "#save");
}
