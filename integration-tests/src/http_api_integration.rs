//! Search, dispatch, operations and health over a live listener

use crate::test_utils::*;
use reqwest::StatusCode;
use serde_json::{Value, json};

#[tokio::test]
async fn test_search_reset_example() {
    let (server, _provider, base_url) = running_bridge(&RESET_LINES).await;
    let client = client();

    let response = client
        .post(format!("{base_url}/search"))
        .json(&json!({"query": "Reset", "limit": 5, "offset": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "query": "Reset",
            "total_results": 2,
            "page": 1,
            "limit": 5,
            "items": [
                {"name": "ResetHandler", "address": "0x1000"},
                {"name": "ResetVector", "address": "0x2000"}
            ]
        })
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_search_second_page() {
    let (server, _provider, base_url) = running_bridge(&RESET_LINES).await;

    let body: Value = client()
        .post(format!("{base_url}/search"))
        .json(&json!({"query": "Reset", "limit": 1, "offset": 1}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["page"], 2);
    assert_eq!(body["total_results"], 2);
    assert_eq!(
        body["items"],
        json!([{"name": "ResetVector", "address": "0x2000"}])
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_every_page_sees_every_record() {
    let lines: Vec<String> = (0..25)
        .map(|i| format!("FUN_{i:04} @ 0x{:x}", 0x1000 + i * 0x10))
        .collect();
    let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let (server, provider, base_url) = running_bridge(&line_refs).await;
    let client = client();

    let mut collected = Vec::new();
    for offset in (0..25).step_by(7) {
        let body: Value = client
            .post(format!("{base_url}/search"))
            .json(&json!({"query": "FUN_", "limit": 7, "offset": offset}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["total_results"], 25);
        for item in body["items"].as_array().unwrap() {
            collected.push(item["name"].as_str().unwrap().to_string());
        }
    }

    let expected: Vec<String> = (0..25).map(|i| format!("FUN_{i:04}")).collect();
    assert_eq!(collected, expected);
    // One full downstream fetch per page.
    assert_eq!(provider.calls(), 4);

    server.shutdown().await;
}

#[tokio::test]
async fn test_search_validation_errors() {
    let (server, provider, base_url) = running_bridge(&RESET_LINES).await;
    let client = client();

    for (body, field) in [
        (json!({"query": ""}), "query"),
        (json!({"limit": 5}), "query"),
        (json!({"query": "Reset", "limit": 0}), "limit"),
        (json!({"query": "Reset", "limit": 1001}), "limit"),
        (json!({"query": "Reset", "offset": -1}), "offset"),
        (json!({"query": "Reset", "limit": "5"}), "limit"),
        (json!({"query": "Reset", "offset": 1.5}), "offset"),
    ] {
        let response = client
            .post(format!("{base_url}/search"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");

        let error: Value = response.json().await.unwrap();
        assert_eq!(error["error"]["code"], "validation_error");
        assert_eq!(error["error"]["field"], field, "body: {body}");
    }

    assert_eq!(provider.calls(), 0);
    server.shutdown().await;
}

#[tokio::test]
async fn test_search_without_program_context() {
    let (server, provider, base_url) = running_bridge(&RESET_LINES).await;
    provider.set_program(false);

    let response = client()
        .post(format!("{base_url}/search"))
        .json(&json!({"query": "Reset"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"]["code"], "no_active_context");

    server.shutdown().await;
}

#[tokio::test]
async fn test_dispatch_whitelist_boundary() {
    let (server, provider, base_url) = running_bridge(&[]).await;
    let client = client();

    let ok = client
        .post(format!("{base_url}/dispatch"))
        .json(&json!({"operation": "decompile_function", "args": {"address": "00401000"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    let body: Value = ok.json().await.unwrap();
    assert_eq!(body["operation"], "decompile_function");
    assert_eq!(body["result"], "void FUN_00401000(void) {}");

    let rejected = client
        .post(format!("{base_url}/dispatch"))
        .json(&json!({"operation": "run_script", "args": {"path": "evil.py"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::FORBIDDEN);
    let body: Value = rejected.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unsupported_operation");

    let failed = client
        .post(format!("{base_url}/dispatch"))
        .json(&json!({"operation": "decompile_function"}))
        .send()
        .await
        .unwrap();
    assert_eq!(failed.status(), StatusCode::BAD_GATEWAY);
    let body: Value = failed.json().await.unwrap();
    assert_eq!(body["error"]["code"], "downstream_failure");
    assert!(body["error"]["message"].as_str().unwrap().contains("missing address"));

    // The rejected call never reached the provider.
    assert_eq!(provider.calls(), 2);
    server.shutdown().await;
}

#[tokio::test]
async fn test_operations_listing() {
    let (server, _provider, base_url) = running_bridge(&[]).await;

    let operations: Vec<Value> = client()
        .get(format!("{base_url}/operations"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(operations.len(), 13);
    assert!(operations.contains(&json!({"name": "search_functions", "requirement": "program"})));
    assert!(operations.contains(&json!({"name": "get_version", "requirement": "any"})));

    server.shutdown().await;
}

#[tokio::test]
async fn test_health_reports_context() {
    let (server, provider, base_url) = running_bridge(&[]).await;
    let client = client();

    let health: Value = client
        .get(format!("{base_url}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(health["status"], "ok");
    assert_eq!(health["stream"], "idle");
    assert_eq!(health["context"]["registered_providers"], 1);
    assert_eq!(health["context"]["program_active"], true);
    assert_eq!(health["context"]["active_provider"], "CodeBrowser");
    assert_eq!(
        health["listener"]["address"],
        base_url.trim_start_matches("http://")
    );
    assert!(health["metrics"]["requests"].is_u64());

    provider.set_program(false);
    let health: Value = client
        .get(format!("{base_url}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["context"]["program_active"], false);

    server.shutdown().await;
}
