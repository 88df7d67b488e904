//! Host sessions with several views attaching and detaching

use crate::test_utils::*;
use hostbridge_server::ProviderRef;
use reqwest::StatusCode;
use serde_json::{Value, json};

async fn post(client: &reqwest::Client, url: String, body: Value) -> (StatusCode, Value) {
    let response = client.post(url).json(&body).send().await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_views_come_and_go() {
    let (server, shared) = isolated_bridge();
    let client = client();

    // The project window opens first: no program, but it owns the listener.
    let project = TestProvider::new("ProjectManager", false, true);
    let project_ref: ProviderRef = project.clone();
    let base_url = attach_and_url(&server, project_ref.clone()).await;

    let (status, body) = post(
        &client,
        format!("{base_url}/search"),
        json!({"query": "Reset"}),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "no_active_context");

    let (status, body) = post(
        &client,
        format!("{base_url}/dispatch"),
        json!({"operation": "get_version"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["provider"], "ProjectManager");

    // A code browser with an open program attaches and reuses the listener.
    let browser = TestProvider::with_lines("CodeBrowser", true, true, &RESET_LINES);
    let browser_ref: ProviderRef = browser.clone();
    let handle = server.attach(browser_ref.clone()).await.unwrap().unwrap();
    assert!(!handle.newly_created);

    let (status, body) = post(
        &client,
        format!("{base_url}/search"),
        json!({"query": "Reset", "limit": 1, "offset": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_results"], 2);
    assert_eq!(body["page"], 2);

    // Focusing the project window must not take program queries away from the browser.
    assert!(server.promote(&project_ref));
    let (status, body) = post(
        &client,
        format!("{base_url}/search"),
        json!({"query": "Reset"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_results"], 2);

    let (_, body) = post(
        &client,
        format!("{base_url}/dispatch"),
        json!({"operation": "get_version"}),
    )
    .await;
    assert_eq!(body["result"]["provider"], "ProjectManager");

    // The browser closes; the project window still keeps the listener alive.
    assert!(server.detach(&browser_ref).await);
    assert!(shared.is_running().await);

    let (status, _) = post(
        &client,
        format!("{base_url}/search"),
        json!({"query": "Reset"}),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let health: Value = client
        .get(format!("{base_url}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["context"]["registered_providers"], 1);
    assert_eq!(health["context"]["program_active"], false);

    // Last holder leaves.
    assert!(server.detach(&project_ref).await);
    assert!(!shared.is_running().await);
    assert_eq!(browser.calls(), 2);
}

#[tokio::test]
async fn test_program_closed_without_detach() {
    let (server, _shared) = isolated_bridge();
    let client = client();

    let older = TestProvider::with_lines("Older", true, true, &["Old @ 0x10"]);
    let newer = TestProvider::with_lines("Newer", true, false, &["New @ 0x20"]);
    let base_url = attach_and_url(&server, older.clone()).await;
    server.attach(newer.clone()).await.unwrap();

    let (_, body) = post(
        &client,
        format!("{base_url}/search"),
        json!({"query": "x"}),
    )
    .await;
    assert_eq!(body["items"][0]["name"], "New");

    newer.set_program(false);
    let (status, body) = post(
        &client,
        format!("{base_url}/search"),
        json!({"query": "x"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["name"], "Old");

    server.shutdown().await;
}
