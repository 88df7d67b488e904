//! Single-subscriber `/events` stream over a live listener

use crate::test_utils::*;
use futures::future::join_all;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

async fn read_until(response: &mut reqwest::Response, needle: &str) -> String {
    let mut received = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

    while !received.contains(needle) {
        let chunk = tokio::time::timeout_at(deadline, response.chunk())
            .await
            .expect("timed out waiting for event")
            .expect("stream error")
            .expect("stream ended early");
        received.push_str(&String::from_utf8_lossy(&chunk));
    }
    received
}

#[tokio::test]
async fn test_first_get_streams_second_conflicts() {
    let (server, _provider, base_url) = running_bridge(&[]).await;
    let client = client();

    let mut first = client.get(format!("{base_url}/events")).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert!(
        first.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );
    let opening = read_until(&mut first, "event: connected").await;
    assert!(opening.contains("session_id"));

    let second = client.get(format!("{base_url}/events")).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["error"]["code"], "session_conflict");

    // The rejected request did not disturb the open session.
    assert_eq!(stream_status(&client, &base_url).await, "streaming");

    server.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_gets_yield_exactly_one_stream() {
    let (server, _provider, base_url) = running_bridge(&[]).await;
    let client = client();

    let attempts = (0..12).map(|_| client.get(format!("{base_url}/events")).send());
    let responses: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let ok = responses
        .iter()
        .filter(|r| r.status() == StatusCode::OK)
        .count();
    let conflicts = responses
        .iter()
        .filter(|r| r.status() == StatusCode::CONFLICT)
        .count();

    assert_eq!(ok, 1);
    assert_eq!(conflicts, 11);

    drop(responses);
    server.shutdown().await;
}

#[tokio::test]
async fn test_non_get_always_rejected() {
    let (server, _provider, base_url) = running_bridge(&[]).await;
    let client = client();
    let url = format!("{base_url}/events");

    let idle_post = client.post(&url).send().await.unwrap();
    assert_eq!(idle_post.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(idle_post.headers()["allow"], "GET");

    let preflight = client
        .request(reqwest::Method::OPTIONS, &url)
        .header("Origin", "http://localhost:3000")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), StatusCode::METHOD_NOT_ALLOWED);

    let _stream = client.get(&url).send().await.unwrap();
    let streaming_post = client.post(&url).send().await.unwrap();
    assert_eq!(streaming_post.status(), StatusCode::METHOD_NOT_ALLOWED);

    let streaming_delete = client.delete(&url).send().await.unwrap();
    assert_eq!(streaming_delete.status(), StatusCode::METHOD_NOT_ALLOWED);

    server.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_frees_the_stream() {
    let (server, _provider, base_url) = running_bridge(&[]).await;
    let client = client();

    let mut first = client.get(format!("{base_url}/events")).send().await.unwrap();
    read_until(&mut first, "event: connected").await;
    drop(first);

    let status_client = client.clone();
    let url = base_url.clone();
    wait_for_condition(
        move || {
            let client = status_client.clone();
            let url = url.clone();
            async move { stream_status(&client, &url).await == "idle" }
        },
        Duration::from_secs(5),
        Duration::from_millis(50),
    )
    .await
    .expect("stream never returned to idle");

    let second = client.get(format!("{base_url}/events")).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    server.shutdown().await;
}

#[tokio::test]
async fn test_lifecycle_events_are_streamed() {
    let (server, _provider, base_url) = running_bridge(&[]).await;
    let client = client();

    let mut stream = client.get(format!("{base_url}/events")).send().await.unwrap();
    read_until(&mut stream, "event: connected").await;

    let viewer = TestProvider::new("Listing", false, false);
    server.attach(viewer.clone()).await.unwrap();

    let received = read_until(&mut stream, "event: provider_registered").await;
    assert!(received.contains("\"provider\":\"Listing\""));

    let viewer_ref: hostbridge_server::ProviderRef = viewer;
    assert!(server.promote(&viewer_ref));
    read_until(&mut stream, "event: provider_promoted").await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_ends_open_stream() {
    let (server, _provider, base_url) = running_bridge(&[]).await;
    let client = client();

    let mut stream = client.get(format!("{base_url}/events")).send().await.unwrap();
    read_until(&mut stream, "event: connected").await;

    assert!(server.shutdown().await);

    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match stream.chunk().await {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "stream stayed open after shutdown");
}

#[tokio::test]
async fn test_restarted_listener_streams_again() {
    let (server, provider, base_url) = running_bridge(&[]).await;
    let client = client();

    let mut stream = client.get(format!("{base_url}/events")).send().await.unwrap();
    read_until(&mut stream, "event: connected").await;
    assert!(server.shutdown().await);
    drop(stream);

    // Same provider re-attaches; the new listener starts with an idle stream.
    let base_url = attach_and_url(&server, provider.clone()).await;
    assert_eq!(stream_status(&client, &base_url).await, "idle");

    let reopened = client.get(format!("{base_url}/events")).send().await.unwrap();
    assert_eq!(reopened.status(), StatusCode::OK);

    drop(reopened);
    server.shutdown().await;
}
