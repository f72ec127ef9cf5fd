#![allow(clippy::unwrap_used)]
// Integration tests for `WhiteClient` using wiremock.

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rgbw2_api::{BasicAuth, Error, TransportConfig, WhiteClient, WhiteStatus};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup(transport: TransportConfig) -> (MockServer, WhiteClient) {
    let server = MockServer::start().await;
    let client = WhiteClient::new(&server.uri(), &transport).unwrap();
    (server, client)
}

fn fast_transport() -> TransportConfig {
    TransportConfig::default().with_timeout(Duration::from_millis(500))
}

fn ok_body(is_on: bool, brightness: u8) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "ison": is_on,
        "brightness": brightness,
        "power": 5.2,
        "overpower": false,
    }))
}

async fn received_queries(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| match r.url.query() {
            Some(q) => format!("{} {}?{q}", r.method, r.url.path()),
            None => format!("{} {}", r.method, r.url.path()),
        })
        .collect()
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_get_status() {
    let (server, client) = setup(fast_transport()).await;

    Mock::given(method("GET"))
        .and(path("/white/0"))
        .respond_with(ok_body(true, 42))
        .mount(&server)
        .await;

    let status = client.get_status(0).await.unwrap();

    assert_eq!(
        status,
        WhiteStatus {
            is_on: true,
            brightness: 42
        }
    );
    assert_eq!(received_queries(&server).await, vec!["GET /white/0"]);
}

#[tokio::test]
async fn test_set_brightness_clamps() {
    let (server, client) = setup(fast_transport()).await;

    Mock::given(method("GET"))
        .and(path("/white/1"))
        .and(query_param("brightness", "100"))
        .respond_with(ok_body(true, 100))
        .mount(&server)
        .await;

    let status = client.set_brightness(1, 120.0, None).await.unwrap();

    assert_eq!(status.brightness, 100);
    assert_eq!(
        received_queries(&server).await,
        vec!["GET /white/1?brightness=100"]
    );
}

#[tokio::test]
async fn test_set_on_with_brightness_combined() {
    let (server, client) = setup(fast_transport()).await;

    Mock::given(method("GET"))
        .and(path("/white/2"))
        .respond_with(ok_body(true, 25))
        .mount(&server)
        .await;

    let status = client.set_on_with_brightness(2, 24.6, None).await.unwrap();

    assert!(status.is_on);
    assert_eq!(
        received_queries(&server).await,
        vec!["GET /white/2?turn=on&brightness=25"]
    );
}

#[tokio::test]
async fn test_transition_is_rounded_and_clamped() {
    let (server, client) = setup(fast_transport()).await;

    Mock::given(method("GET"))
        .and(path("/white/3"))
        .respond_with(ok_body(false, 0))
        .mount(&server)
        .await;

    client.set_on(3, false, Some(-40.0)).await.unwrap();
    client.set_on(3, true, Some(199.6)).await.unwrap();
    client.set_brightness(3, 10.0, Some(0.4)).await.unwrap();

    assert_eq!(
        received_queries(&server).await,
        vec![
            "GET /white/3?turn=off&transition=0",
            "GET /white/3?turn=on&transition=200",
            "GET /white/3?brightness=10&transition=0",
        ]
    );
}

#[tokio::test]
async fn test_basic_auth_header() {
    let auth = BasicAuth::from_parts(
        Some("admin".into()),
        Some(SecretString::from("secret")),
    );
    let (server, client) = setup(fast_transport().with_auth(auth)).await;

    Mock::given(method("GET"))
        .and(path("/white/0"))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ok_body(false, 0))
        .expect(1)
        .mount(&server)
        .await;

    client.get_status(0).await.unwrap();
}

// ── Validation ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_invalid_channel_makes_no_request() {
    let (server, client) = setup(fast_transport()).await;

    for channel in [4_u8, 7, 255] {
        let result = client.set_brightness(channel, 50.0, None).await;
        assert!(
            matches!(result, Err(Error::InvalidChannel { channel: c }) if c == channel),
            "expected InvalidChannel, got: {result:?}"
        );
    }
    let result = client.get_status(4).await;
    assert!(matches!(result, Err(Error::InvalidChannel { .. })));

    assert!(server.received_requests().await.unwrap().is_empty());
}

// ── Retry behaviour ─────────────────────────────────────────────────

#[tokio::test]
async fn test_retries_once_after_timeout() {
    let transport = TransportConfig::default()
        .with_timeout(Duration::from_millis(100))
        .with_retries(1);
    let (server, client) = setup(transport).await;

    Mock::given(method("GET"))
        .and(path("/white/0"))
        .respond_with(ok_body(true, 99).set_delay(Duration::from_secs(2)))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/white/0"))
        .respond_with(ok_body(true, 10))
        .mount(&server)
        .await;

    let status = client.get_status(0).await.unwrap();

    assert_eq!(
        status,
        WhiteStatus {
            is_on: true,
            brightness: 10
        }
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_timeout_surfaces_after_budget() {
    let transport = TransportConfig::default()
        .with_timeout(Duration::from_millis(50))
        .with_retries(1);
    let (server, client) = setup(transport).await;

    Mock::given(method("GET"))
        .respond_with(ok_body(true, 10).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let result = client.get_status(0).await;

    assert!(
        matches!(result, Err(Error::Timeout { timeout_ms: 50 })),
        "expected Timeout, got: {result:?}"
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_non_success_status_is_retried() {
    let transport = fast_transport().with_retries(2);
    let (server, client) = setup(transport).await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ok_body(true, 60))
        .mount(&server)
        .await;

    let status = client.set_brightness(0, 60.0, None).await.unwrap();

    assert_eq!(status.brightness, 60);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_non_success_status_surfaces() {
    let (server, client) = setup(fast_transport().with_retries(0)).await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.get_status(1).await.unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_parse_error_is_not_retried() {
    let (server, client) = setup(fast_transport().with_retries(3)).await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;

    let result = client.get_status(0).await;

    assert!(
        matches!(result, Err(Error::Parse { .. })),
        "expected Parse error, got: {result:?}"
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
