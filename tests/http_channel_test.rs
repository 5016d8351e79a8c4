//! HTTP channel integration tests
//!
//! Runs `HttpChannel` and `ChatClient` against a `wiremock` mock server.
//! Event-stream bodies use `set_body_raw(.., "text/event-stream")` so the
//! channel takes its streaming branch; JSON bodies take the buffered one.

mod common;

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use agentchat::channel::http::{REGION_HEADER, SESSION_HEADER, TARGET_HEADER};
use agentchat::channel::{Channel, ChannelError, ExchangeRequest, HttpChannel};
use agentchat::config::{Config, RuntimeConfig};
use agentchat::stream::{RecordingHandler, StreamSession};
use agentchat::{ChatClient, ErrorKind};

use common::delta;

fn runtime_for(server: &MockServer) -> RuntimeConfig {
    RuntimeConfig {
        endpoint: format!("{}/invocations", server.uri()),
        target: "agent-42".to_string(),
        region: "eu-west-1".to_string(),
        session_id: Some("http-session".to_string()),
        auth_token: Some("secret-token".to_string()),
    }
}

fn config_for(server: &MockServer) -> Config {
    let mut config = common::test_config();
    config.runtime = runtime_for(server);
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 2;
    config.retry.jitter = false;
    config
}

fn request() -> ExchangeRequest {
    ExchangeRequest {
        prompt: "hello".to_string(),
        session_id: "http-session".to_string(),
        target: "agent-42".to_string(),
        region: "eu-west-1".to_string(),
    }
}

#[tokio::test]
async fn test_event_stream_response_is_streamed() {
    let server = MockServer::start().await;
    let body = format!("{}{}", delta("Hello"), delta(", world"));

    Mock::given(method("POST"))
        .and(path("/invocations"))
        .and(header(SESSION_HEADER, "http-session"))
        .and(header(TARGET_HEADER, "agent-42"))
        .and(header(REGION_HEADER, "eu-west-1"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_json(json!({ "prompt": "hello" })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let channel = Arc::new(HttpChannel::new(&runtime_for(&server)).expect("channel"));
    let session = StreamSession::from_config(channel, &config_for(&server));
    let mut handler = RecordingHandler::default();

    let summary = session
        .run("hello", "http-session", &mut handler, &CancellationToken::new())
        .await;

    assert!(summary.success, "exchange failed: {:?}", summary.error);
    assert_eq!(
        handler.fragments(),
        vec!["Hello".to_string(), ", world".to_string()]
    );
    assert_eq!(handler.completions(), 1);
}

#[tokio::test]
async fn test_json_response_is_buffered() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/invocations"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "content": "buffered reply" })),
        )
        .mount(&server)
        .await;

    let channel = Arc::new(HttpChannel::new(&runtime_for(&server)).expect("channel"));
    let session = StreamSession::from_config(channel, &config_for(&server));
    let mut handler = RecordingHandler::default();

    let summary = session
        .run("hello", "http-session", &mut handler, &CancellationToken::new())
        .await;

    assert!(summary.success, "exchange failed: {:?}", summary.error);
    assert_eq!(handler.fragments(), vec!["buffered reply".to_string()]);
}

#[tokio::test]
async fn test_unauthorized_maps_to_status_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let channel = HttpChannel::new(&runtime_for(&server)).expect("channel");
    let err = channel.open(&request()).await.unwrap_err();

    assert_eq!(
        err,
        ChannelError::Status {
            status: 401,
            body: "token expired".to_string(),
        }
    );
}

#[tokio::test]
async fn test_client_does_not_retry_rejected_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = ChatClient::from_config(&config_for(&server)).expect("client");
    let summary = client.send_message("hello").await.unwrap();

    assert!(!summary.success);
    assert_eq!(
        client.store().error().map(|e| e.kind),
        Some(ErrorKind::Authentication)
    );
    assert_eq!(client.store().messages().len(), 1);
}

#[tokio::test]
async fn test_client_retries_unavailable_runtime() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .expect(3)
        .mount(&server)
        .await;

    let mut client = ChatClient::from_config(&config_for(&server)).expect("client");
    let summary = client.send_message("hello").await.unwrap();

    assert!(!summary.success);
    let error = client.store().error().expect("error recorded");
    assert!(error.retryable);
    assert_eq!(client.store().messages().len(), 1);
    assert_eq!(client.store().connection().connection_attempts, 3);
}

#[tokio::test]
async fn test_error_status_without_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let channel = HttpChannel::new(&runtime_for(&server)).expect("channel");
    let err = channel.open(&request()).await.unwrap_err();

    assert_eq!(
        err,
        ChannelError::Status {
            status: 500,
            body: String::new(),
        }
    );
    assert_eq!(err.code(), "ServiceUnavailableException");
}
