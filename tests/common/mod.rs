//! Common fixtures for integration tests.
//!
//! ```ignore
//! mod common;
//!
//! let server = MockServer::start().await;
//! common::mount_register(&server, "Q1", -1).await;
//! let client = common::client_for(&server);
//! ```

#![allow(dead_code)]

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zulip_client::{ClientConfig, RetryPolicy, ZulipClient};

pub const USERNAME: &str = "test";
pub const API_KEY: &str = "test_token";
/// `Basic base64("test:test_token")`
pub const AUTHORIZATION: &str = "Basic dGVzdDp0ZXN0X3Rva2Vu";

/// Install the crate's tracing subscriber once per test binary.
pub fn init_test_logging() {
    let _ = zulip_client::logging::init_logging("zulip_client=debug");
}

/// Config pointing at a mock server, with fast retries.
pub fn test_config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(server.uri(), USERNAME, API_KEY)
        .with_timeout(Duration::from_secs(10))
        .with_retry(RetryPolicy::fixed(Duration::from_millis(10)))
}

pub fn client_for(server: &MockServer) -> ZulipClient {
    init_test_logging();
    ZulipClient::new(test_config(server)).expect("valid test config")
}

pub fn success() -> Value {
    json!({"result": "success", "msg": ""})
}

pub fn register_body(queue_id: &str, last_event_id: i64) -> Value {
    json!({
        "result": "success",
        "msg": "",
        "queue_id": queue_id,
        "last_event_id": last_event_id,
        "max_message_id": -1
    })
}

pub fn events_body(events: Value) -> Value {
    json!({"result": "success", "msg": "", "events": events})
}

pub fn message_event(id: i64, message_id: i64, content: &str) -> Value {
    json!({
        "id": id,
        "type": "message",
        "flags": [],
        "message": {
            "id": message_id,
            "sender_email": "othello@zulip.example.com",
            "sender_full_name": "Othello",
            "content": content,
            "subject": "test",
            "type": "stream",
            "display_recipient": "general",
            "timestamp": 1491023319
        }
    })
}

pub async fn mount_register(server: &MockServer, queue_id: &str, last_event_id: i64) {
    Mock::given(method("POST"))
        .and(path("/api/v1/register"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(register_body(queue_id, last_event_id)),
        )
        .mount(server)
        .await;
}

pub async fn mount_unregister(server: &MockServer) {
    Mock::given(method("DELETE"))
        .and(path("/api/v1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success()))
        .mount(server)
        .await;
}

/// Requests the server received for `http_method` on `url_path`.
pub async fn received(server: &MockServer, http_method: &str, url_path: &str) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == http_method && r.url.path() == url_path)
        .collect()
}

/// Value of a query parameter on a received request.
pub fn query_value(request: &wiremock::Request, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}
