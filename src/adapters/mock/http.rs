//! Mock HTTP client for testing.
//!
//! Responses are scripted per method and URL path. Each route holds a queue
//! of one-shot responses followed by an optional sticky response, so a test
//! can say "500 once, then 200 forever".

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::traits::{Headers, HttpClient, HttpError, Response};

/// A recorded HTTP request for verification in tests.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method (GET, POST or DELETE)
    pub method: String,
    /// Full request URL, including the query string
    pub url: String,
    /// Request headers
    pub headers: Headers,
    /// Request body (POST and DELETE)
    pub body: Option<String>,
}

impl RecordedRequest {
    /// URL path without scheme, host or query.
    pub fn path(&self) -> &str {
        url_path(&self.url)
    }

    /// Decoded value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.url.split_once('?').map(|(_, q)| q)?;
        find_param(query, name)
    }

    /// Decoded value of a form body parameter.
    pub fn form_param(&self, name: &str) -> Option<String> {
        find_param(self.body.as_deref()?, name)
    }
}

/// Configuration for a mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a response with any status
    Success(Response),
    /// Fail at the transport level
    Error(HttpError),
    /// Never answer, like a long-poll the server is still holding
    Pending,
}

impl MockResponse {
    /// A JSON response with the given status.
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        MockResponse::Success(Response::new(status, body.to_string()))
    }

    /// A raw-bodied response with the given status.
    pub fn raw(status: u16, body: impl Into<String>) -> Self {
        MockResponse::Success(Response::new(status, body.into()))
    }
}

#[derive(Debug, Default)]
struct Route {
    queued: VecDeque<MockResponse>,
    sticky: Option<MockResponse>,
}

type RouteKey = (String, String);

/// Mock HTTP client for testing.
///
/// # Example
///
/// ```ignore
/// use zulip_client::adapters::mock::{MockHttpClient, MockResponse};
///
/// let http = MockHttpClient::new();
/// http.push_response("GET", "/api/v1/events", MockResponse::raw(500, "oops"));
/// http.set_response("GET", "/api/v1/events", MockResponse::Pending);
///
/// // ... drive the client ...
///
/// assert_eq!(http.request_count("GET", "/api/v1/events"), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    routes: Arc<Mutex<HashMap<RouteKey, Route>>>,
    default_response: Arc<Mutex<Option<MockResponse>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot response for `method` and `path`.
    pub fn push_response(&self, method: &str, path: &str, response: MockResponse) {
        lock(&self.routes)
            .entry(route_key(method, path))
            .or_default()
            .queued
            .push_back(response);
    }

    /// Set the response used once the queue for `method` and `path` is empty.
    pub fn set_response(&self, method: &str, path: &str, response: MockResponse) {
        lock(&self.routes)
            .entry(route_key(method, path))
            .or_default()
            .sticky = Some(response);
    }

    /// Set a default response for routes without any configuration.
    pub fn set_default_response(&self, response: MockResponse) {
        *lock(&self.default_response) = Some(response);
    }

    /// Get all recorded requests.
    pub fn get_requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Recorded requests for one route, in arrival order.
    pub fn requests_for(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method.eq_ignore_ascii_case(method) && r.path() == path)
            .cloned()
            .collect()
    }

    pub fn request_count(&self, method: &str, path: &str) -> usize {
        self.requests_for(method, path).len()
    }

    /// Clear all recorded requests.
    pub fn clear_requests(&self) {
        lock(&self.requests).clear();
    }

    fn record_request(&self, method: &str, url: &str, headers: &Headers, body: Option<String>) {
        lock(&self.requests).push(RecordedRequest {
            method: method.to_string(),
            url: url.to_string(),
            headers: headers.clone(),
            body,
        });
    }

    fn next_response(&self, method: &str, url: &str) -> Option<MockResponse> {
        {
            let mut routes = lock(&self.routes);
            if let Some(route) = routes.get_mut(&route_key(method, url_path(url))) {
                if let Some(response) = route.queued.pop_front() {
                    return Some(response);
                }
                if let Some(response) = &route.sticky {
                    return Some(response.clone());
                }
            }
        }
        lock(&self.default_response).clone()
    }

    async fn respond(&self, method: &str, url: &str) -> Result<Response, HttpError> {
        match self.next_response(method, url) {
            Some(MockResponse::Success(response)) => Ok(response),
            Some(MockResponse::Error(err)) => Err(err),
            Some(MockResponse::Pending) => std::future::pending().await,
            None => Err(HttpError::Other(format!(
                "No mock response for {} {}",
                method, url
            ))),
        }
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &str, headers: &Headers) -> Result<Response, HttpError> {
        self.record_request("GET", url, headers, None);
        self.respond("GET", url).await
    }

    async fn post(&self, url: &str, body: &str, headers: &Headers) -> Result<Response, HttpError> {
        self.record_request("POST", url, headers, Some(body.to_string()));
        self.respond("POST", url).await
    }

    async fn delete(
        &self,
        url: &str,
        body: &str,
        headers: &Headers,
    ) -> Result<Response, HttpError> {
        self.record_request("DELETE", url, headers, Some(body.to_string()));
        self.respond("DELETE", url).await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn route_key(method: &str, path: &str) -> RouteKey {
    (method.to_ascii_uppercase(), path.to_string())
}

fn url_path(url: &str) -> &str {
    let without_query = url.split('?').next().unwrap_or(url);
    match without_query.find("://") {
        Some(scheme_end) => {
            let rest = &without_query[scheme_end + 3..];
            rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
        }
        None => without_query,
    }
}

fn find_param(encoded: &str, name: &str) -> Option<String> {
    encoded.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key != name {
            return None;
        }
        let value = value.replace('+', " ");
        urlencoding::decode(&value).ok().map(|v| v.into_owned())
    })
}
