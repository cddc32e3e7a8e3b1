//! Authenticated request plumbing shared by every API call.
//!
//! Turns `(path, params)` into a full URL, a form-encoded body and the basic
//! auth header, then hands the request to an [`HttpClient`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::ClientConfig;
use crate::traits::{Headers, HttpClient, HttpError, Response};

pub const API_PREFIX: &str = "/api/v1";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Form/query parameters: ordered key-value pairs.
pub type Params = [(&'static str, String)];

pub(crate) struct ApiTransport<C> {
    http: C,
    base_url: String,
    authorization: String,
}

impl<C: HttpClient> ApiTransport<C> {
    pub(crate) fn new(config: &ClientConfig, http: C) -> Self {
        Self {
            http,
            base_url: config.base_url().to_string(),
            authorization: basic_auth(&config.username, &config.api_key),
        }
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) async fn get(&self, path: &str, query: &Params) -> Result<Response, HttpError> {
        let mut url = self.url(path);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&encode_params(query));
        }
        self.http.get(&url, &self.headers(false)).await
    }

    pub(crate) async fn post(&self, path: &str, form: &Params) -> Result<Response, HttpError> {
        let body = encode_params(form);
        self.http
            .post(&self.url(path), &body, &self.headers(true))
            .await
    }

    pub(crate) async fn delete(&self, path: &str, form: &Params) -> Result<Response, HttpError> {
        let body = encode_params(form);
        self.http
            .delete(&self.url(path), &body, &self.headers(true))
            .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    fn headers(&self, form: bool) -> Headers {
        let mut headers = Headers::new();
        headers.insert("Authorization".to_string(), self.authorization.clone());
        if form {
            headers.insert("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string());
        }
        headers
    }
}

/// `Basic base64(username:api_key)`
pub fn basic_auth(username: &str, api_key: &str) -> String {
    let credentials = format!("{}:{}", username, api_key);
    format!("Basic {}", STANDARD.encode(credentials))
}

/// Encode pairs as `application/x-www-form-urlencoded`.
pub fn encode_params(params: &Params) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}
