//! Client configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use zulip_client::{ClientConfig, RetryPolicy};
//!
//! let config = ClientConfig::new("https://chat.example.com", "bot@example.com", "abc123")
//!     .with_timeout(Duration::from_secs(120))
//!     .with_retry(RetryPolicy::default().with_max_retries(30));
//! ```

use std::time::Duration;

use crate::error::{ZulipError, ZulipResult};
use crate::stream::RetryPolicy;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default whole-request timeout. Must exceed the server's long-poll hold
/// time, otherwise every idle poll would end in a client-side timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

pub const ENV_SITE: &str = "ZULIP_SITE";
pub const ENV_EMAIL: &str = "ZULIP_EMAIL";
pub const ENV_API_KEY: &str = "ZULIP_API_KEY";
pub const ENV_RETRY_INTERVAL_MS: &str = "ZULIP_RETRY_INTERVAL_MS";
pub const ENV_MAX_RETRIES: &str = "ZULIP_MAX_RETRIES";

/// Connection and behaviour settings for [`crate::ZulipClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, e.g. `https://chat.example.com`
    pub site: String,
    /// Bot or user email used for basic auth
    pub username: String,
    /// API key used for basic auth
    pub api_key: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
    /// Retry policy for transient poll failures
    pub retry: RetryPolicy,
    /// Treat undecodable poll responses as transient (retry) instead of fatal
    pub malformed_is_transient: bool,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            site: String::new(),
            username: String::new(),
            api_key: String::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            malformed_is_transient: true,
            user_agent: format!("zulip-client-rs/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Create a config for a site and credentials, everything else default.
    pub fn new(
        site: impl Into<String>,
        username: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            site: site.into(),
            username: username.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_malformed_is_transient(mut self, transient: bool) -> Self {
        self.malformed_is_transient = transient;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build a config from `ZULIP_SITE`, `ZULIP_EMAIL` and `ZULIP_API_KEY`.
    ///
    /// `ZULIP_RETRY_INTERVAL_MS` and `ZULIP_MAX_RETRIES` optionally tune the
    /// poll retry policy.
    pub fn from_env() -> ZulipResult<Self> {
        let site = required_env(ENV_SITE)?;
        let username = required_env(ENV_EMAIL)?;
        let api_key = required_env(ENV_API_KEY)?;

        let mut retry = RetryPolicy::default();
        if let Some(ms) = optional_env::<u64>(ENV_RETRY_INTERVAL_MS)? {
            retry.interval = Duration::from_millis(ms);
        }
        if let Some(max) = optional_env::<u32>(ENV_MAX_RETRIES)? {
            retry.max_retries = Some(max);
        }

        let config = Self::new(site, username, api_key).with_retry(retry);
        config.validate()?;
        Ok(config)
    }

    /// Reject configs that cannot possibly authenticate.
    pub fn validate(&self) -> ZulipResult<()> {
        if self.site.trim().is_empty() {
            return Err(ZulipError::Config("site must not be empty".to_string()));
        }
        if !(self.site.starts_with("http://") || self.site.starts_with("https://")) {
            return Err(ZulipError::Config(format!(
                "site must be an http(s) URL, got '{}'",
                self.site
            )));
        }
        if self.username.is_empty() {
            return Err(ZulipError::Config("username must not be empty".to_string()));
        }
        if self.api_key.is_empty() {
            return Err(ZulipError::Config("api key must not be empty".to_string()));
        }
        Ok(())
    }

    /// The site URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.site.trim_end_matches('/')
    }
}

fn required_env(name: &str) -> ZulipResult<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ZulipError::Config(format!("{} is not set", name))),
    }
}

fn optional_env<T: std::str::FromStr>(name: &str) -> ZulipResult<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ZulipError::Config(format!("{} has invalid value '{}'", name, value))),
        Err(_) => Ok(None),
    }
}
