//! Concrete implementations of [`crate::traits::HttpClient`].
//!
//! - [`ReqwestHttpClient`] - production transport using reqwest
//! - [`mock::MockHttpClient`] - scripted responses for tests

pub mod mock;
pub mod reqwest_http;

pub use mock::MockHttpClient;
pub use reqwest_http::ReqwestHttpClient;
