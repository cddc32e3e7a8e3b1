//! Mock implementations for testing.
//!
//! - [`MockHttpClient`] - scripted, recording HTTP transport

pub mod http;

pub use http::{MockHttpClient, MockResponse, RecordedRequest};
