//! Trait abstractions for dependency injection and testability.
//!
//! - [`HttpClient`] - the transport every API call goes through

pub mod http;

pub use http::{Headers, HttpClient, HttpError, Response};
