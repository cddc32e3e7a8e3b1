//! Error handling for the Zulip client.
//!
//! | Category | Produced by | Retried by the poll loop |
//! |----------|-------------|--------------------------|
//! | Network | connection/timeout/read failures | Yes |
//! | Server | HTTP 5xx | Yes |
//! | Client | HTTP 4xx, `result: error` | No |
//! | Protocol | undecodable bodies | Configurable (default yes) |
//! | Caller | handler errors, task panics | No |
//! | Configuration | bad [`crate::ClientConfig`] | No |
//!
//! Every error that comes from an API call names the [`Operation`] that
//! failed, so a caller can tell a rejected registration from a rejected
//! poll.

mod category;
mod stream;
mod zulip_error;

pub use category::ErrorCategory;
pub use stream::StreamError;
pub use zulip_error::{HandlerError, Operation, ZulipError};

/// Result alias for client operations.
pub type ZulipResult<T> = Result<T, ZulipError>;
