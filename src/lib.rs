//! Zulip API client with long-poll event streaming.
//!
//! [`ZulipClient`] sends messages and manages event queues. Its streaming
//! methods register a queue, long-poll it, hand every new event to a
//! callback in order, and release the queue when the stream ends.
//!
//! ```ignore
//! use zulip_client::{cancel_pair, ClientConfig, EventFilter, ZulipClient};
//!
//! let client = ZulipClient::new(ClientConfig::from_env()?)?;
//! let (handle, signal) = cancel_pair();
//! client
//!     .stream_events(EventFilter::messages(), signal, |event| {
//!         println!("{}: {:?}", event.id, event.get("message"));
//!         Ok(())
//!     })
//!     .await?;
//! ```

pub mod adapters;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod stream;
pub mod traits;
pub mod transport;

pub use client::ZulipClient;
pub use config::ClientConfig;
pub use error::{
    ErrorCategory, HandlerError, Operation, StreamError, ZulipError, ZulipResult,
};
pub use models::{
    Event, EventFilter, Message, MessageRequest, NarrowTerm, QueueHandle, SendMessageResponse,
};
pub use stream::{
    cancel_pair, CancelSignal, EventStream, EventSubscription, RetryPolicy, SessionState,
    StreamHandle, StreamSummary, DEFAULT_SUBSCRIPTION_BUFFER,
};
