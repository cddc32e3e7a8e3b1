//! Event streaming on top of the long-poll queue API.
//!
//! - [`ZulipClient::stream_events`](crate::ZulipClient::stream_events) runs a
//!   session on the current task
//! - [`EventStream`] runs one in the background
//! - [`EventSubscription`] exposes one as a [`futures::Stream`]

mod cancel;
mod retry;
mod session;
mod subscription;

pub use cancel::{cancel_pair, CancelSignal, StreamHandle};
pub use retry::RetryPolicy;
pub use session::{SessionState, StreamSummary};
pub use subscription::{EventStream, EventSubscription, DEFAULT_SUBSCRIPTION_BUFFER};
