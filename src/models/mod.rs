mod event;
mod message;

pub use event::{
    Event, EventFilter, EventsResponse, NarrowTerm, QueueHandle, RegisterResponse, MESSAGE_EVENT,
};
pub use message::{Message, MessageRequest, SendMessageResponse};

use serde::Deserialize;

/// The `result`/`msg` pair every API response carries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub msg: String,
}

impl ApiEnvelope {
    pub fn is_success(&self) -> bool {
        self.result == "success"
    }

    /// The server message, if it sent a non-empty one.
    pub fn message(&self) -> Option<&str> {
        if self.msg.is_empty() {
            None
        } else {
            Some(&self.msg)
        }
    }
}
