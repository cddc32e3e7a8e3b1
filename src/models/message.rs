//! Message types for sending and for `message` event payloads.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A message to post via `POST /messages`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRequest {
    /// A message to a stream (channel) under a topic.
    Stream {
        to: String,
        subject: String,
        content: String,
    },
    /// A direct message to one or more users.
    Private { to: Vec<String>, content: String },
}

impl MessageRequest {
    pub fn stream(
        to: impl Into<String>,
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        MessageRequest::Stream {
            to: to.into(),
            subject: subject.into(),
            content: content.into(),
        }
    }

    pub fn private<I, S>(to: I, content: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MessageRequest::Private {
            to: to.into_iter().map(Into::into).collect(),
            content: content.into(),
        }
    }

    /// `"stream"` or `"private"`, as the API spells it.
    pub fn message_type(&self) -> &'static str {
        match self {
            MessageRequest::Stream { .. } => "stream",
            MessageRequest::Private { .. } => "private",
        }
    }

    /// Form parameters in the order the API documents them.
    ///
    /// Private recipients are sent as a JSON-encoded array; streams as a
    /// bare name plus a subject.
    pub fn form_params(&self) -> Result<Vec<(&'static str, String)>, serde_json::Error> {
        let mut params = vec![("type", self.message_type().to_string())];
        match self {
            MessageRequest::Stream {
                to,
                subject,
                content,
            } => {
                params.push(("to", to.clone()));
                params.push(("subject", subject.clone()));
                params.push(("content", content.clone()));
            }
            MessageRequest::Private { to, content } => {
                params.push(("to", serde_json::to_string(to)?));
                params.push(("content", content.clone()));
            }
        }
        Ok(params)
    }
}

/// Body of a successful `POST /messages`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SendMessageResponse {
    pub id: i64,
    #[serde(default)]
    pub msg: String,
}

/// The `message` object carried by a `message` event.
///
/// Only `id` is required; everything the server adds beyond the named
/// fields lands in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    #[serde(default)]
    pub sender_email: Option<String>,
    #[serde(default)]
    pub sender_full_name: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    /// Stream name for stream messages, list of recipients for private ones.
    #[serde(default)]
    pub display_recipient: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn is_private(&self) -> bool {
        self.message_type.as_deref() == Some("private")
    }

    /// Stream name, for stream messages.
    pub fn stream_name(&self) -> Option<&str> {
        match &self.display_recipient {
            Some(Value::String(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    }
}
