//! Event queue types: filters, handles and the events themselves.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event type of a newly created message.
pub const MESSAGE_EVENT: &str = "message";

/// One term of a narrow: an `(operator, operand)` pair.
///
/// Serializes as a two-element JSON array, the form `/register` accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrowTerm(String, String);

impl NarrowTerm {
    pub fn new(operator: impl Into<String>, operand: impl Into<String>) -> Self {
        Self(operator.into(), operand.into())
    }

    /// Messages in the named stream.
    pub fn stream(name: impl Into<String>) -> Self {
        Self::new("stream", name)
    }

    /// Messages with the given topic.
    pub fn topic(name: impl Into<String>) -> Self {
        Self::new("topic", name)
    }

    pub fn sender(email: impl Into<String>) -> Self {
        Self::new("sender", email)
    }

    /// Messages with a flag, e.g. `is:private` or `is:mentioned`.
    pub fn is(flag: impl Into<String>) -> Self {
        Self::new("is", flag)
    }

    pub fn search(text: impl Into<String>) -> Self {
        Self::new("search", text)
    }

    pub fn operator(&self) -> &str {
        &self.0
    }

    pub fn operand(&self) -> &str {
        &self.1
    }
}

/// Which events a queue collects and which of them get delivered.
///
/// `event_types` is applied both at registration and again on delivery. An
/// empty set means "everything". `narrow` only shapes the server-side queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub event_types: BTreeSet<String>,
    pub narrow: Vec<NarrowTerm>,
}

impl EventFilter {
    /// A filter that accepts every event type.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only `message` events.
    pub fn messages() -> Self {
        Self::default().with_event_type(MESSAGE_EVENT)
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types.insert(event_type.into());
        self
    }

    pub fn with_event_types<I, S>(mut self, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_types
            .extend(event_types.into_iter().map(Into::into));
        self
    }

    pub fn with_narrow(mut self, narrow: Vec<NarrowTerm>) -> Self {
        self.narrow = narrow;
        self
    }

    pub fn with_narrow_term(mut self, term: NarrowTerm) -> Self {
        self.narrow.push(term);
        self
    }

    /// Whether an event of this type should reach the caller.
    pub fn accepts(&self, event_type: &str) -> bool {
        self.event_types.is_empty() || self.event_types.contains(event_type)
    }

    /// Form parameters for `POST /register`.
    ///
    /// Empty fields are omitted rather than sent as `[]`: the server treats a
    /// missing `event_types` as "all types" but an explicit empty list as
    /// "no types".
    pub fn register_params(&self) -> Result<Vec<(&'static str, String)>, serde_json::Error> {
        let mut params = Vec::new();
        if !self.event_types.is_empty() {
            let types: Vec<&str> = self.event_types.iter().map(String::as_str).collect();
            params.push(("event_types", serde_json::to_string(&types)?));
        }
        if !self.narrow.is_empty() {
            params.push(("narrow", serde_json::to_string(&self.narrow)?));
        }
        Ok(params)
    }
}

/// A registered server-side event queue plus the cursor into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    queue_id: String,
    last_event_id: i64,
}

impl QueueHandle {
    pub fn new(queue_id: impl Into<String>, last_event_id: i64) -> Self {
        Self {
            queue_id: queue_id.into(),
            last_event_id,
        }
    }

    pub fn queue_id(&self) -> &str {
        &self.queue_id
    }

    /// Id of the most recently processed event.
    pub fn last_event_id(&self) -> i64 {
        self.last_event_id
    }

    /// Move the cursor to `event_id`.
    ///
    /// Returns `false` and leaves the cursor untouched when `event_id` is not
    /// past it; such an event has already been processed.
    pub fn advance(&mut self, event_id: i64) -> bool {
        if event_id <= self.last_event_id {
            return false;
        }
        self.last_event_id = event_id;
        true
    }
}

/// A single event from the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Every other field of the event object.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Event {
    pub fn is_message(&self) -> bool {
        self.event_type == MESSAGE_EVENT
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// Body of a successful `POST /register`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub queue_id: String,
    pub last_event_id: i64,
    #[serde(default)]
    pub max_message_id: Option<i64>,
}

/// Body of a `GET /events` response.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsResponse {
    #[serde(default)]
    pub events: Vec<Event>,
}
