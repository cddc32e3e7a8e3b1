//! Zulip API client.
//!
//! One-shot API calls live here: sending messages and registering,
//! releasing and polling event queues. The long-running streaming session
//! built on top of them is in [`crate::stream`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::adapters::ReqwestHttpClient;
use crate::config::ClientConfig;
use crate::error::{Operation, ZulipError, ZulipResult};
use crate::models::{
    ApiEnvelope, Event, EventFilter, EventsResponse, MessageRequest, QueueHandle,
    RegisterResponse, SendMessageResponse,
};
use crate::traits::{HttpClient, HttpError, Response};
use crate::transport::ApiTransport;

struct ClientInner<C> {
    config: ClientConfig,
    transport: ApiTransport<C>,
}

/// Client for a Zulip server.
///
/// Cheap to clone; clones share the underlying HTTP client.
///
/// # Example
///
/// ```ignore
/// use zulip_client::{ClientConfig, ZulipClient};
///
/// let config = ClientConfig::new("https://chat.example.com", "bot@example.com", "api-key");
/// let client = ZulipClient::new(config)?;
/// client.send_public_message("general", "greetings", "hello").await?;
/// ```
pub struct ZulipClient<C = ReqwestHttpClient> {
    inner: Arc<ClientInner<C>>,
}

impl<C> Clone for ZulipClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ZulipClient<ReqwestHttpClient> {
    /// Create a client backed by reqwest, using the config's timeouts.
    pub fn new(config: ClientConfig) -> ZulipResult<Self> {
        config.validate()?;
        let http = ReqwestHttpClient::from_config(&config)?;
        Self::with_http(config, http)
    }
}

impl<C: HttpClient> ZulipClient<C> {
    /// Create a client over any [`HttpClient`].
    pub fn with_http(config: ClientConfig, http: C) -> ZulipResult<Self> {
        config.validate()?;
        let transport = ApiTransport::new(&config, http);
        Ok(Self {
            inner: Arc::new(ClientInner { config, transport }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Server base URL without trailing slash.
    pub fn site(&self) -> &str {
        self.inner.transport.base_url()
    }

    /// Post a message. Returns the id the server assigned to it.
    pub async fn send_message(&self, request: &MessageRequest) -> ZulipResult<SendMessageResponse> {
        let op = Operation::SendMessage;
        let params = request.form_params().map_err(|e| malformed(op, e))?;
        let response = self
            .inner
            .transport
            .post("/messages", &params)
            .await
            .map_err(|e| transport_error(op, e))?;

        if !response.is_success() {
            return Err(rejected(op, &response));
        }
        let sent: SendMessageResponse = parse_success(op, &response)?;
        debug!("Sent {} message {}", request.message_type(), sent.id);
        Ok(sent)
    }

    /// Post to a stream under a topic.
    pub async fn send_public_message(
        &self,
        to: &str,
        subject: &str,
        content: &str,
    ) -> ZulipResult<SendMessageResponse> {
        self.send_message(&MessageRequest::stream(to, subject, content))
            .await
    }

    /// Send a direct message to one or more users.
    pub async fn send_private_message<I, S>(
        &self,
        to: I,
        content: &str,
    ) -> ZulipResult<SendMessageResponse>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send_message(&MessageRequest::private(to, content))
            .await
    }

    /// Open an event queue for `filter`.
    ///
    /// Never retried; any failure is returned to the caller.
    pub async fn register(&self, filter: &EventFilter) -> ZulipResult<QueueHandle> {
        let op = Operation::Register;
        let params = filter
            .register_params()
            .map_err(|e| malformed(op, e))?;
        let response = self
            .inner
            .transport
            .post("/register", &params)
            .await
            .map_err(|e| ZulipError::Registration {
                status: None,
                message: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(ZulipError::Registration {
                status: Some(response.status),
                message: server_message(&response),
            });
        }

        let envelope: ApiEnvelope = decode(op, &response)?;
        if !envelope.is_success() {
            return Err(ZulipError::Registration {
                status: Some(response.status),
                message: envelope
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| response.reason_phrase()),
            });
        }

        let registered: RegisterResponse = decode(op, &response)?;
        info!(
            "Registered event queue {} (last_event_id={})",
            registered.queue_id, registered.last_event_id
        );
        Ok(QueueHandle::new(
            registered.queue_id,
            registered.last_event_id,
        ))
    }

    /// Release an event queue.
    ///
    /// A 4xx answer means the server no longer knows the queue; that comes
    /// back as [`ZulipError::UnknownQueue`], which
    /// [`ZulipError::is_recoverable`] reports as safe to ignore.
    pub async fn unregister(&self, queue_id: &str) -> ZulipResult<()> {
        let op = Operation::Unregister;
        let response = self
            .inner
            .transport
            .delete("/events", &[("queue_id", queue_id.to_string())])
            .await
            .map_err(|e| transport_error(op, e))?;

        if response.is_client_error() {
            return Err(ZulipError::UnknownQueue {
                queue_id: queue_id.to_string(),
                message: server_message(&response),
            });
        }
        if !response.is_success() {
            return Err(rejected(op, &response));
        }

        let _: ApiEnvelope = parse_success(op, &response)?;
        info!("Released event queue {}", queue_id);
        Ok(())
    }

    /// Fetch the next batch of events after the handle's cursor.
    ///
    /// Blocks for as long as the server holds the long-poll. Does not move
    /// the cursor; the caller advances it as it processes events.
    pub async fn get_events(&self, handle: &QueueHandle) -> ZulipResult<Vec<Event>> {
        let op = Operation::Poll;
        let query = [
            ("queue_id", handle.queue_id().to_string()),
            ("last_event_id", handle.last_event_id().to_string()),
        ];
        let response = self
            .inner
            .transport
            .get("/events", &query)
            .await
            .map_err(|e| transport_error(op, e))?;

        if response.is_server_error() {
            return Err(ZulipError::TransientServer {
                operation: op,
                status: Some(response.status),
                message: server_message(&response),
            });
        }
        if !response.is_success() {
            return Err(rejected(op, &response));
        }

        let batch: EventsResponse = parse_success(op, &response)?;
        Ok(batch.events)
    }
}

/// Decode a 2xx body: check `result`, then decode the payload as `T`.
fn parse_success<T: DeserializeOwned>(op: Operation, response: &Response) -> ZulipResult<T> {
    let envelope: ApiEnvelope = decode(op, response)?;
    if !envelope.is_success() {
        return Err(ZulipError::Response {
            operation: op,
            status: Some(response.status),
            message: envelope
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| format!("result: {}", envelope.result)),
        });
    }
    decode(op, response)
}

fn decode<T: DeserializeOwned>(op: Operation, response: &Response) -> ZulipResult<T> {
    response.json().map_err(|e| malformed(op, e))
}

fn malformed(op: Operation, err: serde_json::Error) -> ZulipError {
    ZulipError::MalformedResponse {
        operation: op,
        message: err.to_string(),
    }
}

fn rejected(op: Operation, response: &Response) -> ZulipError {
    ZulipError::Response {
        operation: op,
        status: Some(response.status),
        message: server_message(response),
    }
}

/// The server's `msg` when the body carries one, else the reason phrase.
fn server_message(response: &Response) -> String {
    response
        .json::<ApiEnvelope>()
        .ok()
        .and_then(|env| env.message().map(str::to_string))
        .unwrap_or_else(|| response.reason_phrase())
}

fn transport_error(op: Operation, err: HttpError) -> ZulipError {
    if err.is_transient() {
        ZulipError::TransientServer {
            operation: op,
            status: None,
            message: err.to_string(),
        }
    } else {
        ZulipError::Response {
            operation: op,
            status: None,
            message: err.to_string(),
        }
    }
}
