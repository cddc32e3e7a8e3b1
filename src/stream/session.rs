//! The long-poll session: register, poll, dispatch, deregister.
//!
//! A session owns exactly one server-side queue. It polls with the cursor of
//! the last processed event, delivers each new event to the handler in id
//! order, and retries transient poll failures per the client's
//! [`RetryPolicy`](super::RetryPolicy). Whatever ends the loop (a stop
//! request, a fatal error or a handler error), the queue is released exactly
//! once before the session returns.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::cancel::CancelSignal;
use super::retry::RetryState;
use crate::client::ZulipClient;
use crate::error::{HandlerError, StreamError, ZulipError};
use crate::models::{Event, EventFilter, Message, NarrowTerm, QueueHandle};
use crate::traits::HttpClient;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    StoppedByCaller,
    Failed,
}

/// Outcome of a session the caller stopped.
#[derive(Debug)]
pub struct StreamSummary {
    pub queue_id: String,
    /// Cursor at the time the session ended.
    pub last_event_id: i64,
    /// Events handed to the handler, or accepted by a subscription's buffer.
    pub events_delivered: u64,
    /// Set when releasing the queue failed.
    pub deregistration_error: Option<ZulipError>,
}

/// Where a session delivers events.
pub(crate) enum Sink<F> {
    /// Caller callback, run on the polling task.
    Handler(F),
    /// Bounded channel; delivery waits for room, so polling stops while the
    /// consumer is behind.
    Channel(mpsc::Sender<Event>),
}

/// Handler type of a channel-backed session.
pub(crate) type NoHandler = fn(Event) -> Result<(), HandlerError>;

struct StreamSession<F> {
    queue: QueueHandle,
    filter: EventFilter,
    cancel: CancelSignal,
    sink: Sink<F>,
    retry: RetryState,
    malformed_is_transient: bool,
    state: SessionState,
    delivered: u64,
}

impl<F> StreamSession<F>
where
    F: FnMut(Event) -> Result<(), HandlerError>,
{
    /// Poll until stopped or failed. Returns the failure, if any.
    async fn run<C: HttpClient>(&mut self, client: &ZulipClient<C>) -> Option<ZulipError> {
        while self.state == SessionState::Running {
            if self.cancel.is_cancelled() {
                self.state = SessionState::StoppedByCaller;
                break;
            }

            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.state = SessionState::StoppedByCaller;
                    break;
                }
                result = client.get_events(&self.queue) => result,
            };

            match fetched {
                Ok(events) => {
                    self.retry.reset();
                    if let Err(err) = self.dispatch(events).await {
                        return Some(self.fail(err));
                    }
                }
                Err(err) if self.should_retry(&err) => match self.retry.next_delay() {
                    Some(delay) => {
                        warn!(
                            "Poll of queue {} failed (attempt {}): {}; retrying in {:?}",
                            self.queue.queue_id(),
                            self.retry.attempt(),
                            err,
                            delay
                        );
                        if !self.wait(delay).await {
                            self.state = SessionState::StoppedByCaller;
                        }
                    }
                    None => {
                        warn!(
                            "Giving up on queue {} after {} failed polls",
                            self.queue.queue_id(),
                            self.retry.attempt()
                        );
                        return Some(self.fail(err));
                    }
                },
                Err(err) => return Some(self.fail(err)),
            }
        }
        None
    }

    /// Deliver a batch in id order, skipping ids at or below the cursor.
    async fn dispatch(&mut self, mut events: Vec<Event>) -> Result<(), ZulipError> {
        if !events.is_empty() {
            debug!("Received {} events on queue {}", events.len(), self.queue.queue_id());
        }
        events.sort_by_key(|event| event.id);
        for event in events {
            if self.cancel.is_cancelled() {
                self.state = SessionState::StoppedByCaller;
                return Ok(());
            }
            if !self.queue.advance(event.id) {
                debug!(
                    "Skipping already processed event {} on queue {}",
                    event.id,
                    self.queue.queue_id()
                );
                continue;
            }
            if !self.filter.accepts(&event.event_type) {
                continue;
            }
            if !self.deliver(event).await? {
                self.state = SessionState::StoppedByCaller;
                return Ok(());
            }
            self.delivered += 1;
        }
        Ok(())
    }

    /// Returns `false` if the session stopped before the event was taken.
    async fn deliver(&mut self, event: Event) -> Result<bool, ZulipError> {
        match &mut self.sink {
            Sink::Handler(handler) => {
                handler(event).map_err(ZulipError::Handler)?;
                Ok(true)
            }
            Sink::Channel(tx) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Ok(false),
                sent = tx.send(event) => {
                    if sent.is_err() {
                        debug!("Subscriber for queue {} went away", self.queue.queue_id());
                    }
                    Ok(sent.is_ok())
                }
            },
        }
    }

    /// Sleep before a retry. Returns `false` if stopped while waiting.
    async fn wait(&mut self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn should_retry(&self, err: &ZulipError) -> bool {
        err.is_transient()
            || (self.malformed_is_transient && matches!(err, ZulipError::MalformedResponse { .. }))
    }

    fn fail(&mut self, err: ZulipError) -> ZulipError {
        self.state = SessionState::Failed;
        warn!(
            "Event stream on queue {} failed [{}]: {}",
            self.queue.queue_id(),
            err.error_code(),
            err
        );
        err
    }
}

/// Releases the queue in the background if the session future is dropped
/// before it could release it itself.
struct QueueRelease<C: HttpClient + 'static> {
    client: ZulipClient<C>,
    queue_id: Option<String>,
}

impl<C: HttpClient + 'static> QueueRelease<C> {
    fn disarm(&mut self) {
        self.queue_id = None;
    }
}

impl<C: HttpClient + 'static> Drop for QueueRelease<C> {
    fn drop(&mut self) {
        let Some(queue_id) = self.queue_id.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Event stream dropped outside a runtime; queue {} not released", queue_id);
            return;
        };
        debug!("Event stream dropped; releasing queue {} in background", queue_id);
        let client = self.client.clone();
        runtime.spawn(async move {
            if let Err(e) = client.unregister(&queue_id).await {
                debug!("Background release of queue {} failed: {}", queue_id, e);
            }
        });
    }
}

impl<C: HttpClient + 'static> ZulipClient<C> {
    /// Run an event stream on the current task until stopped or failed.
    ///
    /// Registers a queue for `filter`, then calls `handler` once per matching
    /// event, in id order, never twice for the same id. The handler runs on
    /// the polling task; polling pauses while it runs.
    ///
    /// Returns `Ok` when stopped through `cancel`. Returns `Err` when
    /// registration fails, a poll fails fatally, retries run out or the
    /// handler returns an error. In every case except a failed registration,
    /// the queue has been released (or its release attempted) by the time
    /// this returns.
    pub async fn stream_events<F>(
        &self,
        filter: EventFilter,
        cancel: CancelSignal,
        handler: F,
    ) -> Result<StreamSummary, StreamError>
    where
        F: FnMut(Event) -> Result<(), HandlerError>,
    {
        self.run_session(filter, cancel, Sink::Handler(handler)).await
    }

    pub(crate) async fn run_session<F>(
        &self,
        filter: EventFilter,
        cancel: CancelSignal,
        sink: Sink<F>,
    ) -> Result<StreamSummary, StreamError>
    where
        F: FnMut(Event) -> Result<(), HandlerError>,
    {
        let queue = self.register(&filter).await?;
        let mut release = QueueRelease {
            client: self.clone(),
            queue_id: Some(queue.queue_id().to_string()),
        };

        let mut session = StreamSession {
            queue,
            filter,
            cancel,
            sink,
            retry: RetryState::new(self.config().retry.clone()),
            malformed_is_transient: self.config().malformed_is_transient,
            state: SessionState::Running,
            delivered: 0,
        };
        let failure = session.run(self).await;

        let queue_id = session.queue.queue_id().to_string();
        let released = self.unregister(&queue_id).await;
        release.disarm();
        let deregistration = match released {
            Ok(()) => None,
            Err(e) if e.is_recoverable() => {
                debug!("Queue {} already gone: {}", queue_id, e);
                Some(e)
            }
            Err(e) => {
                warn!("Failed to release queue {}: {}", queue_id, e);
                Some(e)
            }
        };

        match failure {
            Some(error) => Err(StreamError::new(error).with_deregistration(deregistration)),
            None => {
                info!(
                    "Event stream on queue {} stopped after {} events",
                    queue_id, session.delivered
                );
                Ok(StreamSummary {
                    queue_id,
                    last_event_id: session.queue.last_event_id(),
                    events_delivered: session.delivered,
                    deregistration_error: deregistration,
                })
            }
        }
    }

    /// Like [`stream_events`](Self::stream_events), restricted to `message`
    /// events matching `narrow`, with the message decoded.
    ///
    /// Events whose `message` field does not decode are logged and skipped.
    pub async fn stream_messages<F>(
        &self,
        narrow: Vec<NarrowTerm>,
        cancel: CancelSignal,
        mut handler: F,
    ) -> Result<StreamSummary, StreamError>
    where
        F: FnMut(Message) -> Result<(), HandlerError>,
    {
        let filter = EventFilter::messages().with_narrow(narrow);
        self.stream_events(filter, cancel, move |event| match decode_message(event) {
            Some(message) => handler(message),
            None => Ok(()),
        })
        .await
    }
}

pub(crate) fn decode_message(mut event: Event) -> Option<Message> {
    let Some(raw) = event.payload.remove("message") else {
        warn!("Message event {} has no message payload; skipping", event.id);
        return None;
    };
    match serde_json::from_value(raw) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!("Undecodable message in event {}: {}; skipping", event.id, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockHttpClient, MockResponse};
    use crate::config::ClientConfig;
    use crate::error::Operation;
    use crate::stream::cancel::cancel_pair;
    use crate::stream::RetryPolicy;
    use serde_json::{json, Value};

    const REGISTER: &str = "/api/v1/register";
    const EVENTS: &str = "/api/v1/events";

    fn setup(config: ClientConfig) -> (ZulipClient<MockHttpClient>, MockHttpClient) {
        let http = MockHttpClient::new();
        http.set_response(
            "POST",
            REGISTER,
            MockResponse::json(
                200,
                json!({"result": "success", "msg": "", "queue_id": "Q1", "last_event_id": -1}),
            ),
        );
        http.set_response(
            "DELETE",
            EVENTS,
            MockResponse::json(200, json!({"result": "success", "msg": ""})),
        );
        http.set_response("GET", EVENTS, MockResponse::Pending);
        let client = ZulipClient::with_http(config, http.clone()).unwrap();
        (client, http)
    }

    fn config() -> ClientConfig {
        ClientConfig::new("https://zulip.example.com", "test", "test_token")
            .with_retry(RetryPolicy::fixed(Duration::from_millis(10)))
    }

    fn batch(events: Value) -> MockResponse {
        MockResponse::json(200, json!({"result": "success", "msg": "", "events": events}))
    }

    #[tokio::test]
    async fn test_stop_after_n_events() {
        let (client, http) = setup(config());
        http.push_response(
            "GET",
            EVENTS,
            batch(json!([
                {"id": 0, "type": "message"},
                {"id": 1, "type": "message"},
                {"id": 2, "type": "message"}
            ])),
        );

        let (handle, signal) = cancel_pair();
        let mut seen = Vec::new();
        let summary = client
            .stream_events(EventFilter::all(), signal, |event| {
                seen.push(event.id);
                if seen.len() == 2 {
                    handle.stop();
                }
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![0, 1]);
        assert_eq!(summary.queue_id, "Q1");
        assert_eq!(summary.events_delivered, 2);
        assert_eq!(summary.last_event_id, 1);
        assert!(summary.deregistration_error.is_none());
        assert_eq!(http.request_count("GET", EVENTS), 1);
        assert_eq!(http.request_count("DELETE", EVENTS), 1);
    }

    #[tokio::test]
    async fn test_stopped_before_start_still_releases_queue() {
        let (client, http) = setup(config());
        let (handle, signal) = cancel_pair();
        handle.stop();

        let summary = client
            .stream_events(EventFilter::all(), signal, |_| Ok(()))
            .await
            .unwrap();

        assert_eq!(summary.events_delivered, 0);
        assert_eq!(summary.last_event_id, -1);
        assert_eq!(http.request_count("GET", EVENTS), 0);
        assert_eq!(http.request_count("DELETE", EVENTS), 1);
    }

    #[tokio::test]
    async fn test_batch_sorted_and_stale_ids_skipped() {
        let (client, http) = setup(config());
        http.push_response(
            "GET",
            EVENTS,
            batch(json!([
                {"id": 1, "type": "message"},
                {"id": 0, "type": "message"}
            ])),
        );
        http.push_response(
            "GET",
            EVENTS,
            batch(json!([
                {"id": 3, "type": "message"},
                {"id": 1, "type": "message"},
                {"id": 2, "type": "message"}
            ])),
        );

        let (handle, signal) = cancel_pair();
        let mut seen = Vec::new();
        client
            .stream_events(EventFilter::all(), signal, |event| {
                seen.push(event.id);
                if event.id == 3 {
                    handle.stop();
                }
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![0, 1, 2, 3]);
        let polls = http.requests_for("GET", EVENTS);
        assert_eq!(polls[0].query_param("last_event_id").as_deref(), Some("-1"));
        assert_eq!(polls[1].query_param("last_event_id").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_filtered_events_advance_cursor() {
        let (client, http) = setup(config());
        http.push_response(
            "GET",
            EVENTS,
            batch(json!([
                {"id": 0, "type": "subscription", "op": "add"},
                {"id": 1, "type": "message", "message": {"id": 7}},
                {"id": 2, "type": "presence"}
            ])),
        );
        http.push_response("GET", EVENTS, batch(json!([{"id": 3, "type": "message"}])));

        let (handle, signal) = cancel_pair();
        let mut seen = Vec::new();
        client
            .stream_events(EventFilter::messages(), signal, |event| {
                assert!(event.is_message());
                seen.push(event.id);
                if event.id == 3 {
                    handle.stop();
                }
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![1, 3]);
        let polls = http.requests_for("GET", EVENTS);
        assert_eq!(polls[1].query_param("last_event_id").as_deref(), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let (client, http) = setup(
            ClientConfig::new("https://zulip.example.com", "test", "test_token"),
        );
        http.push_response("GET", EVENTS, MockResponse::raw(500, ""));
        http.push_response("GET", EVENTS, batch(json!([{"id": 0, "type": "message"}])));

        let (handle, signal) = cancel_pair();
        let mut seen = Vec::new();
        let started = tokio::time::Instant::now();
        let summary = client
            .stream_events(EventFilter::all(), signal, |event| {
                seen.push(event.id);
                handle.stop();
                Ok(())
            })
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(seen, vec![0]);
        assert_eq!(summary.events_delivered, 1);
        assert_eq!(http.request_count("GET", EVENTS), 2);
        assert_eq!(http.request_count("DELETE", EVENTS), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let config = config().with_retry(
            RetryPolicy::fixed(Duration::from_millis(5)).with_max_retries(2),
        );
        let (client, http) = setup(config);
        http.set_response("GET", EVENTS, MockResponse::raw(503, ""));

        let err = client
            .stream_events(EventFilter::all(), CancelSignal::never(), |_| Ok(()))
            .await
            .unwrap_err();

        assert!(matches!(
            err.error,
            ZulipError::TransientServer { status: Some(503), .. }
        ));
        assert!(err.deregistration.is_none());
        assert_eq!(http.request_count("GET", EVENTS), 3);
        assert_eq!(http.request_count("DELETE", EVENTS), 1);
    }

    #[tokio::test]
    async fn test_client_error_is_fatal() {
        let (client, http) = setup(config());
        http.push_response(
            "GET",
            EVENTS,
            MockResponse::json(400, json!({"result": "error", "msg": "Bad event queue id: Q1"})),
        );

        let err = client
            .stream_events(EventFilter::all(), CancelSignal::never(), |_| Ok(()))
            .await
            .unwrap_err();

        assert!(matches!(
            err.error,
            ZulipError::Response { operation: Operation::Poll, status: Some(400), .. }
        ));
        assert_eq!(http.request_count("GET", EVENTS), 1);
        assert_eq!(http.request_count("DELETE", EVENTS), 1);
    }

    #[tokio::test]
    async fn test_malformed_poll_retried_by_default() {
        let (client, http) = setup(config());
        http.push_response("GET", EVENTS, MockResponse::raw(200, "<html>oops</html>"));
        http.push_response("GET", EVENTS, batch(json!([{"id": 0, "type": "message"}])));

        let (handle, signal) = cancel_pair();
        let summary = client
            .stream_events(EventFilter::all(), signal, |_| {
                handle.stop();
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(summary.events_delivered, 1);
        assert_eq!(http.request_count("GET", EVENTS), 2);
    }

    #[tokio::test]
    async fn test_malformed_poll_fatal_when_configured() {
        let (client, http) = setup(config().with_malformed_is_transient(false));
        http.push_response("GET", EVENTS, MockResponse::raw(200, "<html>oops</html>"));

        let err = client
            .stream_events(EventFilter::all(), CancelSignal::never(), |_| Ok(()))
            .await
            .unwrap_err();

        assert!(matches!(err.error, ZulipError::MalformedResponse { .. }));
        assert_eq!(http.request_count("DELETE", EVENTS), 1);
    }

    #[tokio::test]
    async fn test_handler_error_ends_session() {
        let (client, http) = setup(config());
        http.push_response(
            "GET",
            EVENTS,
            batch(json!([
                {"id": 0, "type": "message"},
                {"id": 1, "type": "message"}
            ])),
        );

        let mut calls = 0;
        let err = client
            .stream_events(EventFilter::all(), CancelSignal::never(), |_| {
                calls += 1;
                Err("handler exploded".into())
            })
            .await
            .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err.error, ZulipError::Handler(_)));
        assert_eq!(err.error.to_string(), "event handler failed: handler exploded");
        assert_eq!(http.request_count("DELETE", EVENTS), 1);
    }

    #[tokio::test]
    async fn test_deregistration_failure_reported_with_original_error() {
        let (client, http) = setup(config());
        http.push_response("GET", EVENTS, MockResponse::raw(403, ""));
        http.set_response("DELETE", EVENTS, MockResponse::raw(500, ""));

        let err = client
            .stream_events(EventFilter::all(), CancelSignal::never(), |_| Ok(()))
            .await
            .unwrap_err();

        assert!(matches!(err.error, ZulipError::Response { status: Some(403), .. }));
        assert!(matches!(
            err.deregistration,
            Some(ZulipError::Response { operation: Operation::Unregister, .. })
        ));
    }

    #[tokio::test]
    async fn test_registration_failure_skips_release() {
        let (client, http) = setup(config());
        http.set_response(
            "POST",
            REGISTER,
            MockResponse::json(400, json!({"result": "error", "msg": "Invalid event type"})),
        );

        let err = client
            .stream_events(EventFilter::all(), CancelSignal::never(), |_| Ok(()))
            .await
            .unwrap_err();

        assert!(matches!(err.error, ZulipError::Registration { .. }));
        assert_eq!(http.request_count("GET", EVENTS), 0);
        assert_eq!(http.request_count("DELETE", EVENTS), 0);
    }

    #[tokio::test]
    async fn test_stop_interrupts_long_poll() {
        let (client, http) = setup(config());
        let (handle, signal) = cancel_pair();

        let task = tokio::spawn(async move {
            client
                .stream_events(EventFilter::all(), signal, |_| Ok(()))
                .await
        });

        while http.request_count("GET", EVENTS) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        handle.stop();

        let summary = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(summary.events_delivered, 0);
        assert_eq!(http.request_count("DELETE", EVENTS), 1);
    }

    #[tokio::test]
    async fn test_dropped_session_releases_queue() {
        let (client, http) = setup(config());

        let task = tokio::spawn(async move {
            client
                .stream_events(EventFilter::all(), CancelSignal::never(), |_| Ok(()))
                .await
        });

        while http.request_count("GET", EVENTS) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        task.abort();

        tokio::time::timeout(Duration::from_secs(1), async {
            while http.request_count("DELETE", EVENTS) == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(http.request_count("DELETE", EVENTS), 1);
    }

    #[tokio::test]
    async fn test_dropped_during_release_hands_off_to_background() {
        let (client, http) = setup(config());
        http.set_response("DELETE", EVENTS, MockResponse::Pending);
        let (handle, signal) = cancel_pair();

        let task = tokio::spawn(async move {
            client
                .stream_events(EventFilter::all(), signal, |_| Ok(()))
                .await
        });

        while http.request_count("GET", EVENTS) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        handle.stop();
        while http.request_count("DELETE", EVENTS) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        task.abort();

        tokio::time::timeout(Duration::from_secs(1), async {
            while http.request_count("DELETE", EVENTS) < 2 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_stream_messages_decodes_and_narrows() {
        let (client, http) = setup(config());
        http.push_response(
            "GET",
            EVENTS,
            batch(json!([
                {"id": 0, "type": "message", "message": {"id": 10, "content": "hi",
                    "type": "stream", "display_recipient": "general"}},
                {"id": 1, "type": "message", "message": "not an object"},
                {"id": 2, "type": "message", "message": {"id": 11, "content": "bye"}}
            ])),
        );

        let (handle, signal) = cancel_pair();
        let mut seen = Vec::new();
        let summary = client
            .stream_messages(vec![NarrowTerm::stream("general")], signal, |message| {
                seen.push((message.id, message.content.clone()));
                if message.id == 11 {
                    handle.stop();
                }
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![(10, "hi".to_string()), (11, "bye".to_string())]);
        assert_eq!(summary.events_delivered, 3);

        let register = &http.requests_for("POST", REGISTER)[0];
        assert_eq!(
            register.form_param("event_types").as_deref(),
            Some(r#"["message"]"#)
        );
        assert_eq!(
            register.form_param("narrow").as_deref(),
            Some(r#"[["stream","general"]]"#)
        );
    }
}
