//! Background event streams.
//!
//! [`EventStream`] runs a session on its own task and hands back a stop
//! handle; [`EventSubscription`] additionally turns the events into a
//! [`futures::Stream`].

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::cancel::{cancel_pair, StreamHandle};
use super::session::{decode_message, NoHandler, Sink, StreamSummary};
use crate::client::ZulipClient;
use crate::error::{HandlerError, StreamError, ZulipError};
use crate::models::{Event, EventFilter, Message, NarrowTerm};
use crate::traits::HttpClient;

/// A session running on a background task.
///
/// Dropping this detaches the task; it keeps running until stopped through
/// a [`StreamHandle`] obtained from [`handle`](Self::handle).
#[derive(Debug)]
pub struct EventStream {
    handle: StreamHandle,
    task: JoinHandle<Result<StreamSummary, StreamError>>,
}

impl EventStream {
    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    /// Request the session to stop. Idempotent.
    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end.
    pub async fn join(self) -> Result<StreamSummary, StreamError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ZulipError::Task(e.to_string()).into()),
        }
    }

    /// Stop the session and wait for it to release its queue.
    pub async fn shutdown(self) -> Result<StreamSummary, StreamError> {
        self.stop();
        self.join().await
    }
}

/// Buffered events per subscription before the session stops polling.
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 64;

/// Events as an async stream.
///
/// Events are buffered up to a fixed capacity; while the buffer is full the
/// session waits and issues no further polls. The session stops when the
/// subscription is dropped or [`close`](Self::close)d. The stream ends once
/// the session has ended.
///
/// ```ignore
/// use futures::StreamExt;
///
/// let mut events = client.subscribe(EventFilter::messages());
/// while let Some(event) = events.next().await {
///     println!("{:?}", event);
/// }
/// ```
#[derive(Debug)]
pub struct EventSubscription {
    rx: mpsc::Receiver<Event>,
    stream: Option<EventStream>,
}

impl EventSubscription {
    pub fn handle(&self) -> Option<StreamHandle> {
        self.stream.as_ref().map(EventStream::handle)
    }

    /// Stop the session and wait for it to end.
    pub async fn close(mut self) -> Result<StreamSummary, StreamError> {
        match self.stream.take() {
            Some(stream) => stream.shutdown().await,
            None => Err(ZulipError::Task("subscription already closed".to_string()).into()),
        }
    }
}

impl Stream for EventSubscription {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(stream) = &self.stream {
            stream.stop();
        }
    }
}

impl<C: HttpClient + 'static> ZulipClient<C> {
    /// Run [`stream_events`](Self::stream_events) on a background task.
    pub fn spawn_event_stream<F>(&self, filter: EventFilter, handler: F) -> EventStream
    where
        F: FnMut(Event) -> Result<(), HandlerError> + Send + 'static,
    {
        let (handle, signal) = cancel_pair();
        let client = self.clone();
        let task =
            tokio::spawn(async move { client.stream_events(filter, signal, handler).await });
        EventStream { handle, task }
    }

    /// Run [`stream_messages`](Self::stream_messages) on a background task.
    pub fn spawn_message_stream<F>(&self, narrow: Vec<NarrowTerm>, mut handler: F) -> EventStream
    where
        F: FnMut(Message) -> Result<(), HandlerError> + Send + 'static,
    {
        let filter = EventFilter::messages().with_narrow(narrow);
        self.spawn_event_stream(filter, move |event| match decode_message(event) {
            Some(message) => handler(message),
            None => Ok(()),
        })
    }

    /// Subscribe to events matching `filter` as a [`futures::Stream`],
    /// buffering up to [`DEFAULT_SUBSCRIPTION_BUFFER`] events.
    pub fn subscribe(&self, filter: EventFilter) -> EventSubscription {
        self.subscribe_with_buffer(filter, DEFAULT_SUBSCRIPTION_BUFFER)
    }

    /// Like [`subscribe`](Self::subscribe) with a buffer of `capacity`
    /// events (at least one).
    pub fn subscribe_with_buffer(&self, filter: EventFilter, capacity: usize) -> EventSubscription {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (handle, signal) = cancel_pair();
        let client = self.clone();
        let task = tokio::spawn(async move {
            client
                .run_session(filter, signal, Sink::<NoHandler>::Channel(tx))
                .await
        });
        EventSubscription {
            rx,
            stream: Some(EventStream { handle, task }),
        }
    }
}
