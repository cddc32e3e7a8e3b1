//! Caller-side stop signal for a streaming session.
//!
//! [`StreamHandle`] is held by whoever may want to stop the stream;
//! [`CancelSignal`] is held by the poll loop. Stopping is sticky: once set,
//! every clone of the signal observes it, including ones created later.

use std::sync::Arc;

use tokio::sync::watch;

/// Stops a running stream. Cheap to clone; every clone stops the same stream.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StreamHandle {
    /// Request the stream to stop. Idempotent.
    ///
    /// Takes effect at the next suspension point of the loop: an in-flight
    /// long-poll or retry wait is abandoned, and no further events are
    /// delivered once the handler returns.
    pub fn stop(&self) {
        if !self.tx.send_replace(true) {
            tracing::debug!("Stop requested for event stream");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new signal observing this handle.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observes a [`StreamHandle`].
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once stop has been requested.
    ///
    /// Never resolves if every [`StreamHandle`] was dropped without stopping.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// A connected handle and signal.
pub fn cancel_pair() -> (StreamHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (StreamHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}
