#![forbid(unsafe_code)]

//! Progress reporting from a running operation to the owner thread.
//!
//! The operation holds a [`ProgressReporter`] (cheap to clone, `Send`), the
//! owner side reads from the [`ProgressChannel`] published on the command.
//! Updates arrive in the order they were sent.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::task::{Context, Poll};

use futures::StreamExt;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures::task::noop_waker_ref;

/// One progress report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressUpdate {
    pub completed: u64,
    /// `None` when the amount of work is unknown.
    pub total: Option<u64>,
    pub message: Option<String>,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(completed: u64, total: u64) -> Self {
        Self {
            completed,
            total: Some(total),
            message: None,
        }
    }

    /// Progress with an unknown total.
    #[must_use]
    pub fn indeterminate(completed: u64) -> Self {
        Self {
            completed,
            total: None,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Completed share in `[0.0, 1.0]`, when the total is known.
    #[must_use]
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.completed.min(total) as f64) / (total as f64)),
            None => None,
        }
    }
}

/// Sending side, handed to the operation.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: UnboundedSender<ProgressUpdate>,
}

impl ProgressReporter {
    /// Send an update. Returns `false` once the channel has been dropped.
    pub fn report(&self, update: ProgressUpdate) -> bool {
        self.tx.unbounded_send(update).is_ok()
    }
}

/// Receiving side, read on the owner thread.
pub struct ProgressChannel {
    rx: RefCell<UnboundedReceiver<ProgressUpdate>>,
    latest: RefCell<Option<ProgressUpdate>>,
    received: Cell<u64>,
}

impl fmt::Debug for ProgressChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressChannel")
            .field("latest", &*self.latest.borrow())
            .field("received", &self.received.get())
            .finish()
    }
}

impl ProgressChannel {
    #[must_use]
    pub fn new() -> (Self, ProgressReporter) {
        let (tx, rx) = unbounded();
        (
            Self {
                rx: RefCell::new(rx),
                latest: RefCell::new(None),
                received: Cell::new(0),
            },
            ProgressReporter { tx },
        )
    }

    fn record(&self, update: &ProgressUpdate) {
        *self.latest.borrow_mut() = Some(update.clone());
        self.received.set(self.received.get() + 1);
    }

    /// Take every update that has arrived so far, oldest first.
    pub fn drain(&self) -> Vec<ProgressUpdate> {
        let mut drained = Vec::new();
        let mut cx = Context::from_waker(noop_waker_ref());
        let mut rx = self.rx.borrow_mut();
        while let Poll::Ready(Some(update)) = rx.poll_next_unpin(&mut cx) {
            self.record(&update);
            drained.push(update);
        }
        drained
    }

    /// Most recent update, after draining pending ones.
    #[must_use]
    pub fn latest(&self) -> Option<ProgressUpdate> {
        self.drain();
        self.latest.borrow().clone()
    }

    /// Total number of updates read from the channel.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.get()
    }

    /// Wait for the next update. Resolves to `None` once every reporter is
    /// gone and the channel is empty.
    pub fn next_update(&self) -> impl Future<Output = Option<ProgressUpdate>> + '_ {
        futures::future::poll_fn(move |cx| {
            let polled = self.rx.borrow_mut().poll_next_unpin(cx);
            if let Poll::Ready(Some(update)) = &polled {
                self.record(update);
            }
            polled
        })
    }
}
