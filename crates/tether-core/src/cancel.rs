#![forbid(unsafe_code)]

//! Cooperative cancellation for command executions.
//!
//! A [`CancelToken`] is handed to the operation; the matching
//! [`CancelSource`] stays with whoever may request cancellation (the
//! cancel command of an execution). Tokens are cheaply cloneable, `Send`
//! and `Sync`, so operations running on a worker thread can observe them.
//!
//! Cancellation is a request, never a forced stop: the operation decides
//! when to look at the token, either by polling [`CancelToken::check`] at
//! natural yield points or by awaiting [`CancelToken::cancelled`].
//!
//! # Example
//!
//! ```
//! use tether_core::cancel::CancelToken;
//!
//! let (token, source) = CancelToken::new();
//! assert!(token.check().is_ok());
//!
//! source.cancel();
//! assert!(token.is_cancelled());
//! assert!(token.check().is_err());
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::logging::debug;

// ─── Token ID generation ─────────────────────────────────────────────────────

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

// ─── Metrics counters ────────────────────────────────────────────────────────

static CANCELLATIONS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Total number of cancellations requested in this process.
#[must_use]
pub fn cancellations_total() -> u64 {
    CANCELLATIONS_TOTAL.load(Ordering::Relaxed)
}

// ─── Inner shared state ──────────────────────────────────────────────────────

#[derive(Debug)]
struct TokenInner {
    id: u64,
    cancellable: bool,
    cancelled: AtomicBool,
    /// Tasks parked in [`WaitForCancellation`].
    wakers: Mutex<Vec<Waker>>,
}

impl TokenInner {
    fn new(cancellable: bool) -> Self {
        Self {
            id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
            cancellable,
            cancelled: AtomicBool::new(false),
            wakers: Mutex::new(Vec::new()),
        }
    }
}

// ─── CancelToken ─────────────────────────────────────────────────────────────

/// Observer side of a cancellation signal.
#[derive(Clone, Debug)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Create a linked token/source pair.
    #[must_use]
    pub fn new() -> (Self, CancelSource) {
        let inner = Arc::new(TokenInner::new(true));
        (
            Self {
                inner: Arc::clone(&inner),
            },
            CancelSource { inner },
        )
    }

    /// A token that can never be cancelled.
    ///
    /// Given to executions of commands that do not offer cancellation.
    #[must_use]
    pub fn never() -> Self {
        Self {
            inner: Arc::new(TokenInner::new(false)),
        }
    }

    /// Unique token ID.
    #[must_use]
    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether cancellation has been requested.
    #[must_use]
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Whether a [`CancelSource`] exists for this token.
    #[must_use]
    pub fn can_be_cancelled(&self) -> bool {
        self.inner.cancellable
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    ///
    /// Meant to be used with `?` inside an operation body.
    #[inline]
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Future that resolves when cancellation is requested.
    ///
    /// Never resolves for [`CancelToken::never`].
    #[must_use]
    pub fn cancelled(&self) -> WaitForCancellation {
        WaitForCancellation {
            inner: Arc::clone(&self.inner),
        }
    }
}

// ─── CancelSource ────────────────────────────────────────────────────────────

/// Requester side of a cancellation signal.
///
/// Dropping the source does not cancel the token.
#[derive(Debug)]
pub struct CancelSource {
    inner: Arc<TokenInner>,
}

impl CancelSource {
    /// Request cancellation.
    ///
    /// Returns `true` for the first request, `false` if the token was
    /// already cancelled. Parked [`WaitForCancellation`] futures are woken.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        CANCELLATIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
        debug!(token_id = self.inner.id, "cancellation requested");

        let wakers = std::mem::take(
            &mut *self
                .inner
                .wakers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for waker in wakers {
            waker.wake();
        }
        true
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// A new token observing this source.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken {
            inner: Arc::clone(&self.inner),
        }
    }
}

// ─── WaitForCancellation ─────────────────────────────────────────────────────

/// Future returned by [`CancelToken::cancelled`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct WaitForCancellation {
    inner: Arc<TokenInner>,
}

impl Future for WaitForCancellation {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return Poll::Ready(());
        }
        let mut wakers = self
            .inner
            .wakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Re-check under the lock: `cancel` sets the flag before draining.
        if self.inner.cancelled.load(Ordering::Acquire) {
            return Poll::Ready(());
        }
        if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
            wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

// ─── Cancelled ───────────────────────────────────────────────────────────────

/// Error an operation returns after observing a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::task::noop_waker;
    use std::thread;

    #[test]
    fn new_token_is_not_cancelled() {
        let (token, source) = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(!source.is_cancelled());
        assert!(token.can_be_cancelled());
        assert_eq!(token.check(), Ok(()));
    }

    #[test]
    fn cancel_is_observed_by_all_clones() {
        let (token, source) = CancelToken::new();
        let copy = token.clone();
        let derived = source.token();
        assert!(source.cancel());
        assert!(token.is_cancelled());
        assert!(copy.is_cancelled());
        assert!(derived.is_cancelled());
        assert_eq!(token.check(), Err(Cancelled));
    }

    #[test]
    fn second_cancel_returns_false() {
        let (_token, source) = CancelToken::new();
        assert!(source.cancel());
        assert!(!source.cancel());
    }

    #[test]
    fn dropping_source_does_not_cancel() {
        let (token, source) = CancelToken::new();
        drop(source);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn never_token() {
        let token = CancelToken::never();
        assert!(!token.can_be_cancelled());
        assert!(!token.is_cancelled());

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut wait = token.cancelled();
        assert!(Pin::new(&mut wait).poll(&mut cx).is_pending());
    }

    #[test]
    fn token_ids_are_unique() {
        let (a, _sa) = CancelToken::new();
        let (b, _sb) = CancelToken::new();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn cancellation_counter_increments() {
        let before = cancellations_total();
        let (_token, source) = CancelToken::new();
        source.cancel();
        source.cancel();
        assert!(cancellations_total() > before);
    }

    #[test]
    fn cancelled_future_ready_after_cancel() {
        let (token, source) = CancelToken::new();
        source.cancel();
        block_on(token.cancelled());
    }

    #[test]
    fn cancelled_future_pending_then_ready() {
        let (token, source) = CancelToken::new();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut wait = token.cancelled();
        assert!(Pin::new(&mut wait).poll(&mut cx).is_pending());
        assert!(Pin::new(&mut wait).poll(&mut cx).is_pending());
        source.cancel();
        assert!(Pin::new(&mut wait).poll(&mut cx).is_ready());
    }

    #[test]
    fn cancel_from_another_thread_wakes_waiter() {
        let (token, source) = CancelToken::new();
        let handle = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(10));
            source.cancel();
        });
        block_on(token.cancelled());
        assert!(token.is_cancelled());
        handle.join().unwrap();
    }

    #[test]
    fn cancelled_display() {
        assert_eq!(Cancelled.to_string(), "operation cancelled");
    }

    #[test]
    fn token_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CancelToken>();
        assert_send_sync::<CancelSource>();
        assert_send_sync::<WaitForCancellation>();
    }
}
