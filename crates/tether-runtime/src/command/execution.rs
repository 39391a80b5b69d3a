#![forbid(unsafe_code)]

//! Record of a single command execution.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tether_core::CancelToken;
use web_time::{Duration, Instant};

use crate::error::CommandError;

static NEXT_EXECUTION_ID: AtomicU64 = AtomicU64::new(1);

/// Where an execution is in its lifecycle.
#[derive(Debug, Clone)]
pub enum ExecutionStatus {
    Running,
    /// Cancellation was requested; the operation has not stopped yet.
    Cancelling,
    RanToCompletion,
    Canceled,
    Faulted(CommandError),
}

impl ExecutionStatus {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running | Self::Cancelling)
    }
}

struct ExecutionInner {
    id: u64,
    token: CancelToken,
    started: Instant,
    status: RefCell<ExecutionStatus>,
    finished: RefCell<Option<Instant>>,
}

/// Shared handle to one run of a command.
///
/// Operation failures and panics end up here as
/// [`ExecutionStatus::Faulted`]; they are never raised from `execute`.
#[derive(Clone)]
pub struct Execution {
    inner: Rc<ExecutionInner>,
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("id", &self.inner.id)
            .field("status", &*self.inner.status.borrow())
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

impl Execution {
    pub(crate) fn start(token: CancelToken) -> Self {
        Self {
            inner: Rc::new(ExecutionInner {
                id: NEXT_EXECUTION_ID.fetch_add(1, Ordering::Relaxed),
                token,
                started: Instant::now(),
                status: RefCell::new(ExecutionStatus::Running),
                finished: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn mark_cancelling(&self) {
        let mut status = self.inner.status.borrow_mut();
        if matches!(*status, ExecutionStatus::Running) {
            *status = ExecutionStatus::Cancelling;
        }
    }

    pub(crate) fn finish(&self, outcome: Result<(), CommandError>) {
        let status = match outcome {
            Ok(()) => ExecutionStatus::RanToCompletion,
            Err(CommandError::Cancelled) => ExecutionStatus::Canceled,
            Err(error) => ExecutionStatus::Faulted(error),
        };
        *self.inner.status.borrow_mut() = status;
        *self.inner.finished.borrow_mut() = Some(Instant::now());
    }

    /// Process-unique execution ID.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        self.inner.status.borrow().clone()
    }

    /// Running or cancelling.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.inner.status.borrow().is_finished()
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.inner.status.borrow().is_finished()
    }

    #[must_use]
    pub fn is_successful(&self) -> bool {
        matches!(*self.inner.status.borrow(), ExecutionStatus::RanToCompletion)
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(*self.inner.status.borrow(), ExecutionStatus::Canceled)
    }

    #[must_use]
    pub fn is_faulted(&self) -> bool {
        matches!(*self.inner.status.borrow(), ExecutionStatus::Faulted(_))
    }

    /// The failure, for faulted executions.
    #[must_use]
    pub fn error(&self) -> Option<CommandError> {
        match &*self.inner.status.borrow() {
            ExecutionStatus::Faulted(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// The token handed to the operation.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.inner.token
    }

    /// Time from start to completion, or to now while still running.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        let end = self.inner.finished.borrow().unwrap_or_else(Instant::now);
        end.saturating_duration_since(self.inner.started)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
