#![forbid(unsafe_code)]

//! Where command executions run.
//!
//! - A [`Dispatcher`] drives an execution future on the owner thread, the
//!   way a UI toolkit posts work to its event loop.
//! - [`run_on_worker`] moves the operation body to a dedicated thread and
//!   hands the outcome back to the owner thread through a oneshot channel.
//! - [`run_inline`] polls the operation body where it is.
//!
//! Panics inside the operation are caught in both modes and reported as
//! [`CommandError::Panicked`].

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;

use futures::FutureExt;
use futures::channel::oneshot;
use futures::executor::LocalSpawner;
use futures::future::{BoxFuture, LocalBoxFuture};
use futures::task::LocalSpawnExt;
use tracing::warn;

use crate::error::CommandError;

pub(crate) type Outcome = Result<(), CommandError>;

/// Runs `'static` futures on the thread that owns the UI state.
pub trait Dispatcher {
    fn dispatch(&self, task: LocalBoxFuture<'static, ()>);
}

impl Dispatcher for LocalSpawner {
    fn dispatch(&self, task: LocalBoxFuture<'static, ()>) {
        if let Err(err) = self.spawn_local(task) {
            warn!(error = %err, "dispatcher rejected command execution");
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Poll `work` in place, converting a panic into an error.
pub(crate) async fn run_inline(work: BoxFuture<'static, Outcome>) -> Outcome {
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(CommandError::Panicked {
            message: panic_message(&*payload),
        }),
    }
}

/// Run `work` to completion on a new thread named `thread_name`.
///
/// The thread is started by this call; the returned future only waits for
/// the outcome.
pub(crate) fn run_on_worker(
    thread_name: &str,
    work: BoxFuture<'static, Outcome>,
) -> impl std::future::Future<Output = Outcome> + 'static {
    let (tx, rx) = oneshot::channel();
    let spawned = thread::Builder::new()
        .name(thread_name.to_owned())
        .spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| futures::executor::block_on(work)))
                .unwrap_or_else(|payload| {
                    Err(CommandError::Panicked {
                        message: panic_message(&*payload),
                    })
                });
            // The owner may have dropped the execution; nothing to report to.
            let _ = tx.send(outcome);
        });

    async move {
        if let Err(err) = spawned {
            return Err(CommandError::Worker {
                message: err.to_string(),
            });
        }
        rx.await.unwrap_or_else(|_| {
            Err(CommandError::Worker {
                message: "worker exited without reporting an outcome".to_owned(),
            })
        })
    }
}
