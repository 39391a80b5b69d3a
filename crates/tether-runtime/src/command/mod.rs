#![forbid(unsafe_code)]

//! Asynchronous commands with cancellation, progress and mutual exclusion.
//!
//! - [`AsyncCommand`]: wraps an async operation; tracks its executions and
//!   exposes enablement (`can_execute`) plus change notifications.
//! - [`CancelCommand`]: created fresh for each execution of a cancellable
//!   command; requests cooperative cancellation.
//! - [`ProgressChannel`]: created fresh for each execution of a command that
//!   reports progress.
//! - [`ExclusionGroup`]: a set of commands of which at most one executes.
//!
//! # State machine
//!
//! ```text
//! Idle ──execute──► Executing ──done──► Idle
//!                       │
//!                    cancel
//!                       ▼
//!                  Cancelling ──done──► Idle
//! ```
//!
//! Cancellation is cooperative: the operation decides when to observe its
//! token. A command that never looks at the token runs to completion.
//!
//! # Invariants
//!
//! 1. A command that may execute concurrently with itself is never in an
//!    exclusion group.
//! 2. Each execution that requested cancellation has exactly one
//!    `CancelCommand`, which is unpublished when the execution completes.
//! 3. `can_execute` is the AND of: not executing (unless concurrent
//!    execution is allowed), no other group member executing, and the guard
//!    (if any) being true.
//! 4. Enablement-changed fires exactly twice per execution for the command
//!    itself: once at start, once at completion.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tether_core::WeakCallbackList;

use crate::reactive::{ReactiveCell, Subscription};

pub mod async_command;
pub mod cancel;
pub mod dispatch;
pub mod exclusion;
pub mod execution;
pub mod progress;

pub use async_command::{AsyncCommand, CommandContext};
pub use cancel::CancelCommand;
pub use dispatch::Dispatcher;
pub use exclusion::{ExclusionGroup, GroupMember, clear_mutual_exclusion, set_mutually_exclusive};
pub use execution::{Execution, ExecutionStatus};
pub use progress::{ProgressChannel, ProgressReporter, ProgressUpdate};

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique command identifier.
///
/// Enablement listeners receive the ID of the command whose enablement
/// changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(u64);

impl CommandId {
    pub(crate) fn next() -> Self {
        Self(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Something a UI element can trigger.
pub trait Command {
    type Parameter;

    fn id(&self) -> CommandId;

    /// Whether `execute` would currently run.
    fn can_execute(&self, parameter: &Self::Parameter) -> bool;

    /// Run if enabled. Returns whether an execution started.
    fn execute(&self, parameter: Self::Parameter) -> bool;

    /// Fired (with this command's id) whenever `can_execute` may have
    /// changed.
    fn can_execute_changed(&self) -> &WeakCallbackList<CommandId>;
}

/// Coarse state of an [`AsyncCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Idle,
    Executing,
    Cancelling,
}

/// Members of an [`AsyncCommand`] that raise property-changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandProperty {
    IsExecuting,
    Execution,
    CancelCommand,
    Progress,
    CanExecuteWhileExecuting,
    RunOnDifferentThread,
}

/// Command configuration.
#[derive(Debug, Clone)]
pub struct CommandConfig {
    /// Name used in logs and errors. Defaults to `command-<id>`.
    pub name: Option<String>,
    /// Allow overlapping executions of the same command.
    pub can_execute_while_executing: bool,
    /// Run the operation body on a dedicated worker thread.
    pub run_on_different_thread: bool,
    /// Name given to worker threads.
    pub worker_thread_name: String,
    /// Create a [`CancelCommand`] for every execution.
    pub cancellable: bool,
    /// Create a [`ProgressChannel`] for every execution.
    pub reports_progress: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            name: None,
            can_execute_while_executing: false,
            run_on_different_thread: false,
            worker_thread_name: "tether-command".to_owned(),
            cancellable: false,
            reports_progress: false,
        }
    }
}

impl CommandConfig {
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn cancellable(mut self) -> Self {
        self.cancellable = true;
        self
    }

    #[must_use]
    pub fn with_progress(mut self) -> Self {
        self.reports_progress = true;
        self
    }

    #[must_use]
    pub fn on_worker_thread(mut self) -> Self {
        self.run_on_different_thread = true;
        self
    }

    #[must_use]
    pub fn worker_thread_name(mut self, name: impl Into<String>) -> Self {
        self.worker_thread_name = name.into();
        self
    }

    #[must_use]
    pub fn concurrent(mut self) -> Self {
        self.can_execute_while_executing = true;
        self
    }
}

/// A `ReactiveCell<bool>` gating `can_execute`, plus the link that turns its
/// changes into enablement notifications.
pub(crate) struct Guard {
    cell: ReactiveCell<bool>,
    _link: Subscription,
}

impl Guard {
    pub(crate) fn new<T: 'static>(cell: ReactiveCell<bool>, target: &Rc<T>, on_change: fn(&T)) -> Self {
        let weak = Rc::downgrade(target);
        let link = cell.subscribe(move |_| {
            if let Some(target) = weak.upgrade() {
                on_change(&target);
            }
        });
        Self { cell, _link: link }
    }

    /// An absent guard allows execution.
    pub(crate) fn allows(slot: &RefCell<Option<Guard>>) -> bool {
        slot.borrow().as_ref().is_none_or(|guard| guard.cell.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builders() {
        let config = CommandConfig::default()
            .named("save")
            .cancellable()
            .with_progress()
            .on_worker_thread()
            .worker_thread_name("saver");
        assert_eq!(config.name.as_deref(), Some("save"));
        assert!(config.cancellable);
        assert!(config.reports_progress);
        assert!(config.run_on_different_thread);
        assert_eq!(config.worker_thread_name, "saver");
        assert!(!config.can_execute_while_executing);
        assert!(CommandConfig::default().concurrent().can_execute_while_executing);
    }

    #[test]
    fn command_ids_are_unique() {
        assert_ne!(CommandId::next(), CommandId::next());
    }
}
