#![forbid(unsafe_code)]

//! The command that cancels one execution.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tether_core::{CancelSource, CancelToken, WeakCallbackList};
use tracing::debug;

use super::execution::Execution;
use super::{Command, CommandId, Guard};
use crate::reactive::ReactiveCell;

struct CancelInner {
    id: CommandId,
    source: CancelSource,
    execution: Execution,
    guard: RefCell<Option<Guard>>,
    can_execute_changed: WeakCallbackList<CommandId>,
}

impl CancelInner {
    fn raise(&self) {
        self.can_execute_changed.notify(&self.id);
    }
}

/// Requests cancellation of the execution it was created for.
///
/// Enabled while that execution is running, cancellation has not been
/// requested yet, and the optional guard is true.
#[derive(Clone)]
pub struct CancelCommand {
    inner: Rc<CancelInner>,
}

impl fmt::Debug for CancelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelCommand")
            .field("id", &self.inner.id)
            .field("execution", &self.inner.execution.id())
            .field("requested", &self.inner.source.is_cancelled())
            .finish()
    }
}

impl CancelCommand {
    pub(crate) fn new(source: CancelSource, execution: Execution) -> Self {
        Self {
            inner: Rc::new(CancelInner {
                id: CommandId::next(),
                source,
                execution,
                guard: RefCell::new(None),
                can_execute_changed: WeakCallbackList::new(),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> CommandId {
        self.inner.id
    }

    #[must_use]
    pub fn can_execute(&self) -> bool {
        self.inner.execution.is_running()
            && !self.inner.source.is_cancelled()
            && Guard::allows(&self.inner.guard)
    }

    /// Request cancellation. Returns `false` when disabled.
    pub fn execute(&self) -> bool {
        if !self.can_execute() {
            return false;
        }
        self.inner.source.cancel();
        self.inner.execution.mark_cancelling();
        debug!(
            message = "command.cancel_requested",
            execution_id = self.inner.execution.id()
        );
        self.inner.raise();
        true
    }

    #[must_use]
    pub fn is_cancellation_requested(&self) -> bool {
        self.inner.source.is_cancelled()
    }

    /// The token observed by the execution.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        self.inner.source.token()
    }

    #[must_use]
    pub fn execution(&self) -> &Execution {
        &self.inner.execution
    }

    /// Additionally require `guard` to be true.
    pub fn can_execute_only_if(&self, guard: ReactiveCell<bool>) {
        *self.inner.guard.borrow_mut() = Some(Guard::new(guard, &self.inner, CancelInner::raise));
        self.inner.raise();
    }

    pub fn clear_guard(&self) {
        if self.inner.guard.borrow_mut().take().is_some() {
            self.inner.raise();
        }
    }

    #[must_use]
    pub fn can_execute_changed(&self) -> &WeakCallbackList<CommandId> {
        &self.inner.can_execute_changed
    }

    pub(crate) fn raise_can_execute_changed(&self) {
        self.inner.raise();
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Command for CancelCommand {
    type Parameter = ();

    fn id(&self) -> CommandId {
        self.inner.id
    }

    fn can_execute(&self, _: &()) -> bool {
        CancelCommand::can_execute(self)
    }

    fn execute(&self, _: ()) -> bool {
        CancelCommand::execute(self)
    }

    fn can_execute_changed(&self) -> &WeakCallbackList<CommandId> {
        &self.inner.can_execute_changed
    }
}
