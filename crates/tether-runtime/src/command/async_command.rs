#![forbid(unsafe_code)]

//! The asynchronous command.
//!
//! # Design
//!
//! An [`AsyncCommand`] owns an operation `Fn(CommandContext<P>) -> Future`.
//! Each call to `execute`/`execute_async` begins synchronously on the owner
//! thread (a new [`Execution`], a fresh [`CancelCommand`] and
//! [`ProgressChannel`] when configured, notifications) and then runs the
//! operation either in place or on a dedicated worker thread. Completion is
//! always observed back on the owner thread, where the command state is
//! updated and the second round of notifications fires.
//!
//! # Failure Modes
//!
//! - **Operation returns an error or panics**: the execution is
//!   [`Faulted`](super::ExecutionStatus::Faulted); nothing propagates to the
//!   caller of `execute`.
//! - **Operation observes cancellation**: returning
//!   [`CommandError::Cancelled`] marks the execution `Canceled`.
//! - **Execution future dropped before completion**: the execution finishes
//!   as `Canceled` and the command returns to idle.
//! - **`execute` without a dispatcher inside another executor**: the
//!   fallback `block_on` panics; install a [`Dispatcher`] instead.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture, LocalBoxFuture};
use tether_core::{CancelToken, WeakCallbackList};
use tracing::{Instrument, Span, debug, debug_span, field, warn};

use super::cancel::CancelCommand;
use super::dispatch::{Dispatcher, Outcome, panic_message, run_inline, run_on_worker};
use super::exclusion::{ExclusionGroup, GroupMember};
use super::execution::{Execution, ExecutionStatus};
use super::progress::{ProgressChannel, ProgressReporter, ProgressUpdate};
use super::{Command, CommandConfig, CommandId, CommandProperty, CommandState, Guard};
use crate::error::{BindingError, CommandError, ConfigError};
use crate::reactive::{Bind, PropertySource, ReactiveCell, Subscribers, Subscription};

/// What the operation receives for one execution.
pub struct CommandContext<P> {
    parameter: P,
    token: CancelToken,
    progress: Option<ProgressReporter>,
}

impl<P> fmt::Debug for CommandContext<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("token", &self.token.id())
            .field("reports_progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

impl<P> CommandContext<P> {
    #[must_use]
    pub fn parameter(&self) -> &P {
        &self.parameter
    }

    #[must_use]
    pub fn into_parameter(self) -> P {
        self.parameter
    }

    /// Never cancelled unless the command is cancellable.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.token
    }

    #[must_use]
    pub fn is_cancellation_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// `Err(CommandError::Cancelled)` once cancellation was requested, for
    /// use with `?`.
    pub fn check_cancelled(&self) -> Result<(), CommandError> {
        Ok(self.token.check()?)
    }

    /// Report progress. A no-op for commands without a progress channel.
    pub fn report(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress {
            reporter.report(update);
        }
    }

    /// A reporter to move into spawned work.
    #[must_use]
    pub fn progress(&self) -> Option<ProgressReporter> {
        self.progress.clone()
    }
}

type Operation<P> = Box<dyn Fn(CommandContext<P>) -> BoxFuture<'static, Outcome>>;

pub(crate) struct CommandInner<P: 'static> {
    id: CommandId,
    name: String,
    operation: Operation<P>,
    worker_thread_name: String,
    cancellable: bool,
    reports_progress: bool,
    can_execute_while_executing: Cell<bool>,
    run_on_different_thread: Cell<bool>,
    in_flight: Cell<usize>,
    execution: RefCell<Option<Execution>>,
    cancel_command: RefCell<Option<CancelCommand>>,
    progress: RefCell<Option<Rc<ProgressChannel>>>,
    guard: RefCell<Option<Guard>>,
    group: RefCell<Option<ExclusionGroup>>,
    dispatcher: RefCell<Option<Rc<dyn Dispatcher>>>,
    can_execute_changed: WeakCallbackList<CommandId>,
    property_changed: Subscribers<CommandProperty>,
}

impl<P: 'static> CommandInner<P> {
    fn can_execute(&self) -> bool {
        if self.in_flight.get() > 0 && !self.can_execute_while_executing.get() {
            return false;
        }
        let group = self.group.borrow().clone();
        if group.is_some_and(|g| g.any_other_executing(self.id)) {
            return false;
        }
        Guard::allows(&self.guard)
    }

    fn raise_property(&self, property: CommandProperty) {
        self.property_changed.notify(&property);
    }

    fn raise_own(&self) {
        self.can_execute_changed.notify(&self.id);
    }

    fn raise_enablement(&self, cancel_command: Option<&CancelCommand>) {
        self.raise_own();
        if let Some(cancel) = cancel_command {
            cancel.raise_can_execute_changed();
        }
        let group = self.group.borrow().clone();
        if let Some(group) = group {
            group.raise_others(self.id);
        }
    }

    fn begin(self: &Rc<Self>, parameter: P) -> impl Future<Output = Execution> + 'static {
        let (token, source) = if self.cancellable {
            let (token, source) = CancelToken::new();
            (token, Some(source))
        } else {
            (CancelToken::never(), None)
        };
        let execution = Execution::start(token.clone());
        let cancel_command = source.map(|source| CancelCommand::new(source, execution.clone()));
        let reporter = if self.reports_progress {
            let (channel, reporter) = ProgressChannel::new();
            *self.progress.borrow_mut() = Some(Rc::new(channel));
            Some(reporter)
        } else {
            None
        };

        *self.execution.borrow_mut() = Some(execution.clone());
        let in_flight = self.in_flight.get() + 1;
        self.in_flight.set(in_flight);
        if self.cancellable {
            *self.cancel_command.borrow_mut() = cancel_command.clone();
            self.raise_property(CommandProperty::CancelCommand);
        }
        if reporter.is_some() {
            self.raise_property(CommandProperty::Progress);
        }
        self.raise_property(CommandProperty::Execution);
        if in_flight == 1 {
            self.raise_property(CommandProperty::IsExecuting);
        }

        let on_worker = self.run_on_different_thread.get();
        let span = debug_span!(
            "command.execute",
            command = %self.name,
            execution_id = execution.id(),
            on_worker,
            elapsed_us = field::Empty
        );
        debug!(
            message = "command.started",
            command = %self.name,
            execution_id = execution.id(),
            in_flight
        );
        self.raise_enablement(cancel_command.as_ref());

        let mut completion = Completion {
            inner: Some(Rc::clone(self)),
            execution: execution.clone(),
            cancel_command,
            span: span.clone(),
        };
        let context = CommandContext {
            parameter,
            token,
            progress: reporter,
        };
        // The operation may panic before it hands back its future.
        let work = match catch_unwind(AssertUnwindSafe(|| (self.operation)(context))) {
            Ok(work) => work.instrument(span).boxed(),
            Err(payload) => future::ready(Err(CommandError::Panicked {
                message: panic_message(&*payload),
            }))
            .boxed(),
        };
        // A worker starts now, not when the execution future is first polled.
        let running: LocalBoxFuture<'static, Outcome> = if on_worker {
            run_on_worker(&self.worker_thread_name, work).boxed_local()
        } else {
            run_inline(work).boxed_local()
        };

        async move {
            let outcome = running.await;
            completion.complete(outcome);
            completion.execution.clone()
        }
    }

    fn finish(
        &self,
        execution: &Execution,
        cancel_command: Option<CancelCommand>,
        span: &Span,
        outcome: Outcome,
    ) {
        execution.finish(outcome);
        let elapsed_us = execution.elapsed().as_micros() as u64;
        span.record("elapsed_us", elapsed_us);
        match execution.status() {
            ExecutionStatus::Faulted(error) => warn!(
                message = "command.faulted",
                command = %self.name,
                execution_id = execution.id(),
                elapsed_us,
                error = %error
            ),
            status => debug!(
                message = "command.finished",
                command = %self.name,
                execution_id = execution.id(),
                elapsed_us,
                status = ?status
            ),
        }

        let in_flight = self.in_flight.get().saturating_sub(1);
        self.in_flight.set(in_flight);
        let unpublished = {
            let mut slot = self.cancel_command.borrow_mut();
            let ours = slot
                .as_ref()
                .zip(cancel_command.as_ref())
                .is_some_and(|(published, ours)| published.ptr_eq(ours));
            if ours {
                slot.take();
            }
            ours
        };
        if unpublished {
            self.raise_property(CommandProperty::CancelCommand);
        }
        self.raise_property(CommandProperty::Execution);
        if in_flight == 0 {
            self.raise_property(CommandProperty::IsExecuting);
        }
        self.raise_enablement(cancel_command.as_ref());
    }
}

impl<P: 'static> GroupMember for CommandInner<P> {
    fn command_id(&self) -> CommandId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_executing(&self) -> bool {
        self.in_flight.get() > 0
    }

    fn allows_concurrent_execution(&self) -> bool {
        self.can_execute_while_executing.get()
    }

    fn raise_can_execute_changed(&self) {
        self.raise_own();
    }

    fn exclusion_group(&self) -> Option<ExclusionGroup> {
        self.group.borrow().clone()
    }

    fn attach_group(&self, group: Option<ExclusionGroup>) {
        *self.group.borrow_mut() = group;
    }
}

/// Finishes the execution exactly once, even if the execution future is
/// dropped before the operation completes.
struct Completion<P: 'static> {
    inner: Option<Rc<CommandInner<P>>>,
    execution: Execution,
    cancel_command: Option<CancelCommand>,
    span: Span,
}

impl<P: 'static> Completion<P> {
    fn complete(&mut self, outcome: Outcome) {
        if let Some(inner) = self.inner.take() {
            inner.finish(&self.execution, self.cancel_command.take(), &self.span, outcome);
        }
    }
}

impl<P: 'static> Drop for Completion<P> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            debug!(
                message = "command.abandoned",
                execution_id = self.execution.id()
            );
            self.complete(Err(CommandError::Cancelled));
        }
    }
}

/// A command backed by an asynchronous operation.
///
/// Cheap to clone; clones share state.
pub struct AsyncCommand<P: 'static = ()> {
    inner: Rc<CommandInner<P>>,
}

impl<P: 'static> Clone for AsyncCommand<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P: 'static> fmt::Debug for AsyncCommand<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCommand")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<P: 'static> AsyncCommand<P> {
    /// A command with default configuration.
    pub fn new<F, Fut>(operation: F) -> Self
    where
        F: Fn(CommandContext<P>) -> Fut + 'static,
        Fut: Future<Output = Result<(), CommandError>> + Send + 'static,
    {
        Self::with_config(CommandConfig::default(), operation)
    }

    pub fn with_config<F, Fut>(config: CommandConfig, operation: F) -> Self
    where
        F: Fn(CommandContext<P>) -> Fut + 'static,
        Fut: Future<Output = Result<(), CommandError>> + Send + 'static,
    {
        let id = CommandId::next();
        let name = config
            .name
            .unwrap_or_else(|| format!("command-{}", id.raw()));
        Self {
            inner: Rc::new(CommandInner {
                id,
                name,
                operation: Box::new(move |context: CommandContext<P>| operation(context).boxed()),
                worker_thread_name: config.worker_thread_name,
                cancellable: config.cancellable,
                reports_progress: config.reports_progress,
                can_execute_while_executing: Cell::new(config.can_execute_while_executing),
                run_on_different_thread: Cell::new(config.run_on_different_thread),
                in_flight: Cell::new(0),
                execution: RefCell::new(None),
                cancel_command: RefCell::new(None),
                progress: RefCell::new(None),
                guard: RefCell::new(None),
                group: RefCell::new(None),
                dispatcher: RefCell::new(None),
                can_execute_changed: WeakCallbackList::new(),
                property_changed: Subscribers::new(),
            }),
        }
    }

    /// A command over a blocking function, typically combined with
    /// [`CommandConfig::on_worker_thread`].
    pub fn from_fn<F>(operation: F) -> Self
    where
        F: Fn(CommandContext<P>) -> Result<(), CommandError> + Send + Sync + 'static,
        P: Send,
    {
        Self::from_fn_with_config(CommandConfig::default(), operation)
    }

    pub fn from_fn_with_config<F>(config: CommandConfig, operation: F) -> Self
    where
        F: Fn(CommandContext<P>) -> Result<(), CommandError> + Send + Sync + 'static,
        P: Send,
    {
        let operation = Arc::new(operation);
        Self::with_config(config, move |context| {
            let operation = Arc::clone(&operation);
            async move { operation(context) }
        })
    }

    #[must_use]
    pub fn id(&self) -> CommandId {
        self.inner.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether `execute` would currently start an execution.
    #[must_use]
    pub fn can_execute(&self) -> bool {
        self.inner.can_execute()
    }

    /// Start an execution if enabled.
    ///
    /// With a dispatcher installed the execution is handed to it and this
    /// returns immediately. Without one the execution is driven to
    /// completion on the calling thread.
    pub fn execute(&self, parameter: P) -> bool {
        if !self.inner.can_execute() {
            debug!(message = "command.rejected", command = %self.inner.name);
            return false;
        }
        let run = self.inner.begin(parameter);
        let dispatcher = self.inner.dispatcher.borrow().clone();
        match dispatcher {
            Some(dispatcher) => dispatcher.dispatch(Box::pin(async move {
                run.await;
            })),
            None => {
                futures::executor::block_on(run);
            }
        }
        true
    }

    /// Start an execution unconditionally and return a future resolving to
    /// its record once the operation has finished.
    ///
    /// The execution has already begun when this returns: state, the cancel
    /// command and notifications are all updated synchronously.
    pub fn execute_async(&self, parameter: P) -> impl Future<Output = Execution> + 'static {
        self.inner.begin(parameter)
    }

    #[must_use]
    pub fn state(&self) -> CommandState {
        if self.inner.in_flight.get() == 0 {
            return CommandState::Idle;
        }
        let cancelling = self
            .inner
            .execution
            .borrow()
            .as_ref()
            .is_some_and(|e| matches!(e.status(), ExecutionStatus::Cancelling));
        if cancelling {
            CommandState::Cancelling
        } else {
            CommandState::Executing
        }
    }

    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.inner.in_flight.get() > 0
    }

    /// Number of executions that have begun and not yet finished.
    #[must_use]
    pub fn executions_in_flight(&self) -> usize {
        self.inner.in_flight.get()
    }

    /// The most recently started execution.
    #[must_use]
    pub fn execution(&self) -> Option<Execution> {
        self.inner.execution.borrow().clone()
    }

    /// Cancel command of the current execution, while it runs.
    #[must_use]
    pub fn cancel_command(&self) -> Option<CancelCommand> {
        self.inner.cancel_command.borrow().clone()
    }

    /// Progress of the most recently started execution.
    #[must_use]
    pub fn progress(&self) -> Option<Rc<ProgressChannel>> {
        self.inner.progress.borrow().clone()
    }

    #[must_use]
    pub fn can_execute_while_executing(&self) -> bool {
        self.inner.can_execute_while_executing.get()
    }

    /// Allow or forbid overlapping executions.
    ///
    /// Grouped commands cannot be made concurrent.
    pub fn set_can_execute_while_executing(&self, allow: bool) -> Result<(), ConfigError> {
        if allow && self.inner.group.borrow().is_some() {
            return Err(ConfigError::ConcurrentInGroup {
                command: self.inner.name.clone(),
            });
        }
        if self.inner.can_execute_while_executing.replace(allow) != allow {
            self.inner
                .raise_property(CommandProperty::CanExecuteWhileExecuting);
            self.inner.raise_own();
        }
        Ok(())
    }

    #[must_use]
    pub fn runs_on_different_thread(&self) -> bool {
        self.inner.run_on_different_thread.get()
    }

    /// Takes effect for executions started afterwards.
    pub fn set_run_on_different_thread(&self, enabled: bool) {
        if self.inner.run_on_different_thread.replace(enabled) != enabled {
            self.inner
                .raise_property(CommandProperty::RunOnDifferentThread);
        }
    }

    /// Route `execute` through `dispatcher` instead of blocking.
    pub fn set_dispatcher(&self, dispatcher: Rc<dyn Dispatcher>) {
        *self.inner.dispatcher.borrow_mut() = Some(dispatcher);
    }

    pub fn clear_dispatcher(&self) {
        self.inner.dispatcher.borrow_mut().take();
    }

    /// Additionally require `guard` to be true. Guard changes raise
    /// enablement-changed.
    pub fn can_execute_only_if(&self, guard: ReactiveCell<bool>) {
        *self.inner.guard.borrow_mut() =
            Some(Guard::new(guard, &self.inner, CommandInner::raise_own));
        self.inner.raise_own();
    }

    /// Guard on a boolean member reached by `path` from `owner`; `false`
    /// while the path does not resolve.
    pub fn can_execute_only_if_path<S: PropertySource + 'static>(
        &self,
        owner: &Rc<S>,
        path: &str,
    ) -> Result<(), BindingError> {
        let guard = ReactiveCell::bind1(owner, Bind::new(path, false), |allowed: &bool| *allowed)?;
        self.can_execute_only_if(guard);
        Ok(())
    }

    pub fn clear_guard(&self) {
        if self.inner.guard.borrow_mut().take().is_some() {
            self.inner.raise_own();
        }
    }

    /// Fire enablement-changed by hand, for guards that live outside the
    /// reactive layer.
    pub fn raise_can_execute_changed(&self) {
        self.inner.raise_own();
    }

    #[must_use]
    pub fn exclusion_group(&self) -> Option<ExclusionGroup> {
        self.inner.group.borrow().clone()
    }

    #[must_use]
    pub fn can_execute_changed(&self) -> &WeakCallbackList<CommandId> {
        &self.inner.can_execute_changed
    }

    /// Be told which member changed after every state transition.
    pub fn subscribe_property_changed(
        &self,
        callback: impl Fn(&CommandProperty) + 'static,
    ) -> Subscription {
        self.inner.property_changed.subscribe(callback)
    }

    /// This command as an exclusion group member.
    #[must_use]
    pub fn member(&self) -> Rc<dyn GroupMember> {
        Rc::clone(&self.inner) as Rc<dyn GroupMember>
    }
}

impl<P: 'static> Command for AsyncCommand<P> {
    type Parameter = P;

    fn id(&self) -> CommandId {
        self.inner.id
    }

    fn can_execute(&self, _: &P) -> bool {
        self.inner.can_execute()
    }

    fn execute(&self, parameter: P) -> bool {
        AsyncCommand::execute(self, parameter)
    }

    fn can_execute_changed(&self) -> &WeakCallbackList<CommandId> {
        &self.inner.can_execute_changed
    }
}
