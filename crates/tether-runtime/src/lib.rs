#![forbid(unsafe_code)]

//! Reactive bindings and asynchronous commands.
//!
//! - [`reactive`]: property paths, dependency sources, reactive cells and
//!   effects over host objects.
//! - [`command`]: async commands with cancellation, progress, worker-thread
//!   execution and mutual exclusion.
//!
//! Everything is owned by a single UI thread. Only command operation bodies
//! (and progress reporters) cross to worker threads.

pub mod command;
pub mod error;
pub mod reactive;

pub use command::{
    AsyncCommand, CancelCommand, Command, CommandConfig, CommandContext, CommandId,
    CommandProperty, CommandState, Dispatcher, ExclusionGroup, Execution, ExecutionStatus,
    GroupMember, ProgressChannel, ProgressReporter, ProgressUpdate, clear_mutual_exclusion,
    set_mutually_exclusive,
};
pub use error::{BindingError, CommandError, ConfigError, PathError};
pub use reactive::{
    Bind, Dependency, DependencySource, PropertyBag, PropertyPath, PropertySource, PropertyValue,
    ReactiveCell, ReactiveEffect, Subscription, Watch, bind,
};
