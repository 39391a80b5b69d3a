#![forbid(unsafe_code)]
//! tether public facade crate.
//!
//! Reactive bindings over host objects and asynchronous commands for
//! view models.

pub use tether_core as core;
pub use tether_runtime as runtime;
#[cfg(feature = "status")]
pub use tether_status as status;

pub mod prelude {
    pub use tether_core::{CancelToken, Cancelled, HandleId, WeakCallbackList, WeakHandle};
    pub use tether_runtime::{
        AsyncCommand, Bind, CancelCommand, Command, CommandConfig, CommandContext, CommandError,
        CommandId, DependencySource, ExecutionStatus, ProgressUpdate, PropertyBag, PropertyPath,
        PropertySource, ReactiveCell, ReactiveEffect, bind, set_mutually_exclusive,
    };
    #[cfg(feature = "status")]
    pub use tether_status::{ClosingArgs, View, ViewAware, ViewEvent, ViewStatus, attach};
}
