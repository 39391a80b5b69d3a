#![forbid(unsafe_code)]

//! Core: weak callback registries and cooperative cancellation.
//!
//! - [`weak`]: callbacks that never extend the lifetime of their target.
//! - [`cancel`]: per-operation cancellation tokens.

pub mod cancel;
mod logging;
pub mod weak;

pub use cancel::{CancelSource, CancelToken, Cancelled, WaitForCancellation};
pub use weak::{HandleId, HandleKind, InvokeAll, WeakCallbackList, WeakHandle};
