#![forbid(unsafe_code)]

//! View and window status services.
//!
//! A host view exposes a [`ViewEvents`] hub and a set of
//! [`ViewCapabilities`]. A [`ViewStatus`] service is pointed at the view and
//! re-raises its events to view models, which either register on the
//! per-event lists directly or implement [`ViewAware`] and call [`attach`].
//!
//! Neither side keeps the other alive.

pub mod aware;
pub mod status;
pub mod view;

pub use aware::{ViewAware, attach, detach};
pub use status::{ActivationEvents, LifecycleEvents, ViewStatus, WindowEvents};
pub use view::{ClosingArgs, View, ViewCapabilities, ViewEvent, ViewEvents};
