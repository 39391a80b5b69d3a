#![forbid(unsafe_code)]

//! Reactive bindings over host objects.
//!
//! - [`PropertySource`]: what a host object exposes (members, change
//!   notification). [`PropertyBag`] is a ready-made implementation.
//! - [`PropertyPath`]: a validated chain of member names.
//! - [`DependencySource`]: a value at a path on an object, re-resolved when
//!   any member along the path changes.
//! - [`ReactiveCell`]: a value recomputed from 1 to 6 dependencies.
//! - [`ReactiveEffect`]: an action re-run from 1 to 6 dependencies.
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//!
//! # Architecture
//!
//! Everything here is single-threaded (`Rc<RefCell<..>>`). Subscribers are
//! stored as `Weak` callbacks and cleaned up lazily during notification.
//! Recomputation is eager and synchronous: the thread that changes a member
//! runs every dependent cell and effect before the setter returns.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 3. A cell or effect never keeps the objects it observes alive.
//! 4. Each input notification causes exactly one recomputation.

pub mod cell;
pub mod effect;
pub mod engine;
pub mod path;
pub mod property;
pub mod source;
pub mod subscription;

pub use cell::{Bind, ReactiveCell, bind};
pub use effect::ReactiveEffect;
pub use engine::{Dependency, Watch};
pub use path::PropertyPath;
pub use property::{PropertyBag, PropertySource, PropertyValue};
pub use source::DependencySource;
pub use subscription::{Subscribers, Subscription};
