#![forbid(unsafe_code)]

//! Shared wiring for reactive cells and effects.
//!
//! A reactor owns an [`Engine`] and knows how to run itself. [`Engine::start`]
//! attaches the reactor to its inputs while the `constructing` flag is set,
//! so any notification an input delivers on attach is swallowed, and then
//! runs the reactor exactly once.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use super::subscription::Subscription;

/// Object-safe half of [`Dependency`]: "tell me when you change".
pub trait Watch {
    /// Call `on_change` after every change until the guard is dropped.
    fn watch(&self, on_change: Rc<dyn Fn()>) -> Subscription;
}

/// An input a reactive cell or effect can depend on.
///
/// Implemented by [`DependencySource`](super::DependencySource) and by
/// [`ReactiveCell`](super::ReactiveCell), so cells can be chained.
pub trait Dependency: Watch + Clone + 'static {
    type Value: Clone + 'static;

    /// The value the input currently holds.
    fn current(&self) -> Self::Value;
}

/// Something driven by an [`Engine`].
pub(crate) trait Reactor: 'static {
    fn engine(&self) -> &Engine;

    /// Recompute or re-run. `initial` is true for the single run at the end
    /// of construction.
    fn run(&self, initial: bool);
}

#[derive(Debug, Default)]
pub(crate) struct Engine {
    constructing: Cell<bool>,
    links: RefCell<Vec<Subscription>>,
}

impl Engine {
    /// Wire `reactor` to `inputs`, then run it once.
    pub(crate) fn start<R: Reactor>(reactor: &Rc<R>, inputs: &[&dyn Watch]) {
        let engine = reactor.engine();
        engine.constructing.set(true);

        let mut links = Vec::with_capacity(inputs.len());
        for input in inputs {
            let weak = Rc::downgrade(reactor);
            links.push(input.watch(Rc::new(move || {
                if let Some(reactor) = weak.upgrade() {
                    Engine::input_changed(&*reactor);
                }
            })));
        }
        *engine.links.borrow_mut() = links;

        engine.constructing.set(false);
        reactor.run(true);
    }

    fn input_changed<R: Reactor>(reactor: &R) {
        if reactor.engine().constructing.get() {
            trace!("input change suppressed during construction");
            return;
        }
        reactor.run(false);
    }

    pub(crate) fn input_count(&self) -> usize {
        self.links.borrow().len()
    }
}
