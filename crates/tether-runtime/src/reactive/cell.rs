#![forbid(unsafe_code)]

//! Eagerly recomputed values derived from 1 to 6 dependencies.
//!
//! # Design
//!
//! [`ReactiveCell<T>`] stores a compute function and its latest result in
//! shared, reference-counted storage. Every input notification runs one full
//! recomputation with the current values of *all* inputs, stores the result,
//! bumps the version and notifies subscribers, synchronously on the
//! notifying thread.
//!
//! # Invariants
//!
//! 1. `get()` equals `f(inputs)` for the most recently delivered inputs.
//! 2. Construction computes exactly once and notifies nobody.
//! 3. Version increments by exactly 1 per computation (1 after construction).
//! 4. A binding with a malformed path fails construction before any input
//!    is observed.
//!
//! # Failure Modes
//!
//! - **Compute function panics**: the panic propagates to whoever delivered
//!   the change. The cached value stays at the last completed computation.
//! - **Input owner dropped**: the affected dependency reports its fallback
//!   on its next resolution; the cell keeps working.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::engine::{Dependency, Engine, Reactor, Watch};
use super::path::PropertyPath;
use super::property::PropertySource;
use super::source::DependencySource;
use super::subscription::{Subscribers, Subscription};
use crate::error::BindingError;

/// A property path plus the value to report while it does not resolve.
#[derive(Debug, Clone)]
pub struct Bind<T> {
    path: String,
    fallback: T,
}

/// Bind to `path`, falling back to `T::default()`.
pub fn bind<T: Default>(path: impl Into<String>) -> Bind<T> {
    Bind::new(path, T::default())
}

impl<T> Bind<T> {
    pub fn new(path: impl Into<String>, fallback: T) -> Self {
        Self {
            path: path.into(),
            fallback,
        }
    }

    /// Replace the fallback value.
    #[must_use]
    pub fn fallback(mut self, fallback: T) -> Self {
        self.fallback = fallback;
        self
    }

    pub(crate) fn validate(self, index: usize) -> Result<(PropertyPath, T), BindingError> {
        match PropertyPath::parse(&self.path) {
            Ok(path) => Ok((path, self.fallback)),
            Err(source) => Err(BindingError::MalformedPath {
                index,
                path: self.path,
                source,
            }),
        }
    }
}

struct CellInner<T: 'static> {
    engine: Engine,
    compute: Box<dyn Fn() -> T>,
    /// `None` only while constructing.
    value: RefCell<Option<T>>,
    version: Cell<u64>,
    changed: Subscribers<T>,
}

impl<T: Clone + 'static> Reactor for CellInner<T> {
    fn engine(&self) -> &Engine {
        &self.engine
    }

    fn run(&self, initial: bool) {
        let value = (self.compute)();
        *self.value.borrow_mut() = Some(value.clone());
        let version = self.version.get() + 1;
        self.version.set(version);
        trace!(version, inputs = self.engine.input_count(), "reactive cell recomputed");
        if !initial {
            self.changed.notify(&value);
        }
    }
}

/// A value recomputed from its inputs whenever any of them changes.
///
/// Read-only to callers: the value only changes through recomputation.
/// Cloning creates another handle to the **same** cell.
pub struct ReactiveCell<T: 'static> {
    inner: Rc<CellInner<T>>,
}

impl<T: 'static> Clone for ReactiveCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ReactiveCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveCell")
            .field("value", &self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

macro_rules! cell_arity {
    ($from:ident, $bind:ident; $( ($d:ident: $D:ident, $b:ident: $V:ident, $idx:expr) ),+) => {
        /// Derive a value from dependencies.
        pub fn $from<$($D: Dependency),+>(
            $($d: &$D,)+
            f: impl Fn($(&$D::Value),+) -> T + 'static,
        ) -> Self {
            let inputs: &[&dyn Watch] = &[$($d as &dyn Watch),+];
            $(let $d = $d.clone();)+
            Self::start(Box::new(move || f($(&$d.current()),+)), inputs)
        }

        /// Derive a value from property paths on `owner`.
        ///
        /// Every path is validated before anything is observed.
        pub fn $bind<S: PropertySource + 'static, $($V: Clone + 'static),+>(
            owner: &Rc<S>,
            $($b: Bind<$V>,)+
            f: impl Fn($(&$V),+) -> T + 'static,
        ) -> Result<Self, BindingError> {
            $(let $b = $b.validate($idx)?;)+
            let owner: Rc<dyn PropertySource> = Rc::clone(owner) as Rc<dyn PropertySource>;
            $(let $b = DependencySource::with_owner(&owner, $b.0, $b.1);)+
            Ok(Self::$from($(&$b,)+ f))
        }
    };
}

impl<T: Clone + 'static> ReactiveCell<T> {
    fn start(compute: Box<dyn Fn() -> T>, inputs: &[&dyn Watch]) -> Self {
        let inner = Rc::new(CellInner {
            engine: Engine::default(),
            compute,
            value: RefCell::new(None),
            version: Cell::new(0),
            changed: Subscribers::new(),
        });
        Engine::start(&inner, inputs);
        Self { inner }
    }

    cell_arity!(from1, bind1; (d1: D1, b1: V1, 0));
    cell_arity!(from2, bind2; (d1: D1, b1: V1, 0), (d2: D2, b2: V2, 1));
    cell_arity!(from3, bind3; (d1: D1, b1: V1, 0), (d2: D2, b2: V2, 1), (d3: D3, b3: V3, 2));
    cell_arity!(from4, bind4;
        (d1: D1, b1: V1, 0), (d2: D2, b2: V2, 1), (d3: D3, b3: V3, 2), (d4: D4, b4: V4, 3));
    cell_arity!(from5, bind5;
        (d1: D1, b1: V1, 0), (d2: D2, b2: V2, 1), (d3: D3, b3: V3, 2), (d4: D4, b4: V4, 3),
        (d5: D5, b5: V5, 4));
    cell_arity!(from6, bind6;
        (d1: D1, b1: V1, 0), (d2: D2, b2: V2, 1), (d3: D3, b3: V3, 2), (d4: D4, b4: V4, 3),
        (d5: D5, b5: V5, 4), (d6: D6, b6: V6, 5));

    /// Current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Access the current value by reference without cloning.
    ///
    /// # Panics
    ///
    /// Panics if called from inside the cell's own compute function.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.inner.value.borrow();
        f(value
            .as_ref()
            .expect("reactive cell is computed during construction"))
    }

    /// Number of computations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Call `callback` with the new value after every recomputation.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.inner.changed.subscribe(callback)
    }
}

impl<T: Clone + 'static> Watch for ReactiveCell<T> {
    fn watch(&self, on_change: Rc<dyn Fn()>) -> Subscription {
        self.subscribe(move |_| on_change())
    }
}

impl<T: Clone + 'static> Dependency for ReactiveCell<T> {
    type Value = T;

    fn current(&self) -> T {
        self.get()
    }
}
