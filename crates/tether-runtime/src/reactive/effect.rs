#![forbid(unsafe_code)]

//! Side-effecting actions re-run whenever any of 1 to 6 dependencies change.
//!
//! [`ReactiveEffect`] uses the same wiring as
//! [`ReactiveCell`](super::ReactiveCell): inputs are attached with change
//! propagation suppressed, the action runs once, and every later input
//! notification runs it again with all current input values. It has no
//! value and no change notification of its own.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::cell::Bind;
use super::engine::{Dependency, Engine, Reactor, Watch};
use super::property::PropertySource;
use super::source::DependencySource;
use crate::error::BindingError;

struct EffectInner {
    engine: Engine,
    action: Box<dyn Fn()>,
    runs: Cell<u64>,
}

impl Reactor for EffectInner {
    fn engine(&self) -> &Engine {
        &self.engine
    }

    fn run(&self, initial: bool) {
        (self.action)();
        let runs = self.runs.get() + 1;
        self.runs.set(runs);
        trace!(runs, initial, "reactive effect ran");
    }
}

/// An action bound to its inputs. Dropping it detaches the action.
pub struct ReactiveEffect {
    inner: Rc<EffectInner>,
}

impl fmt::Debug for ReactiveEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("inputs", &self.inner.engine.input_count())
            .field("runs", &self.inner.runs.get())
            .finish()
    }
}

macro_rules! effect_arity {
    ($from:ident, $bind:ident; $( ($d:ident: $D:ident, $b:ident: $V:ident, $idx:expr) ),+) => {
        /// Run `action` now and after every change of the dependencies.
        pub fn $from<$($D: Dependency),+>(
            $($d: &$D,)+
            action: impl Fn($(&$D::Value),+) + 'static,
        ) -> Self {
            let inputs: &[&dyn Watch] = &[$($d as &dyn Watch),+];
            $(let $d = $d.clone();)+
            Self::start(Box::new(move || action($(&$d.current()),+)), inputs)
        }

        /// Run `action` over property paths on `owner`.
        ///
        /// Every path is validated before anything is observed.
        pub fn $bind<S: PropertySource + 'static, $($V: Clone + 'static),+>(
            owner: &Rc<S>,
            $($b: Bind<$V>,)+
            action: impl Fn($(&$V),+) + 'static,
        ) -> Result<Self, BindingError> {
            $(let $b = $b.validate($idx)?;)+
            let owner: Rc<dyn PropertySource> = Rc::clone(owner) as Rc<dyn PropertySource>;
            $(let $b = DependencySource::with_owner(&owner, $b.0, $b.1);)+
            Ok(Self::$from($(&$b,)+ action))
        }
    };
}

impl ReactiveEffect {
    fn start(action: Box<dyn Fn()>, inputs: &[&dyn Watch]) -> Self {
        let inner = Rc::new(EffectInner {
            engine: Engine::default(),
            action,
            runs: Cell::new(0),
        });
        Engine::start(&inner, inputs);
        Self { inner }
    }

    effect_arity!(from1, bind1; (d1: D1, b1: V1, 0));
    effect_arity!(from2, bind2; (d1: D1, b1: V1, 0), (d2: D2, b2: V2, 1));
    effect_arity!(from3, bind3; (d1: D1, b1: V1, 0), (d2: D2, b2: V2, 1), (d3: D3, b3: V3, 2));
    effect_arity!(from4, bind4;
        (d1: D1, b1: V1, 0), (d2: D2, b2: V2, 1), (d3: D3, b3: V3, 2), (d4: D4, b4: V4, 3));
    effect_arity!(from5, bind5;
        (d1: D1, b1: V1, 0), (d2: D2, b2: V2, 1), (d3: D3, b3: V3, 2), (d4: D4, b4: V4, 3),
        (d5: D5, b5: V5, 4));
    effect_arity!(from6, bind6;
        (d1: D1, b1: V1, 0), (d2: D2, b2: V2, 1), (d3: D3, b3: V3, 2), (d4: D4, b4: V4, 3),
        (d5: D5, b5: V5, 4), (d6: D6, b6: V6, 5));

    /// How many times the action has run, including the initial run.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.inner.runs.get()
    }
}
