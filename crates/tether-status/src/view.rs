#![forbid(unsafe_code)]

//! The view side: what a host view exposes to status services.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tether_core::WeakCallbackList;
use tether_runtime::Dispatcher;

bitflags::bitflags! {
    /// Which groups of events a view can raise.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ViewCapabilities: u8 {
        /// Loaded / Unloaded.
        const LIFECYCLE  = 0b0000_0001;
        /// Activated / Deactivated.
        const ACTIVATION = 0b0000_0010;
        /// Closing / Closed / ContentRendered / LocationChanged /
        /// StateChanged.
        const WINDOW     = 0b0000_0100;
    }
}

impl ViewCapabilities {
    /// What a top-level window supports.
    #[must_use]
    pub const fn window() -> Self {
        Self::all()
    }
}

/// A view lifecycle event. Closing is raised separately through
/// [`ViewEvents::request_close`] because it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewEvent {
    Loaded,
    Unloaded,
    Activated,
    Deactivated,
    Closed,
    ContentRendered,
    LocationChanged,
    StateChanged,
}

impl ViewEvent {
    /// Capability a view needs to raise this event.
    #[must_use]
    pub const fn capability(self) -> ViewCapabilities {
        match self {
            Self::Loaded | Self::Unloaded => ViewCapabilities::LIFECYCLE,
            Self::Activated | Self::Deactivated => ViewCapabilities::ACTIVATION,
            Self::Closed | Self::ContentRendered | Self::LocationChanged | Self::StateChanged => {
                ViewCapabilities::WINDOW
            }
        }
    }
}

/// Arguments of a closing request. Any listener may veto the close.
#[derive(Debug, Default)]
pub struct ClosingArgs {
    cancel: Cell<bool>,
}

impl ClosingArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Veto the close.
    pub fn cancel(&self) {
        self.cancel.set(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.get()
    }
}

/// Event hub a host view raises its lifecycle events on.
#[derive(Default)]
pub struct ViewEvents {
    events: WeakCallbackList<ViewEvent>,
    closing: WeakCallbackList<ClosingArgs>,
}

impl fmt::Debug for ViewEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewEvents")
            .field("listeners", &self.events.live_count())
            .field("closing_listeners", &self.closing.live_count())
            .finish()
    }
}

impl ViewEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise `event`. Returns how many listeners ran.
    pub fn raise(&self, event: ViewEvent) -> usize {
        self.events.notify(&event)
    }

    /// Ask listeners whether the view may close. Returns `true` unless one
    /// of them cancelled.
    pub fn request_close(&self) -> bool {
        let args = ClosingArgs::new();
        self.closing.notify(&args);
        !args.is_cancelled()
    }

    #[must_use]
    pub fn listeners(&self) -> &WeakCallbackList<ViewEvent> {
        &self.events
    }

    #[must_use]
    pub fn closing_listeners(&self) -> &WeakCallbackList<ClosingArgs> {
        &self.closing
    }
}

/// A host view a status service can be pointed at.
pub trait View: 'static {
    fn capabilities(&self) -> ViewCapabilities;

    fn events(&self) -> &ViewEvents;

    /// The dispatcher of the thread that owns this view.
    fn dispatcher(&self) -> Option<Rc<dyn Dispatcher>> {
        None
    }
}
