#![forbid(unsafe_code)]

//! The status service a view model listens to.
//!
//! # Design
//!
//! [`ViewStatus`] is pointed at a view with [`ViewStatus::inject_context`].
//! It subscribes to the view's [`ViewEvents`](crate::ViewEvents) hub with a
//! weak handle and re-raises every event on per-event callback lists that
//! view models register with. Only events the view's capabilities cover are
//! routed.
//!
//! # Invariants
//!
//! 1. The service never keeps its view alive, and the view never keeps the
//!    service alive.
//! 2. At most one view is attached. Injecting another view first detaches
//!    from the previous one; injecting the same view again is a no-op.
//! 3. Listener lists survive re-targeting: view models register once.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tether_core::{HandleId, WeakCallbackList};
use tether_runtime::Dispatcher;
use tracing::{debug, trace};

use crate::view::{ClosingArgs, View, ViewCapabilities, ViewEvent};

/// Loaded / Unloaded listeners.
#[derive(Debug, Default)]
pub struct LifecycleEvents {
    loaded: WeakCallbackList,
    unloaded: WeakCallbackList,
}

impl LifecycleEvents {
    #[must_use]
    pub fn loaded(&self) -> &WeakCallbackList {
        &self.loaded
    }

    #[must_use]
    pub fn unloaded(&self) -> &WeakCallbackList {
        &self.unloaded
    }
}

/// Activated / Deactivated listeners.
#[derive(Debug, Default)]
pub struct ActivationEvents {
    activated: WeakCallbackList,
    deactivated: WeakCallbackList,
}

impl ActivationEvents {
    #[must_use]
    pub fn activated(&self) -> &WeakCallbackList {
        &self.activated
    }

    #[must_use]
    pub fn deactivated(&self) -> &WeakCallbackList {
        &self.deactivated
    }
}

/// Window-only listeners.
#[derive(Debug, Default)]
pub struct WindowEvents {
    closing: WeakCallbackList<ClosingArgs>,
    closed: WeakCallbackList,
    content_rendered: WeakCallbackList,
    location_changed: WeakCallbackList,
    state_changed: WeakCallbackList,
}

impl WindowEvents {
    /// Any listener can veto the close through [`ClosingArgs::cancel`].
    #[must_use]
    pub fn closing(&self) -> &WeakCallbackList<ClosingArgs> {
        &self.closing
    }

    #[must_use]
    pub fn closed(&self) -> &WeakCallbackList {
        &self.closed
    }

    #[must_use]
    pub fn content_rendered(&self) -> &WeakCallbackList {
        &self.content_rendered
    }

    #[must_use]
    pub fn location_changed(&self) -> &WeakCallbackList {
        &self.location_changed
    }

    #[must_use]
    pub fn state_changed(&self) -> &WeakCallbackList {
        &self.state_changed
    }
}

struct Attachment {
    view: Weak<dyn View>,
    capabilities: ViewCapabilities,
    dispatcher: Option<Rc<dyn Dispatcher>>,
    event_link: HandleId,
    closing_link: Option<HandleId>,
}

impl Attachment {
    fn release(self) {
        if let Some(view) = self.view.upgrade() {
            view.events().listeners().unregister(self.event_link);
            if let Some(id) = self.closing_link {
                view.events().closing_listeners().unregister(id);
            }
        }
    }
}

#[derive(Default)]
struct StatusInner {
    attachment: RefCell<Option<Attachment>>,
    lifecycle: LifecycleEvents,
    activation: ActivationEvents,
    window: WindowEvents,
}

impl StatusInner {
    fn capabilities(&self) -> ViewCapabilities {
        self.attachment
            .borrow()
            .as_ref()
            .map_or(ViewCapabilities::empty(), |a| a.capabilities)
    }

    fn route(&self, event: &ViewEvent) {
        if !self.capabilities().contains(event.capability()) {
            trace!(message = "status.ignored", event = ?event);
            return;
        }
        let listeners = match event {
            ViewEvent::Loaded => &self.lifecycle.loaded,
            ViewEvent::Unloaded => &self.lifecycle.unloaded,
            ViewEvent::Activated => &self.activation.activated,
            ViewEvent::Deactivated => &self.activation.deactivated,
            ViewEvent::Closed => &self.window.closed,
            ViewEvent::ContentRendered => &self.window.content_rendered,
            ViewEvent::LocationChanged => &self.window.location_changed,
            ViewEvent::StateChanged => &self.window.state_changed,
        };
        let delivered = listeners.fire();
        trace!(message = "status.route", event = ?event, delivered);
    }

    fn route_closing(&self, args: &ClosingArgs) {
        self.window.closing.notify(args);
        if args.is_cancelled() {
            debug!(message = "status.close_vetoed");
        }
    }
}

impl Drop for StatusInner {
    fn drop(&mut self) {
        if let Some(attachment) = self.attachment.get_mut().take() {
            attachment.release();
        }
    }
}

/// View and window status for one view model.
///
/// Clones share the same attachment and listener lists.
#[derive(Clone, Default)]
pub struct ViewStatus {
    inner: Rc<StatusInner>,
}

impl fmt::Debug for ViewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewStatus")
            .field("attached", &self.is_attached())
            .field("capabilities", &self.capabilities())
            .finish_non_exhaustive()
    }
}

impl ViewStatus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the service at `view`, detaching from the previous one.
    pub fn inject_context<V: View>(&self, view: &Rc<V>) {
        let view: Rc<dyn View> = Rc::clone(view) as Rc<dyn View>;
        let weak = Rc::downgrade(&view);
        let same = self
            .inner
            .attachment
            .borrow()
            .as_ref()
            .is_some_and(|a| Weak::ptr_eq(&a.view, &weak));
        if same {
            return;
        }

        self.detach();
        let capabilities = view.capabilities();
        let event_link = view
            .events()
            .listeners()
            .register_bound(&self.inner, StatusInner::route);
        let closing_link = capabilities.contains(ViewCapabilities::WINDOW).then(|| {
            view.events()
                .closing_listeners()
                .register_bound(&self.inner, StatusInner::route_closing)
        });
        debug!(
            message = "status.attached",
            capabilities = ?capabilities,
            has_dispatcher = view.dispatcher().is_some()
        );
        *self.inner.attachment.borrow_mut() = Some(Attachment {
            view: weak,
            capabilities,
            dispatcher: view.dispatcher(),
            event_link,
            closing_link,
        });
    }

    /// Stop listening to the current view. Returns whether one was attached.
    pub fn detach(&self) -> bool {
        let previous = self.inner.attachment.borrow_mut().take();
        match previous {
            Some(attachment) => {
                attachment.release();
                debug!(message = "status.detached");
                true
            }
            None => false,
        }
    }

    /// The current view, while it is alive.
    #[must_use]
    pub fn context(&self) -> Option<Rc<dyn View>> {
        self.inner
            .attachment
            .borrow()
            .as_ref()
            .and_then(|a| a.view.upgrade())
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.context().is_some()
    }

    /// Capabilities of the current view; empty when detached.
    #[must_use]
    pub fn capabilities(&self) -> ViewCapabilities {
        self.inner.capabilities()
    }

    #[must_use]
    pub fn supports(&self, capabilities: ViewCapabilities) -> bool {
        self.capabilities().contains(capabilities)
    }

    /// Dispatcher of the current view's thread.
    #[must_use]
    pub fn dispatcher(&self) -> Option<Rc<dyn Dispatcher>> {
        self.inner
            .attachment
            .borrow()
            .as_ref()
            .and_then(|a| a.dispatcher.clone())
    }

    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleEvents {
        &self.inner.lifecycle
    }

    #[must_use]
    pub fn activation(&self) -> &ActivationEvents {
        &self.inner.activation
    }

    #[must_use]
    pub fn window(&self) -> &WindowEvents {
        &self.inner.window
    }
}
