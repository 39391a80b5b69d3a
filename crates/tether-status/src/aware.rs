#![forbid(unsafe_code)]

//! Opt-in hooks for view models.

use std::rc::Rc;

use crate::status::ViewStatus;
use crate::view::ClosingArgs;

/// A view model that wants to hear about its view.
///
/// Every hook defaults to doing nothing.
pub trait ViewAware: 'static {
    fn on_loaded(&self) {}

    fn on_unloaded(&self) {}

    fn on_activated(&self) {}

    fn on_deactivated(&self) {}

    /// Call `args.cancel()` to keep the window open.
    fn on_closing(&self, _args: &ClosingArgs) {}

    fn on_closed(&self) {}
}

/// Register `model`'s hooks on `status`. The model is held weakly.
pub fn attach<M: ViewAware>(model: &Rc<M>, status: &ViewStatus) {
    status
        .lifecycle()
        .loaded()
        .register_bound(model, |m: &M, _: &()| m.on_loaded());
    status
        .lifecycle()
        .unloaded()
        .register_bound(model, |m: &M, _: &()| m.on_unloaded());
    status
        .activation()
        .activated()
        .register_bound(model, |m: &M, _: &()| m.on_activated());
    status
        .activation()
        .deactivated()
        .register_bound(model, |m: &M, _: &()| m.on_deactivated());
    status
        .window()
        .closing()
        .register_bound(model, |m: &M, args: &ClosingArgs| m.on_closing(args));
    status
        .window()
        .closed()
        .register_bound(model, |m: &M, _: &()| m.on_closed());
}

/// Undo [`attach`]. Returns how many hooks were removed.
pub fn detach<M: ViewAware>(model: &Rc<M>, status: &ViewStatus) -> usize {
    status.lifecycle().loaded().unregister_target(model)
        + status.lifecycle().unloaded().unregister_target(model)
        + status.activation().activated().unregister_target(model)
        + status.activation().deactivated().unregister_target(model)
        + status.window().closing().unregister_target(model)
        + status.window().closed().unregister_target(model)
}
