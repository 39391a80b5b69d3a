#![forbid(unsafe_code)]

//! Weak callback handles and ordered callback lists.
//!
//! A [`WeakHandle`] pairs a method with a non-owning reference to the object
//! it is bound to. Registering a long-lived service's method against a
//! short-lived view (or the other way around) therefore never keeps either
//! side alive.
//!
//! [`WeakCallbackList`] is the registry every lifecycle and enablement
//! notification surface is built on.
//!
//! # Invariants
//!
//! 1. A handle never holds a strong reference to its target.
//! 2. Callbacks run in registration order.
//! 3. A handle whose target has been dropped is skipped, never an error.
//! 4. Registration and unregistration are symmetric: every `register*`
//!    returns a [`HandleId`] accepted by [`WeakCallbackList::unregister`].
//! 5. Callbacks may re-enter the list they are invoked from. Changes made
//!    during a notification take effect from the next one.
//!
//! # Method identity
//!
//! Bound methods are plain `fn(&T, &A)` pointers rather than closures. A
//! closure could capture a strong reference to its own target and silently
//! defeat the weak binding; a function pointer cannot capture anything.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::logging::trace;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a [`WeakHandle`] is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// A method on an object instance, held weakly.
    Bound,
    /// A free function. Always alive.
    Static,
}

trait Callback<A: ?Sized> {
    fn is_alive(&self) -> bool;
    /// Returns false when the target is gone and nothing ran.
    fn invoke(&self, args: &A) -> bool;
    fn target_addr(&self) -> Option<usize>;
}

struct BoundMethod<T, A: ?Sized> {
    target: Weak<T>,
    method: fn(&T, &A),
}

impl<T, A: ?Sized> Callback<A> for BoundMethod<T, A> {
    fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    fn invoke(&self, args: &A) -> bool {
        match self.target.upgrade() {
            Some(target) => {
                (self.method)(&target, args);
                true
            }
            None => false,
        }
    }

    fn target_addr(&self) -> Option<usize> {
        // The allocation outlives the value while this Weak exists, so the
        // address cannot be reused by another target.
        Some(self.target.as_ptr() as *const () as usize)
    }
}

struct StaticMethod<A: ?Sized> {
    method: fn(&A),
}

impl<A: ?Sized> Callback<A> for StaticMethod<A> {
    fn is_alive(&self) -> bool {
        true
    }

    fn invoke(&self, args: &A) -> bool {
        (self.method)(args);
        true
    }

    fn target_addr(&self) -> Option<usize> {
        None
    }
}

/// A callback that does not extend the lifetime of its target.
///
/// `A` is the declared argument type; lifecycle events use `()`.
/// Cloning a handle yields another reference to the same registration
/// (same [`HandleId`]).
pub struct WeakHandle<A: ?Sized + 'static = ()> {
    id: HandleId,
    kind: HandleKind,
    callback: Rc<dyn Callback<A>>,
}

impl<A: ?Sized + 'static> Clone for WeakHandle<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            kind: self.kind,
            callback: Rc::clone(&self.callback),
        }
    }
}

impl<A: ?Sized + 'static> fmt::Debug for WeakHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl<A: ?Sized + 'static> WeakHandle<A> {
    /// Bind `method` to `target` without taking ownership of it.
    #[must_use]
    pub fn bound<T: 'static>(target: &Rc<T>, method: fn(&T, &A)) -> Self {
        Self {
            id: HandleId::next(),
            kind: HandleKind::Bound,
            callback: Rc::new(BoundMethod {
                target: Rc::downgrade(target),
                method,
            }),
        }
    }

    /// Wrap a free function. Static handles never expire.
    #[must_use]
    pub fn from_static(method: fn(&A)) -> Self {
        Self {
            id: HandleId::next(),
            kind: HandleKind::Static,
            callback: Rc::new(StaticMethod { method }),
        }
    }

    #[must_use]
    pub fn id(&self) -> HandleId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Whether invoking this handle would run its method.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.callback.is_alive()
    }

    /// Whether the bound target has been dropped. Always false for static
    /// handles.
    #[must_use]
    pub fn has_been_collected(&self) -> bool {
        !self.callback.is_alive()
    }

    /// Run the method if the target is still alive.
    ///
    /// Returns `true` if the method ran.
    pub fn invoke(&self, args: &A) -> bool {
        self.callback.invoke(args)
    }

    /// Whether this handle is bound to `target`.
    #[must_use]
    pub fn targets<T>(&self, target: &Rc<T>) -> bool {
        self.callback.target_addr() == Some(Rc::as_ptr(target) as *const () as usize)
    }
}

/// Ordered list of [`WeakHandle`]s.
///
/// Interior mutability lets callbacks register or unregister while the list
/// is being notified. The list is not synchronized and is `!Send`.
pub struct WeakCallbackList<A: ?Sized + 'static = ()> {
    entries: RefCell<Vec<WeakHandle<A>>>,
}

impl<A: ?Sized + 'static> Default for WeakCallbackList<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized + 'static> fmt::Debug for WeakCallbackList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakCallbackList")
            .field("len", &self.len())
            .field("live", &self.live_count())
            .finish()
    }
}

impl<A: ?Sized + 'static> WeakCallbackList<A> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    /// Append a handle. Returns its id.
    pub fn register(&self, handle: WeakHandle<A>) -> HandleId {
        let id = handle.id();
        self.entries.borrow_mut().push(handle);
        id
    }

    /// Append `method` bound weakly to `target`.
    pub fn register_bound<T: 'static>(&self, target: &Rc<T>, method: fn(&T, &A)) -> HandleId {
        self.register(WeakHandle::bound(target, method))
    }

    /// Append a free function.
    pub fn register_static(&self, method: fn(&A)) -> HandleId {
        self.register(WeakHandle::from_static(method))
    }

    /// Remove the handle with `id`. Returns whether it was present.
    pub fn unregister(&self, id: HandleId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|h| h.id() != id);
        entries.len() != before
    }

    /// Remove every handle bound to `target`. Returns how many were removed.
    pub fn unregister_target<T>(&self, target: &Rc<T>) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|h| !h.targets(target));
        before - entries.len()
    }

    #[must_use]
    pub fn contains(&self, id: HandleId) -> bool {
        self.entries.borrow().iter().any(|h| h.id() == id)
    }

    /// Number of registered handles, dead or alive.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Number of handles whose target is still alive.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.borrow().iter().filter(|h| h.is_alive()).count()
    }

    /// Drop handles whose targets are gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(WeakHandle::is_alive);
        let removed = before - entries.len();
        if removed > 0 {
            trace!(removed, remaining = entries.len(), "pruned dead weak handles");
        }
        removed
    }

    /// Remove all handles.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Lazily invoke every live handle in registration order.
    ///
    /// The iterator works on a snapshot taken now; each call to `next()`
    /// invokes the next live handle and yields its id. Dead handles are
    /// skipped. Nothing runs until the iterator is advanced.
    #[must_use = "callbacks only run as the iterator is advanced"]
    pub fn invoke_all<'a>(&self, args: &'a A) -> InvokeAll<'a, A> {
        InvokeAll {
            pending: self.entries.borrow().clone().into_iter(),
            args,
        }
    }

    /// Invoke every live handle, then prune dead ones.
    ///
    /// Returns the number of callbacks that ran.
    pub fn notify(&self, args: &A) -> usize {
        let invoked = self.invoke_all(args).count();
        self.prune();
        invoked
    }
}

impl WeakCallbackList<()> {
    /// [`notify`](Self::notify) for argument-less lists.
    pub fn fire(&self) -> usize {
        self.notify(&())
    }
}

/// Lazy invocation sequence returned by [`WeakCallbackList::invoke_all`].
pub struct InvokeAll<'a, A: ?Sized + 'static> {
    pending: std::vec::IntoIter<WeakHandle<A>>,
    args: &'a A,
}

impl<A: ?Sized + 'static> Iterator for InvokeAll<'_, A> {
    type Item = HandleId;

    fn next(&mut self) -> Option<HandleId> {
        for handle in self.pending.by_ref() {
            if handle.invoke(self.args) {
                return Some(handle.id());
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.pending.len()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct Probe {
        hits: Cell<u32>,
        seen: RefCell<Vec<i32>>,
    }

    impl Probe {
        fn hit(&self, _: &()) {
            self.hits.set(self.hits.get() + 1);
        }

        fn record(&self, value: &i32) {
            self.seen.borrow_mut().push(*value);
        }
    }

    thread_local! {
        static STATIC_HITS: Cell<u32> = const { Cell::new(0) };
        static ORDER: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
    }

    fn static_hit(_: &()) {
        STATIC_HITS.with(|h| h.set(h.get() + 1));
    }

    #[test]
    fn bound_handle_invokes_live_target() {
        let probe = Rc::new(Probe::default());
        let handle = WeakHandle::bound(&probe, Probe::hit);
        assert!(handle.is_alive());
        assert!(handle.invoke(&()));
        assert_eq!(probe.hits.get(), 1);
        assert_eq!(handle.kind(), HandleKind::Bound);
    }

    #[test]
    fn handle_does_not_keep_target_alive() {
        let probe = Rc::new(Probe::default());
        let handle = WeakHandle::bound(&probe, Probe::hit);
        assert_eq!(Rc::strong_count(&probe), 1);
        drop(probe);
        assert!(!handle.is_alive());
        assert!(handle.has_been_collected());
        assert!(!handle.invoke(&()));
    }

    #[test]
    fn static_handle_is_always_alive() {
        let handle = WeakHandle::from_static(static_hit);
        assert!(handle.is_alive());
        assert!(!handle.has_been_collected());
        let before = STATIC_HITS.with(Cell::get);
        assert!(handle.invoke(&()));
        assert_eq!(STATIC_HITS.with(Cell::get), before + 1);
        assert_eq!(handle.kind(), HandleKind::Static);
    }

    #[test]
    fn list_invokes_in_registration_order() {
        struct Named(&'static str);
        fn push_name(n: &Named, _: &()) {
            ORDER.with(|o| o.borrow_mut().push(n.0));
        }

        ORDER.with(|o| o.borrow_mut().clear());
        let first = Rc::new(Named("first"));
        let second = Rc::new(Named("second"));
        let third = Rc::new(Named("third"));
        let list = WeakCallbackList::new();
        list.register_bound(&first, push_name);
        list.register_bound(&second, push_name);
        list.register_bound(&third, push_name);

        assert_eq!(list.fire(), 3);
        ORDER.with(|o| assert_eq!(*o.borrow(), vec!["first", "second", "third"]));
    }

    #[test]
    fn dead_targets_are_skipped_and_pruned() {
        let keep = Rc::new(Probe::default());
        let dropped = Rc::new(Probe::default());
        let list = WeakCallbackList::new();
        list.register_bound(&keep, Probe::hit);
        list.register_bound(&dropped, Probe::hit);
        drop(dropped);

        assert_eq!(list.len(), 2);
        assert_eq!(list.live_count(), 1);
        assert_eq!(list.fire(), 1);
        assert_eq!(keep.hits.get(), 1);
        // Pruned after notify.
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn invoke_all_is_lazy() {
        let a = Rc::new(Probe::default());
        let b = Rc::new(Probe::default());
        let list = WeakCallbackList::new();
        let id_a = list.register_bound(&a, Probe::hit);
        list.register_bound(&b, Probe::hit);

        let mut seq = list.invoke_all(&());
        assert_eq!(a.hits.get(), 0);
        assert_eq!(seq.next(), Some(id_a));
        assert_eq!(a.hits.get(), 1);
        assert_eq!(b.hits.get(), 0);
        drop(seq);
        assert_eq!(b.hits.get(), 0);
    }

    #[test]
    fn invoke_all_yields_only_live_ids() {
        let a = Rc::new(Probe::default());
        let b = Rc::new(Probe::default());
        let list = WeakCallbackList::new();
        list.register_bound(&a, Probe::hit);
        let id_b = list.register_bound(&b, Probe::hit);
        drop(a);
        let ids: Vec<_> = list.invoke_all(&()).collect();
        assert_eq!(ids, vec![id_b]);
    }

    #[test]
    fn arguments_are_passed_through() {
        let probe = Rc::new(Probe::default());
        let list: WeakCallbackList<i32> = WeakCallbackList::new();
        list.register_bound(&probe, Probe::record);
        list.notify(&7);
        list.notify(&11);
        assert_eq!(*probe.seen.borrow(), vec![7, 11]);
    }

    #[test]
    fn unregister_by_id() {
        let probe = Rc::new(Probe::default());
        let list = WeakCallbackList::new();
        let id = list.register_bound(&probe, Probe::hit);
        assert!(list.contains(id));
        assert!(list.unregister(id));
        assert!(!list.unregister(id));
        assert_eq!(list.fire(), 0);
        assert_eq!(probe.hits.get(), 0);
    }

    #[test]
    fn unregister_target_removes_all_its_handles() {
        let probe = Rc::new(Probe::default());
        let other = Rc::new(Probe::default());
        let list = WeakCallbackList::new();
        list.register_bound(&probe, Probe::hit);
        list.register_bound(&other, Probe::hit);
        list.register_bound(&probe, Probe::hit);

        assert_eq!(list.unregister_target(&probe), 2);
        assert_eq!(list.fire(), 1);
        assert_eq!(other.hits.get(), 1);
        assert_eq!(probe.hits.get(), 0);
    }

    #[test]
    fn callbacks_may_register_during_notification() {
        struct Registrar {
            list: Rc<WeakCallbackList>,
            extra: Rc<Probe>,
        }
        fn add_more(r: &Registrar, _: &()) {
            r.list.register_bound(&r.extra, Probe::hit);
        }

        let list = Rc::new(WeakCallbackList::new());
        let extra = Rc::new(Probe::default());
        let registrar = Rc::new(Registrar {
            list: Rc::clone(&list),
            extra: Rc::clone(&extra),
        });
        list.register_bound(&registrar, add_more);

        // Snapshot semantics: the new handle does not run in this cycle.
        assert_eq!(list.fire(), 1);
        assert_eq!(extra.hits.get(), 0);
        assert_eq!(list.len(), 2);

        assert_eq!(list.fire(), 2);
        assert_eq!(extra.hits.get(), 1);
    }

    #[test]
    fn clone_shares_id() {
        let probe = Rc::new(Probe::default());
        let handle = WeakHandle::bound(&probe, Probe::hit);
        let copy = handle.clone();
        assert_eq!(handle.id(), copy.id());
        assert!(copy.targets(&probe));
    }

    #[test]
    fn handle_ids_are_unique() {
        let a = WeakHandle::<()>::from_static(static_hit);
        let b = WeakHandle::<()>::from_static(static_hit);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn debug_format() {
        let list: WeakCallbackList = WeakCallbackList::new();
        list.register_static(static_hit);
        let dbg = format!("{list:?}");
        assert!(dbg.contains("WeakCallbackList"));
        assert!(dbg.contains("live: 1"));
    }
}
