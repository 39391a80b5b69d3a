#![forbid(unsafe_code)]

//! Subscriber lists with RAII unsubscription.
//!
//! [`Subscribers`] stores callbacks as `Weak` pointers; the strong side lives
//! in the [`Subscription`] guard returned to the caller. Dropping the guard
//! is the only way to unsubscribe. Dead slots are cleaned up on the next
//! subscription or notification, so a list that never notifies stays
//! bounded by its live subscribers.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Slot<A> = Weak<dyn Fn(&A)>;

/// Ordered list of change callbacks taking `&A`.
pub struct Subscribers<A: ?Sized + 'static> {
    slots: RefCell<Vec<Slot<A>>>,
}

impl<A: ?Sized + 'static> Default for Subscribers<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized + 'static> fmt::Debug for Subscribers<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("live", &self.live_count())
            .finish()
    }
}

impl<A: ?Sized + 'static> Subscribers<A> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
        }
    }

    /// Register `callback`. It stays registered while the returned guard lives.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&A) + 'static) -> Subscription {
        let strong: Rc<dyn Fn(&A)> = Rc::new(callback);
        let mut slots = self.slots.borrow_mut();
        slots.retain(|slot| slot.strong_count() > 0);
        slots.push(Rc::downgrade(&strong));
        drop(slots);
        Subscription::from_guard(strong)
    }

    /// Call every live subscriber in registration order.
    ///
    /// Subscribers added during the call are not invoked until the next
    /// notification. Returns the number of callbacks run.
    pub fn notify(&self, args: &A) -> usize {
        let live: Vec<Rc<dyn Fn(&A)>> = {
            let mut slots = self.slots.borrow_mut();
            slots.retain(|slot| slot.strong_count() > 0);
            slots.iter().filter_map(Weak::upgrade).collect()
        };
        for callback in &live {
            callback(args);
        }
        live.len()
    }

    /// Number of subscribers whose guard is still alive.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|slot| slot.strong_count() > 0)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count() == 0
    }

    /// Stored slots, including dead ones not yet cleaned up.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.borrow().len()
    }
}

/// RAII guard for a registered callback. Dropping it unsubscribes.
#[must_use = "dropping the Subscription unsubscribes immediately"]
pub struct Subscription {
    _guard: Option<Box<dyn Any>>,
}

impl Subscription {
    /// Keep `guard` alive for as long as the subscription lives.
    ///
    /// Host [`PropertySource`](super::PropertySource) implementations use
    /// this to tie their own registration state to the guard.
    pub fn from_guard<G: 'static>(guard: G) -> Self {
        Self {
            _guard: Some(Box::new(guard)),
        }
    }

    /// A subscription to something that never changes.
    pub fn empty() -> Self {
        Self { _guard: None }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self._guard.is_none()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self._guard.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn notify_in_registration_order() {
        let subs: Subscribers<i32> = Subscribers::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = Rc::clone(&log);
        let l2 = Rc::clone(&log);
        let _a = subs.subscribe(move |v| l1.borrow_mut().push(("a", *v)));
        let _b = subs.subscribe(move |v| l2.borrow_mut().push(("b", *v)));
        assert_eq!(subs.notify(&4), 2);
        assert_eq!(*log.borrow(), vec![("a", 4), ("b", 4)]);
    }

    #[test]
    fn dropping_guard_unsubscribes() {
        let subs: Subscribers<()> = Subscribers::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let guard = subs.subscribe(move |()| h.set(h.get() + 1));
        subs.notify(&());
        drop(guard);
        assert_eq!(subs.notify(&()), 0);
        assert_eq!(hits.get(), 1);
        assert!(subs.is_empty());
    }

    #[test]
    fn subscribe_during_notify_waits_for_next_cycle() {
        let subs: Rc<Subscribers<()>> = Rc::new(Subscribers::new());
        let late_hits = Rc::new(Cell::new(0));
        let held = Rc::new(RefCell::new(Vec::new()));

        let subs2 = Rc::clone(&subs);
        let late = Rc::clone(&late_hits);
        let held2 = Rc::clone(&held);
        let _outer = subs.subscribe(move |()| {
            let late = Rc::clone(&late);
            held2
                .borrow_mut()
                .push(subs2.subscribe(move |()| late.set(late.get() + 1)));
        });

        subs.notify(&());
        assert_eq!(late_hits.get(), 0);
        subs.notify(&());
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn subscribe_reclaims_dead_slots() {
        let subs: Subscribers<()> = Subscribers::new();
        for _ in 0..1_000 {
            let guard = subs.subscribe(|()| {});
            drop(guard);
        }
        assert_eq!(subs.slot_count(), 1);
        assert!(subs.is_empty());

        let _kept = subs.subscribe(|()| {});
        assert_eq!(subs.slot_count(), 1);
        assert_eq!(subs.live_count(), 1);
    }

    #[test]
    fn unsized_argument() {
        let subs: Subscribers<str> = Subscribers::new();
        let seen = Rc::new(RefCell::new(String::new()));
        let s = Rc::clone(&seen);
        let _g = subs.subscribe(move |name: &str| s.borrow_mut().push_str(name));
        subs.notify("title");
        assert_eq!(&*seen.borrow(), "title");
    }

    #[test]
    fn empty_subscription() {
        let sub = Subscription::empty();
        assert!(sub.is_empty());
        assert!(!Subscription::from_guard(()).is_empty());
    }
}
