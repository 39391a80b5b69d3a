#![forbid(unsafe_code)]

//! The host object model: members with values and change notification.
//!
//! [`PropertySource`] is the capability a host object exposes so that
//! dependency sources can read and observe it. Values cross this boundary
//! type-erased as [`PropertyValue`]; nested objects are themselves property
//! sources, which is what lets a path walk `a.b.c`.
//!
//! [`PropertyBag`] is a ready-made implementation: a map of named members
//! that notifies per member and for "any member" whenever a value actually
//! changes.

use std::any::{Any, type_name};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use super::subscription::{Subscribers, Subscription};

/// Read and observe named members of a host object.
pub trait PropertySource {
    /// Current value of `member`, or `None` when it is absent.
    fn property(&self, member: &str) -> Option<PropertyValue>;

    /// Call `on_change` whenever `member` changes, until the returned
    /// guard is dropped.
    fn observe(&self, member: &str, on_change: Box<dyn Fn()>) -> Subscription;
}

/// A type-erased member value.
#[derive(Clone)]
pub enum PropertyValue {
    /// A leaf value.
    Value(Rc<dyn Any>),
    /// A nested object a path can continue through.
    Object(Rc<dyn PropertySource>),
}

impl PropertyValue {
    pub fn of<T: 'static>(value: T) -> Self {
        Self::Value(Rc::new(value))
    }

    pub fn object<S: PropertySource + 'static>(object: Rc<S>) -> Self {
        Self::Object(object)
    }

    /// Restore the value as `T`.
    ///
    /// An `Object` downcasts only to `Rc<dyn PropertySource>`.
    #[must_use]
    pub fn downcast<T: Clone + 'static>(&self) -> Option<T> {
        match self {
            Self::Value(value) => value.downcast_ref::<T>().cloned(),
            Self::Object(object) => (object as &dyn Any).downcast_ref::<T>().cloned(),
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Rc<dyn PropertySource>> {
        match self {
            Self::Object(object) => Some(object),
            Self::Value(_) => None,
        }
    }

    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    fn same_object(&self, other: &Rc<dyn PropertySource>) -> bool {
        self.as_object()
            .is_some_and(|mine| std::ptr::addr_eq(Rc::as_ptr(mine), Rc::as_ptr(other)))
    }
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Value(..)"),
            Self::Object(_) => f.write_str("Object(..)"),
        }
    }
}

/// A change-notifying map of named members.
///
/// Setting a member to a value equal to its current one is a no-op.
/// Notifications run after internal borrows are released, so callbacks may
/// read or write the bag.
#[derive(Default)]
pub struct PropertyBag {
    values: RefCell<AHashMap<String, PropertyValue>>,
    observers: RefCell<AHashMap<String, Rc<Subscribers<()>>>>,
    any_changed: Subscribers<str>,
}

impl fmt::Debug for PropertyBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.borrow();
        let mut members: Vec<_> = values.keys().map(String::as_str).collect();
        members.sort_unstable();
        f.debug_struct("PropertyBag")
            .field("members", &members)
            .finish()
    }
}

impl PropertyBag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a leaf value. Returns whether anything changed.
    pub fn set<T: PartialEq + 'static>(&self, member: &str, value: T) -> bool {
        {
            let mut values = self.values.borrow_mut();
            let unchanged = values
                .get(member)
                .and_then(|current| match current {
                    PropertyValue::Value(v) => v.downcast_ref::<T>(),
                    PropertyValue::Object(_) => None,
                })
                .is_some_and(|current| *current == value);
            if unchanged {
                return false;
            }
            values.insert(member.to_owned(), PropertyValue::of(value));
        }
        self.raise(member);
        true
    }

    /// Set a nested object. Setting the same instance again is a no-op.
    pub fn set_object<S: PropertySource + 'static>(&self, member: &str, object: Rc<S>) -> bool {
        let object: Rc<dyn PropertySource> = object;
        {
            let mut values = self.values.borrow_mut();
            if values.get(member).is_some_and(|v| v.same_object(&object)) {
                return false;
            }
            values.insert(member.to_owned(), PropertyValue::Object(object));
        }
        self.raise(member);
        true
    }

    /// Remove a member. Returns whether it was present.
    pub fn remove(&self, member: &str) -> bool {
        let removed = self.values.borrow_mut().remove(member).is_some();
        if removed {
            self.raise(member);
        }
        removed
    }

    /// Current value of a leaf member as `T`.
    ///
    /// # Panics
    ///
    /// Panics if the member holds a value of another type.
    #[must_use]
    pub fn get<T: Clone + 'static>(&self, member: &str) -> Option<T> {
        let values = self.values.borrow();
        let value = values.get(member)?;
        Some(value.downcast::<T>().unwrap_or_else(|| {
            panic!("member `{member}` does not hold a `{}`", type_name::<T>())
        }))
    }

    /// Current nested object of `member`, if it holds one.
    #[must_use]
    pub fn object(&self, member: &str) -> Option<Rc<dyn PropertySource>> {
        self.values
            .borrow()
            .get(member)
            .and_then(PropertyValue::as_object)
            .cloned()
    }

    #[must_use]
    pub fn contains(&self, member: &str) -> bool {
        self.values.borrow().contains_key(member)
    }

    /// Call `callback` with the member name after any member changes.
    pub fn subscribe_any(&self, callback: impl Fn(&str) + 'static) -> Subscription {
        self.any_changed.subscribe(callback)
    }

    /// Members with an observer list, live or not yet reclaimed.
    #[must_use]
    pub fn observed_members(&self) -> usize {
        self.observers.borrow().len()
    }

    /// Stored observer slots for `member`, including dead ones.
    #[must_use]
    pub fn observer_slots(&self, member: &str) -> usize {
        self.observers
            .borrow()
            .get(member)
            .map_or(0, |subs| subs.slot_count())
    }

    /// Notify observers of `member` as if it had changed.
    pub fn raise(&self, member: &str) {
        let observers = self.observers.borrow().get(member).cloned();
        if let Some(observers) = observers {
            observers.notify(&());
        }
        self.any_changed.notify(member);
    }
}

impl PropertySource for PropertyBag {
    fn property(&self, member: &str) -> Option<PropertyValue> {
        self.values.borrow().get(member).cloned()
    }

    fn observe(&self, member: &str, on_change: Box<dyn Fn()>) -> Subscription {
        let observers = {
            let mut map = self.observers.borrow_mut();
            map.retain(|name, subs| name == member || !subs.is_empty());
            Rc::clone(map.entry(member.to_owned()).or_default())
        };
        observers.subscribe(move |()| on_change())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn set_and_get() {
        let bag = PropertyBag::new();
        assert!(bag.set("count", 3_i32));
        assert_eq!(bag.get::<i32>("count"), Some(3));
        assert_eq!(bag.get::<i32>("missing"), None);
        assert!(bag.contains("count"));
    }

    #[test]
    fn equal_value_does_not_notify() {
        let bag = PropertyBag::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = bag.observe("n", Box::new(move || h.set(h.get() + 1)));
        assert!(bag.set("n", 1_u8));
        assert!(!bag.set("n", 1_u8));
        assert!(bag.set("n", 2_u8));
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn observers_are_per_member() {
        let bag = PropertyBag::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = bag.observe("a", Box::new(move || h.set(h.get() + 1)));
        bag.set("b", 1_i32);
        assert_eq!(hits.get(), 0);
        bag.set("a", 1_i32);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn any_member_notification_carries_name() {
        let bag = PropertyBag::new();
        let names = Rc::new(RefCell::new(Vec::new()));
        let n = Rc::clone(&names);
        let _sub = bag.subscribe_any(move |name| n.borrow_mut().push(name.to_owned()));
        bag.set("first", "x".to_owned());
        bag.set("second", 2_i64);
        bag.remove("first");
        assert_eq!(*names.borrow(), vec!["first", "second", "first"]);
    }

    #[test]
    fn nested_objects() {
        let inner = Rc::new(PropertyBag::new());
        inner.set("city", "Oslo".to_owned());
        let outer = PropertyBag::new();
        assert!(outer.set_object("address", Rc::clone(&inner)));
        assert!(!outer.set_object("address", Rc::clone(&inner)));

        let found = outer.object("address").unwrap();
        let city = found.property("city").unwrap().downcast::<String>();
        assert_eq!(city.as_deref(), Some("Oslo"));
    }

    #[test]
    fn object_downcasts_to_source() {
        let value = PropertyValue::object(Rc::new(PropertyBag::new()));
        assert!(value.is_object());
        assert!(value.downcast::<Rc<dyn PropertySource>>().is_some());
        assert!(value.downcast::<i32>().is_none());
    }

    #[test]
    fn callbacks_may_write_the_bag() {
        let bag = Rc::new(PropertyBag::new());
        let weak = Rc::downgrade(&bag);
        let _sub = bag.observe(
            "celsius",
            Box::new(move || {
                if let Some(bag) = weak.upgrade() {
                    let c = bag.get::<i32>("celsius").unwrap_or_default();
                    bag.set("fahrenheit", c * 9 / 5 + 32);
                }
            }),
        );
        bag.set("celsius", 100);
        assert_eq!(bag.get::<i32>("fahrenheit"), Some(212));
    }

    #[test]
    #[should_panic(expected = "does not hold")]
    fn get_with_wrong_type_panics() {
        let bag = PropertyBag::new();
        bag.set("n", 1_i32);
        let _ = bag.get::<String>("n");
    }

    #[test]
    fn dropped_observation_stops_notifying() {
        let bag = PropertyBag::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = bag.observe("a", Box::new(move || h.set(h.get() + 1)));
        drop(sub);
        bag.set("a", 1_i32);
        assert_eq!(hits.get(), 0);
    }
    #[test]
    fn abandoned_member_lists_are_reclaimed() {
        let bag = PropertyBag::new();
        for i in 0..100 {
            let member = format!("m{i}");
            drop(bag.observe(&member, Box::new(|| {})));
        }
        assert!(bag.observed_members() <= 1);

        let _live = bag.observe("kept", Box::new(|| {}));
        drop(bag.observe("other", Box::new(|| {})));
        assert_eq!(bag.observed_members(), 2);
        assert_eq!(bag.observer_slots("kept"), 1);
    }
}
