#![forbid(unsafe_code)]

//! A value at a property path on a host object, with change notification.
//!
//! [`DependencySource`] resolves its path eagerly: it observes every member
//! it walks through, so replacing an intermediate object (say `address` in
//! `address.city`) re-resolves the rest of the path against the new object.
//!
//! Resolution never fails. When a segment is absent, when a segment holds a
//! plain value where an object is needed, or when the owner itself has been
//! dropped, the source reports its fallback value.
//!
//! # Contract
//!
//! The leaf member must hold a `T`. Any other type is a programming error
//! and panics on resolution.

use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::engine::{Dependency, Watch};
use super::path::PropertyPath;
use super::property::{PropertySource, PropertyValue};
use super::subscription::{Subscribers, Subscription};

struct SourceState<T> {
    current: T,
    resolved: bool,
    /// One observation per reached segment.
    links: Vec<Subscription>,
}

struct SourceInner<T: 'static> {
    owner: Weak<dyn PropertySource>,
    path: PropertyPath,
    fallback: T,
    state: RefCell<SourceState<T>>,
    changed: Subscribers<T>,
}

/// Observed `(owner, path)` pair with a current value.
///
/// Holds its owner weakly. Cloning shares the same observation.
pub struct DependencySource<T: Clone + 'static> {
    inner: Rc<SourceInner<T>>,
}

impl<T: Clone + 'static> Clone for DependencySource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for DependencySource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("DependencySource")
            .field("path", &self.inner.path.to_string())
            .field("current", &state.current)
            .field("resolved", &state.resolved)
            .finish()
    }
}

impl<T: Clone + 'static> DependencySource<T> {
    /// Observe `path` on `owner`, reporting `fallback` while unresolved.
    pub fn new<S: PropertySource + 'static>(owner: &Rc<S>, path: PropertyPath, fallback: T) -> Self {
        let owner: Rc<dyn PropertySource> = Rc::clone(owner) as Rc<dyn PropertySource>;
        Self::with_owner(&owner, path, fallback)
    }

    /// [`new`](Self::new) for an owner that is already type-erased.
    pub fn with_owner(owner: &Rc<dyn PropertySource>, path: PropertyPath, fallback: T) -> Self {
        let inner = Rc::new(SourceInner {
            owner: Rc::downgrade(owner),
            path,
            fallback: fallback.clone(),
            state: RefCell::new(SourceState {
                current: fallback,
                resolved: false,
                links: Vec::new(),
            }),
            changed: Subscribers::new(),
        });
        let (current, resolved, links) = SourceInner::resolve(&inner);
        *inner.state.borrow_mut() = SourceState {
            current,
            resolved,
            links,
        };
        Self { inner }
    }

    /// Current value, or the fallback while the path is unresolved.
    #[must_use]
    pub fn value(&self) -> T {
        self.inner.state.borrow().current.clone()
    }

    /// Borrow the current value without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.state.borrow().current)
    }

    #[must_use]
    pub fn path(&self) -> &PropertyPath {
        &self.inner.path
    }

    #[must_use]
    pub fn fallback(&self) -> &T {
        &self.inner.fallback
    }

    /// Whether the whole path currently resolves to a value.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.inner.state.borrow().resolved
    }

    /// Number of members currently observed.
    #[must_use]
    pub fn observed_segments(&self) -> usize {
        self.inner.state.borrow().links.len()
    }

    /// Call `callback` with the new value after every change.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.inner.changed.subscribe(callback)
    }
}

impl<T: Clone + 'static> SourceInner<T> {
    fn resolve(this: &Rc<Self>) -> (T, bool, Vec<Subscription>) {
        let mut links = Vec::with_capacity(this.path.len());
        let Some(mut object) = this.owner.upgrade() else {
            return (this.fallback.clone(), false, links);
        };
        let last = this.path.len() - 1;
        for (depth, member) in this.path.segments().iter().enumerate() {
            links.push(object.observe(member, Self::on_segment_changed(this)));
            let Some(value) = object.property(member) else {
                break;
            };
            if depth == last {
                let leaf = value.downcast::<T>().unwrap_or_else(|| {
                    panic!(
                        "property path `{}` does not hold a `{}`",
                        this.path,
                        type_name::<T>()
                    )
                });
                return (leaf, true, links);
            }
            match value {
                PropertyValue::Object(next) => object = next,
                PropertyValue::Value(_) => break,
            }
        }
        (this.fallback.clone(), false, links)
    }

    fn on_segment_changed(this: &Rc<Self>) -> Box<dyn Fn()> {
        let weak = Rc::downgrade(this);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                Self::refresh(&inner);
            }
        })
    }

    fn refresh(this: &Rc<Self>) {
        let (current, resolved, links) = Self::resolve(this);
        let stale = {
            let mut state = this.state.borrow_mut();
            state.current = current.clone();
            state.resolved = resolved;
            std::mem::replace(&mut state.links, links)
        };
        drop(stale);
        this.changed.notify(&current);
    }
}

impl<T: Clone + 'static> Watch for DependencySource<T> {
    /// Delivers the current value once on attach, the way a host binding
    /// pushes its initial value.
    fn watch(&self, on_change: Rc<dyn Fn()>) -> Subscription {
        let notify = Rc::clone(&on_change);
        let subscription = self.subscribe(move |_| notify());
        on_change();
        subscription
    }
}

impl<T: Clone + 'static> Dependency for DependencySource<T> {
    type Value = T;

    fn current(&self) -> T {
        self.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::PropertyBag;
    use std::cell::Cell;

    fn path(s: &str) -> PropertyPath {
        PropertyPath::parse(s).unwrap()
    }

    #[test]
    fn reads_direct_member() {
        let bag = Rc::new(PropertyBag::new());
        bag.set("n", 5_i32);
        let src = DependencySource::new(&bag, path("n"), 0);
        assert_eq!(src.value(), 5);
        assert!(src.is_resolved());
        assert_eq!(src.observed_segments(), 1);
    }

    #[test]
    fn absent_member_surfaces_fallback() {
        let bag = Rc::new(PropertyBag::new());
        let src = DependencySource::new(&bag, path("missing"), -1_i32);
        assert_eq!(src.value(), -1);
        assert!(!src.is_resolved());

        bag.set("missing", 9_i32);
        assert_eq!(src.value(), 9);
        assert!(src.is_resolved());
    }

    #[test]
    fn follows_nested_path_and_reresolves() {
        let root = Rc::new(PropertyBag::new());
        let first = Rc::new(PropertyBag::new());
        first.set("city", "Oslo".to_owned());
        root.set_object("address", Rc::clone(&first));

        let src = DependencySource::new(&root, path("address.city"), String::new());
        assert_eq!(src.value(), "Oslo");
        assert_eq!(src.observed_segments(), 2);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = src.subscribe(move |v: &String| s.borrow_mut().push(v.clone()));

        let second = Rc::new(PropertyBag::new());
        second.set("city", "Bergen".to_owned());
        root.set_object("address", Rc::clone(&second));
        assert_eq!(src.value(), "Bergen");

        // The old object is no longer observed.
        first.set("city", "Trondheim".to_owned());
        assert_eq!(src.value(), "Bergen");

        second.set("city", "Tromsø".to_owned());
        assert_eq!(src.value(), "Tromsø");
        assert_eq!(*seen.borrow(), vec!["Bergen", "Tromsø"]);
    }

    #[test]
    fn intermediate_removed_then_restored() {
        let root = Rc::new(PropertyBag::new());
        let child = Rc::new(PropertyBag::new());
        child.set("v", 1_u32);
        root.set_object("child", Rc::clone(&child));
        let src = DependencySource::new(&root, path("child.v"), 0_u32);
        assert_eq!(src.value(), 1);

        root.remove("child");
        assert_eq!(src.value(), 0);
        assert!(!src.is_resolved());
        assert_eq!(src.observed_segments(), 1);

        root.set_object("child", child);
        assert_eq!(src.value(), 1);
    }

    #[test]
    fn scalar_in_the_middle_uses_fallback() {
        let root = Rc::new(PropertyBag::new());
        root.set("child", 3_i32);
        let src = DependencySource::new(&root, path("child.v"), 7_i32);
        assert_eq!(src.value(), 7);
    }

    #[test]
    fn dropped_owner_uses_fallback() {
        let root = Rc::new(PropertyBag::new());
        root.set("n", 1_i32);
        let src = DependencySource::new(&root, path("n"), 42_i32);
        drop(root);
        assert_eq!(src.value(), 1);
        // A later resolution sees the owner gone.
        SourceInner::refresh(&src.inner);
        assert_eq!(src.value(), 42);
        assert_eq!(src.observed_segments(), 0);
    }

    #[test]
    fn source_does_not_keep_owner_alive() {
        let root = Rc::new(PropertyBag::new());
        let _src = DependencySource::new(&root, path("n"), 0_i32);
        assert_eq!(Rc::strong_count(&root), 1);
        assert_eq!(Rc::weak_count(&root), 1);
    }

    #[test]
    fn dropping_source_releases_observations() {
        let root = Rc::new(PropertyBag::new());
        let src = DependencySource::new(&root, path("n"), 0_i32);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = src.subscribe(move |_| h.set(h.get() + 1));
        root.set("n", 1_i32);
        assert_eq!(hits.get(), 1);
        drop(src);
        root.set("n", 2_i32);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn watch_delivers_once_on_attach() {
        let root = Rc::new(PropertyBag::new());
        let src = DependencySource::new(&root, path("n"), 0_i32);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _link = src.watch(Rc::new(move || h.set(h.get() + 1)));
        assert_eq!(hits.get(), 1);
        root.set("n", 3_i32);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    #[should_panic(expected = "does not hold")]
    fn leaf_type_mismatch_panics() {
        let root = Rc::new(PropertyBag::new());
        root.set("n", "text".to_owned());
        let _src = DependencySource::new(&root, path("n"), 0_i32);
    }
}
