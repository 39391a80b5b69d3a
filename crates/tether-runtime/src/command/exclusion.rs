#![forbid(unsafe_code)]

//! Mutual exclusion between commands.
//!
//! While any member of an [`ExclusionGroup`] is executing, every other
//! member reports `can_execute() == false`. Membership is held weakly: a
//! dropped command simply stops counting.
//!
//! A command is in at most one group. Assigning it to a new group removes
//! it from its previous one.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use super::CommandId;
use crate::error::ConfigError;

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);

/// A command as seen by its exclusion group.
pub trait GroupMember {
    fn command_id(&self) -> CommandId;

    fn name(&self) -> &str;

    fn is_executing(&self) -> bool;

    fn allows_concurrent_execution(&self) -> bool;

    /// Fire this member's enablement-changed notification.
    fn raise_can_execute_changed(&self);

    fn exclusion_group(&self) -> Option<ExclusionGroup>;

    #[doc(hidden)]
    fn attach_group(&self, group: Option<ExclusionGroup>);
}

struct GroupInner {
    id: u64,
    members: RefCell<Vec<Weak<dyn GroupMember>>>,
}

/// A set of commands of which at most one executes at a time.
#[derive(Clone)]
pub struct ExclusionGroup {
    inner: Rc<GroupInner>,
}

impl fmt::Debug for ExclusionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusionGroup")
            .field("id", &self.inner.id)
            .field("members", &self.member_ids())
            .finish()
    }
}

impl ExclusionGroup {
    fn new(members: Vec<Weak<dyn GroupMember>>) -> Self {
        Self {
            inner: Rc::new(GroupInner {
                id: NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed),
                members: RefCell::new(members),
            }),
        }
    }

    fn live(&self) -> Vec<Rc<dyn GroupMember>> {
        self.inner
            .members
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Live members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn member_ids(&self) -> Vec<CommandId> {
        self.live().iter().map(|m| m.command_id()).collect()
    }

    #[must_use]
    pub fn contains(&self, command: CommandId) -> bool {
        self.live().iter().any(|m| m.command_id() == command)
    }

    #[must_use]
    pub fn any_executing(&self) -> bool {
        self.live().iter().any(|m| m.is_executing())
    }

    /// Whether a member other than `command` is executing.
    #[must_use]
    pub fn any_other_executing(&self, command: CommandId) -> bool {
        self.live()
            .iter()
            .any(|m| m.command_id() != command && m.is_executing())
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Notify every member except `command`.
    pub(crate) fn raise_others(&self, command: CommandId) {
        for member in self.live() {
            if member.command_id() != command {
                member.raise_can_execute_changed();
            }
        }
    }

    fn remove(&self, command: CommandId) {
        self.inner.members.borrow_mut().retain(|weak| {
            weak.upgrade()
                .is_some_and(|member| member.command_id() != command)
        });
    }
}

fn dedupe(members: &[Rc<dyn GroupMember>]) -> Vec<Rc<dyn GroupMember>> {
    let mut unique: Vec<Rc<dyn GroupMember>> = Vec::with_capacity(members.len());
    for member in members {
        if !unique.iter().any(|m| m.command_id() == member.command_id()) {
            unique.push(Rc::clone(member));
        }
    }
    unique
}

/// Put `members` into a new exclusion group.
///
/// Fails without changing anything if a member allows concurrent execution.
/// Members leave their previous groups. Every member (old group-mates
/// included) is notified that its enablement may have changed.
pub fn set_mutually_exclusive(
    members: &[Rc<dyn GroupMember>],
) -> Result<ExclusionGroup, ConfigError> {
    if let Some(member) = members.iter().find(|m| m.allows_concurrent_execution()) {
        return Err(ConfigError::GroupedConcurrent {
            command: member.name().to_owned(),
        });
    }

    let members = dedupe(members);
    let mut previous: Vec<ExclusionGroup> = Vec::new();
    for member in &members {
        if let Some(old) = member.exclusion_group() {
            old.remove(member.command_id());
            if !previous.iter().any(|g| g.ptr_eq(&old)) {
                previous.push(old);
            }
        }
    }

    let group = ExclusionGroup::new(members.iter().map(Rc::downgrade).collect());
    for member in &members {
        member.attach_group(Some(group.clone()));
    }
    debug!(
        message = "command.group_assigned",
        group_id = group.id(),
        members = members.len()
    );

    for old in &previous {
        for member in old.live() {
            member.raise_can_execute_changed();
        }
    }
    for member in &members {
        member.raise_can_execute_changed();
    }
    Ok(group)
}

/// Remove `members` from whatever group they are in.
pub fn clear_mutual_exclusion(members: &[Rc<dyn GroupMember>]) {
    for member in dedupe(members) {
        let Some(group) = member.exclusion_group() else {
            continue;
        };
        group.remove(member.command_id());
        member.attach_group(None);
        member.raise_can_execute_changed();
        for other in group.live() {
            other.raise_can_execute_changed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Fake {
        id: CommandId,
        executing: Cell<bool>,
        concurrent: bool,
        raised: Cell<u32>,
        group: RefCell<Option<ExclusionGroup>>,
    }

    impl Fake {
        fn new(concurrent: bool) -> Rc<Self> {
            Rc::new(Self {
                id: CommandId::next(),
                executing: Cell::new(false),
                concurrent,
                raised: Cell::new(0),
                group: RefCell::new(None),
            })
        }
    }

    impl GroupMember for Fake {
        fn command_id(&self) -> CommandId {
            self.id
        }
        fn name(&self) -> &str {
            "fake"
        }
        fn is_executing(&self) -> bool {
            self.executing.get()
        }
        fn allows_concurrent_execution(&self) -> bool {
            self.concurrent
        }
        fn raise_can_execute_changed(&self) {
            self.raised.set(self.raised.get() + 1);
        }
        fn exclusion_group(&self) -> Option<ExclusionGroup> {
            self.group.borrow().clone()
        }
        fn attach_group(&self, group: Option<ExclusionGroup>) {
            *self.group.borrow_mut() = group;
        }
    }

    fn members(fakes: &[&Rc<Fake>]) -> Vec<Rc<dyn GroupMember>> {
        fakes
            .iter()
            .map(|f| Rc::clone(*f) as Rc<dyn GroupMember>)
            .collect()
    }

    #[test]
    fn other_executing_is_seen() {
        let (a, b) = (Fake::new(false), Fake::new(false));
        let group = set_mutually_exclusive(&members(&[&a, &b])).unwrap();
        assert_eq!(group.len(), 2);
        assert!(!group.any_executing());

        a.executing.set(true);
        assert!(group.any_executing());
        assert!(group.any_other_executing(b.id));
        assert!(!group.any_other_executing(a.id));
    }

    #[test]
    fn concurrent_member_rejected_atomically() {
        let (a, b) = (Fake::new(false), Fake::new(true));
        let err = set_mutually_exclusive(&members(&[&a, &b])).unwrap_err();
        assert!(matches!(err, ConfigError::GroupedConcurrent { .. }));
        assert!(a.exclusion_group().is_none());
        assert_eq!(a.raised.get(), 0);
    }

    #[test]
    fn duplicates_are_collapsed() {
        let a = Fake::new(false);
        let group = set_mutually_exclusive(&members(&[&a, &a])).unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(a.raised.get(), 1);
    }

    #[test]
    fn reassignment_leaves_old_group() {
        let (a, b, c) = (Fake::new(false), Fake::new(false), Fake::new(false));
        let first = set_mutually_exclusive(&members(&[&a, &b])).unwrap();
        let second = set_mutually_exclusive(&members(&[&b, &c])).unwrap();
        assert!(!first.contains(b.id));
        assert!(first.contains(a.id));
        assert!(second.contains(b.id));
        assert!(b.exclusion_group().unwrap().ptr_eq(&second));
        // a was notified when b left.
        assert_eq!(a.raised.get(), 2);
    }

    #[test]
    fn dropped_members_stop_counting() {
        let (a, b) = (Fake::new(false), Fake::new(false));
        let group = set_mutually_exclusive(&members(&[&a, &b])).unwrap();
        b.executing.set(true);
        drop(b);
        assert_eq!(group.len(), 1);
        assert!(!group.any_other_executing(a.id));
    }

    #[test]
    fn clear_detaches_and_notifies() {
        let (a, b) = (Fake::new(false), Fake::new(false));
        let group = set_mutually_exclusive(&members(&[&a, &b])).unwrap();
        clear_mutual_exclusion(&members(&[&a]));
        assert!(a.exclusion_group().is_none());
        assert_eq!(group.member_ids(), vec![b.id]);
        assert_eq!(a.raised.get(), 2);
        assert_eq!(b.raised.get(), 2);
    }
}
