#![forbid(unsafe_code)]

//! Change-notification registry.
//!
//! Listeners are notified in registration order. Removal is by identity:
//! each registration gets a monotonically allocated id, and the returned
//! [`Subscription`] guard removes exactly that registration — on drop, or
//! explicitly via [`unsubscribe`](Subscription::unsubscribe), which is
//! idempotent. Notification iterates a clone of the listener list, so a
//! listener may subscribe, unsubscribe, or dispatch actions reentrantly.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use strata_value::Snapshot;

pub(crate) type Listener = Rc<dyn Fn(&Snapshot)>;

#[derive(Default)]
pub(crate) struct SubscriberSet {
    entries: RefCell<Vec<(u64, Listener)>>,
    next_id: Cell<u64>,
}

impl SubscriberSet {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub(crate) fn add(set: &Rc<Self>, listener: Listener) -> Subscription {
        let id = set.next_id.get();
        set.next_id.set(id + 1);
        set.entries.borrow_mut().push((id, listener));
        Subscription {
            id,
            set: Rc::downgrade(set),
        }
    }

    pub(crate) fn remove(&self, id: u64) {
        self.entries.borrow_mut().retain(|(entry, _)| *entry != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub(crate) fn notify(&self, snapshot: &Snapshot) {
        let listeners: Vec<Listener> = self
            .entries
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

/// Guard for one listener registration.
///
/// Dropping the guard removes the listener; keep it alive for as long as
/// notifications are wanted.
pub struct Subscription {
    id: u64,
    set: Weak<SubscriberSet>,
}

impl Subscription {
    /// Remove the listener this guard registered. Calling this more than
    /// once (or after the store is gone) is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(set) = self.set.upgrade() {
            set.remove(self.id);
        }
    }

    /// The registration id, for diagnostics.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
