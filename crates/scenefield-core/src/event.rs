#![forbid(unsafe_code)]

//! Event stamps and change subscriptions.
//!
//! Every propagation pass is tagged with a fresh [`EventStamp`] from a
//! thread-local logical clock. A field accepts at most one event per stamp,
//! which is what makes fan-in and cyclic routes terminate.
//!
//! Subscribers are stored as `Weak` callbacks; the strong reference lives in
//! the returned [`Subscription`], so dropping the guard unsubscribes. Dead
//! entries are pruned lazily during notification.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::field::FieldId;

thread_local! {
    static CLOCK: Cell<u64> = const { Cell::new(0) };
}

/// Logical time of a propagation pass. Strictly increasing per thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventStamp(u64);

impl EventStamp {
    /// The stamp every field starts with; older than any pass.
    pub const ZERO: Self = Self(0);

    /// Advance the clock and return the new stamp.
    #[must_use]
    pub fn next() -> Self {
        CLOCK.with(|clock| {
            let stamp = clock.get() + 1;
            clock.set(stamp);
            Self(stamp)
        })
    }

    /// The most recently issued stamp on this thread.
    #[must_use]
    pub fn current() -> Self {
        CLOCK.with(|clock| Self(clock.get()))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A change notification: which field emitted it and in which pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub source: FieldId,
    pub stamp: EventStamp,
}

impl Event {
    #[must_use]
    pub const fn new(source: FieldId, stamp: EventStamp) -> Self {
        Self { source, stamp }
    }
}

/// RAII guard for a subscriber callback. Dropping it unsubscribes.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    _guard: Box<dyn Any>,
}

impl Subscription {
    fn new(guard: Box<dyn Any>) -> Self {
        Self { _guard: guard }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

type Callback<A> = dyn Fn(&A);

/// Ordered list of weak subscriber callbacks.
pub(crate) struct Subscribers<A: ?Sized + 'static> {
    entries: RefCell<Vec<Weak<Callback<A>>>>,
}

impl<A: ?Sized + 'static> Default for Subscribers<A> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }
}

impl<A: ?Sized + 'static> Subscribers<A> {
    pub(crate) fn subscribe(&self, callback: impl Fn(&A) + 'static) -> Subscription {
        let strong: Rc<Callback<A>> = Rc::new(callback);
        self.entries.borrow_mut().push(Rc::downgrade(&strong));
        Subscription::new(Box::new(strong))
    }

    /// Call live subscribers in registration order.
    ///
    /// The list is snapshotted first so callbacks may subscribe, unsubscribe
    /// or trigger further notifications.
    pub(crate) fn notify(&self, value: &A) {
        let live: Vec<Rc<Callback<A>>> = {
            let mut entries = self.entries.borrow_mut();
            if entries.is_empty() {
                return;
            }
            entries.retain(|w| w.strong_count() > 0);
            entries.iter().filter_map(Weak::upgrade).collect()
        };
        for callback in live {
            callback(value);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_increase() {
        let a = EventStamp::next();
        let b = EventStamp::next();
        assert!(b > a);
        assert_eq!(EventStamp::current(), b);
        assert!(EventStamp::ZERO < a);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let subs: Subscribers<i32> = Subscribers::default();
        let seen = Rc::new(Cell::new(0));
        let seen2 = Rc::clone(&seen);
        let sub = subs.subscribe(move |v| seen2.set(seen2.get() + v));
        subs.notify(&2);
        assert_eq!(seen.get(), 2);
        assert_eq!(subs.len(), 1);
        drop(sub);
        subs.notify(&5);
        assert_eq!(seen.get(), 2);
        assert_eq!(subs.len(), 0);
    }

    #[test]
    fn notification_order_is_registration_order() {
        let subs: Subscribers<()> = Subscribers::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = Rc::clone(&log);
        let l2 = Rc::clone(&log);
        let _a = subs.subscribe(move |()| l1.borrow_mut().push("a"));
        let _b = subs.subscribe(move |()| l2.borrow_mut().push("b"));
        subs.notify(&());
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn callback_may_subscribe_during_notify() {
        let subs: Rc<Subscribers<()>> = Rc::new(Subscribers::default());
        let held = Rc::new(RefCell::new(Vec::new()));
        let subs2 = Rc::clone(&subs);
        let held2 = Rc::clone(&held);
        let _outer = subs.subscribe(move |()| {
            held2.borrow_mut().push(subs2.subscribe(|()| {}));
        });
        subs.notify(&());
        assert_eq!(subs.len(), 2);
    }
}
