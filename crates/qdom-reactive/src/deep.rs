#![forbid(unsafe_code)]

//! Observable structured values with in-place mutation.
//!
//! [`DeepObservable<T>`] holds a structure (a map, a list, a record) that is
//! mutated in place through a write guard rather than replaced. Any mutable
//! access through [`DeepObservable::write`] marks the value dirty; the
//! notification goes out when the guard drops.
//!
//! # Delivery
//!
//! - [`NotifyMode::Coalesced`] (default): the first dirty mark in a tick
//!   schedules one notification on the [`Scheduler`]; further mutations
//!   before the flush ride along. Subscribers see one call per flush, with
//!   the final structure.
//! - [`NotifyMode::Immediate`]: each write guard notifies when it drops.
//!
//! In both modes one guard is one mutation: pushing into a list changes its
//! length and its entries, and still produces a single notification.
//!
//! # Invariants
//!
//! 1. Shared-only access through a guard (`Deref` without `DerefMut`) does
//!    not mark the value dirty.
//! 2. `set(v)` replaces the whole structure and notifies exactly once;
//!    subscribers are kept.
//! 3. A coalesced notification that the scheduler discards (see
//!    [`Scheduler::clear`]) does not block later ones.
//! 4. Subscribers receive a snapshot, so they may write to the same deep
//!    observable. Such writes are delivered after the current pass
//!    (immediate mode) or on the next flush pass (coalesced mode).

use std::cell::{Cell, RefCell, RefMut};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::{Rc, Weak};

use qdom_core::NotifyMode;

use crate::Source;
use crate::scheduler::Scheduler;
use crate::subscription::Subscription;
use crate::tracking::{self, Dependency};

struct DeepSlot<T> {
    id: u64,
    active: Cell<bool>,
    callback: Box<dyn Fn(&T)>,
}

struct DeepInner<T> {
    value: RefCell<T>,
    subscribers: RefCell<Vec<Rc<DeepSlot<T>>>>,
    next_id: Cell<u64>,
    version: Cell<u64>,
    notifications: Cell<u64>,
    mode: NotifyMode,
    scheduler: Scheduler,
    /// A coalesced notification is queued on the scheduler.
    scheduled: Cell<bool>,
    /// An immediate notification pass is running.
    notifying: Cell<bool>,
    /// Another pass was requested while one was running.
    rerun: Cell<bool>,
}

/// Observable structure with in-place mutation and coalesced notification.
///
/// Cloning shares state, like [`Observable`](crate::Observable).
pub struct DeepObservable<T> {
    inner: Rc<DeepInner<T>>,
}

impl<T> Clone for DeepObservable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DeepObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepObservable")
            .field("value", &self.inner.value)
            .field("version", &self.inner.version.get())
            .field("mode", &self.inner.mode)
            .field("scheduled", &self.inner.scheduled.get())
            .finish()
    }
}

impl<T: Clone + 'static> DeepObservable<T> {
    /// Create a deep observable using the thread's current config and
    /// scheduler.
    #[must_use]
    pub fn new(value: T) -> Self {
        let mode = qdom_core::config::current().deep_notify;
        Self::with_scheduler(value, mode, Scheduler::current())
    }

    /// Create a deep observable with an explicit delivery mode.
    #[must_use]
    pub fn with_mode(value: T, mode: NotifyMode) -> Self {
        Self::with_scheduler(value, mode, Scheduler::current())
    }

    /// Create a deep observable bound to a specific scheduler.
    #[must_use]
    pub fn with_scheduler(value: T, mode: NotifyMode, scheduler: Scheduler) -> Self {
        Self {
            inner: Rc::new(DeepInner {
                value: RefCell::new(value),
                subscribers: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                version: Cell::new(0),
                notifications: Cell::new(0),
                mode,
                scheduler,
                scheduled: Cell::new(false),
                notifying: Cell::new(false),
                rerun: Cell::new(false),
            }),
        }
    }

    /// Clone of the current structure (tracked inside effects).
    #[must_use]
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.borrow().clone()
    }

    /// Borrow the current structure (tracked inside effects).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Live write access. Mutating through the guard marks the value dirty
    /// when the guard drops.
    ///
    /// # Panics
    ///
    /// Panics if another guard or a `with` borrow is alive.
    pub fn write(&self) -> DeepWriteGuard<'_, T> {
        DeepWriteGuard {
            owner: self,
            value: Some(self.inner.value.borrow_mut()),
            touched: false,
        }
    }

    /// Mutate through a closure; one notification regardless of how many
    /// fields change.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.write();
        f(&mut guard)
    }

    /// Replace the whole structure. The previous structure is dropped;
    /// subscribers are kept and notified once.
    pub fn set(&self, value: T) {
        let previous = std::mem::replace(&mut *self.inner.value.borrow_mut(), value);
        drop(previous);
        self.mark_dirty();
    }

    /// Record a mutation made without a guard (for example through interior
    /// mutability inside `T`).
    pub fn mark_dirty(&self) {
        let inner = &self.inner;
        inner.version.set(inner.version.get() + 1);
        match inner.mode {
            NotifyMode::Immediate => notify(inner),
            NotifyMode::Coalesced => {
                if inner.scheduled.replace(true) {
                    return;
                }
                let mut pending = PendingFlush(Some(Rc::downgrade(inner)));
                inner.scheduler.schedule(move || {
                    if let Some(inner) = pending.0.take().and_then(|weak| weak.upgrade()) {
                        inner.scheduled.set(false);
                        notify(&inner);
                    }
                });
            }
        }
    }

    /// Subscribe to changes. The callback receives the structure after the
    /// mutation(s).
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        let slot = Rc::new(DeepSlot {
            id,
            active: Cell::new(true),
            callback: Box::new(callback),
        });
        self.inner.subscribers.borrow_mut().push(Rc::clone(&slot));
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            slot.active.set(false);
            if let Some(shared) = weak.upgrade()
                && let Ok(mut subs) = shared.subscribers.try_borrow_mut()
            {
                subs.retain(|s| s.id != slot.id);
            }
        })
    }

    /// Number of mutations recorded.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Number of notification passes delivered so far.
    #[must_use]
    pub fn notification_count(&self) -> u64 {
        self.inner.notifications.get()
    }

    /// Whether a coalesced notification is waiting for a flush.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.scheduled.get()
    }

    #[must_use]
    pub fn mode(&self) -> NotifyMode {
        self.inner.mode
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .borrow()
            .iter()
            .filter(|s| s.active.get())
            .count()
    }

    fn key(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    fn track(&self) {
        tracking::record_with(self.key(), || Rc::new(self.clone()) as Rc<dyn Dependency>);
    }
}

fn notify<T: Clone + 'static>(inner: &Rc<DeepInner<T>>) {
    if inner.notifying.replace(true) {
        inner.rerun.set(true);
        return;
    }
    let _guard = NotifyGuard(inner.as_ref());
    loop {
        inner.rerun.set(false);
        let snapshot = inner.value.borrow().clone();
        let slots: Vec<Rc<DeepSlot<T>>> = {
            let mut subs = inner.subscribers.borrow_mut();
            subs.retain(|s| s.active.get());
            subs.clone()
        };
        inner.notifications.set(inner.notifications.get() + 1);
        for slot in &slots {
            if slot.active.get() {
                (slot.callback)(&snapshot);
            }
        }
        if !inner.rerun.get() {
            break;
        }
    }
}

/// A queued coalesced flush. If the scheduler drops the task without
/// running it, the observable is released so the next mutation schedules
/// again.
struct PendingFlush<T>(Option<Weak<DeepInner<T>>>);

impl<T> Drop for PendingFlush<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.0.take().and_then(|weak| weak.upgrade()) {
            inner.scheduled.set(false);
        }
    }
}

struct NotifyGuard<'a, T>(&'a DeepInner<T>);

impl<T> Drop for NotifyGuard<'_, T> {
    fn drop(&mut self) {
        self.0.notifying.set(false);
        self.0.rerun.set(false);
    }
}

/// Write access to a [`DeepObservable`]'s structure.
pub struct DeepWriteGuard<'a, T: Clone + 'static> {
    owner: &'a DeepObservable<T>,
    value: Option<RefMut<'a, T>>,
    touched: bool,
}

impl<T: Clone + 'static> Deref for DeepWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("write guard used after release"),
        }
    }
}

impl<T: Clone + 'static> DerefMut for DeepWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.touched = true;
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("write guard used after release"),
        }
    }
}

impl<T: Clone + 'static> Drop for DeepWriteGuard<'_, T> {
    fn drop(&mut self) {
        // Release the borrow first so subscribers can read the value.
        self.value.take();
        if self.touched {
            self.owner.mark_dirty();
        }
    }
}

impl<T: Clone + 'static> Dependency for DeepObservable<T> {
    fn key(&self) -> usize {
        DeepObservable::key(self)
    }

    fn on_change(&self, on_change: Rc<dyn Fn()>) -> Subscription {
        self.subscribe(move |_| on_change())
    }
}

impl<T: Clone + 'static> Source<T> for DeepObservable<T> {
    fn get(&self) -> T {
        DeepObservable::get(self)
    }

    fn observe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn counting<T: Clone + 'static>(
        deep: &DeepObservable<T>,
    ) -> (Rc<RefCell<Vec<T>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = deep.subscribe(move |v| sink.borrow_mut().push(v.clone()));
        (seen, sub)
    }

    #[test]
    fn field_write_notifies_once_with_updated_structure() {
        let sched = Scheduler::new();
        let deep = DeepObservable::with_scheduler(
            json!({"field": "X", "n": 1}),
            NotifyMode::Coalesced,
            sched.clone(),
        );
        let (seen, _sub) = counting(&deep);

        deep.write()["field"] = json!("Y");
        assert!(seen.borrow().is_empty());
        assert!(deep.is_pending());

        sched.flush();
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0]["field"], "Y");
    }

    #[test]
    fn several_writes_in_one_tick_coalesce() {
        let sched = Scheduler::new();
        let deep =
            DeepObservable::with_scheduler(json!({"a": 0, "b": 0}), NotifyMode::Coalesced, sched.clone());
        let (seen, _sub) = counting(&deep);

        deep.write()["a"] = json!(1);
        deep.write()["b"] = json!(2);
        deep.update(|v| v["a"] = json!(3));
        assert_eq!(sched.pending(), 1);

        sched.flush();
        assert_eq!(*seen.borrow(), vec![json!({"a": 3, "b": 2})]);
        assert_eq!(deep.version(), 3);
        assert_eq!(deep.notification_count(), 1);
    }

    #[test]
    fn immediate_mode_notifies_per_guard() {
        let deep = DeepObservable::with_mode(vec![1, 2], NotifyMode::Immediate);
        let (seen, _sub) = counting(&deep);

        deep.write().push(3);
        deep.write().push(4);
        assert_eq!(*seen.borrow(), vec![vec![1, 2, 3], vec![1, 2, 3, 4]]);
    }

    #[test]
    fn length_change_is_one_notification() {
        let deep = DeepObservable::with_mode(vec![1, 2, 3], NotifyMode::Immediate);
        let (seen, _sub) = counting(&deep);

        {
            let mut list = deep.write();
            list.push(4);
            list.truncate(2);
        }
        assert_eq!(*seen.borrow(), vec![vec![1, 2]]);
    }

    #[test]
    fn read_only_guard_does_not_notify() {
        let deep = DeepObservable::with_mode(json!([1]), NotifyMode::Immediate);
        let (seen, _sub) = counting(&deep);

        let len = deep.write().as_array().map_or(0, Vec::len);
        assert_eq!(len, 1);
        assert!(seen.borrow().is_empty());
        assert_eq!(deep.version(), 0);
    }

    #[test]
    fn set_replaces_wholesale_and_keeps_subscribers() {
        let sched = Scheduler::new();
        let deep = DeepObservable::with_scheduler(
            json!({"old": 1, "stale": [1, 2]}),
            NotifyMode::Coalesced,
            sched.clone(),
        );
        let (seen, _sub) = counting(&deep);

        deep.set(json!({"fresh": true}));
        sched.flush();

        let expected: Value = json!({"fresh": true});
        assert_eq!(*seen.borrow(), vec![expected.clone()]);
        assert_eq!(deep.get(), expected);
        assert_eq!(deep.subscriber_count(), 1);
    }

    #[test]
    fn unsubscribe_before_flush_suppresses_delivery() {
        let sched = Scheduler::new();
        let deep = DeepObservable::with_scheduler(vec![0], NotifyMode::Coalesced, sched.clone());
        let (seen, sub) = counting(&deep);

        deep.write()[0] = 1;
        sub.unsubscribe();
        sched.flush();
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn subscriber_write_in_immediate_mode_reruns_pass() {
        let deep = DeepObservable::with_mode(vec![0u32], NotifyMode::Immediate);
        let d = deep.clone();
        let _clamp = deep.subscribe(move |v| {
            if v[0] > 10 {
                d.write()[0] = 10;
            }
        });
        let (seen, _sub) = counting(&deep);

        deep.write()[0] = 50;
        assert_eq!(deep.get(), vec![10]);
        assert_eq!(seen.borrow().last(), Some(&vec![10]));
    }

    #[test]
    fn subscriber_write_in_coalesced_mode_lands_in_same_flush() {
        let sched = Scheduler::new();
        let deep = DeepObservable::with_scheduler(vec![0u32], NotifyMode::Coalesced, sched.clone());
        let d = deep.clone();
        let _double = deep.subscribe(move |v| {
            if v[0] == 1 {
                d.write()[0] = 2;
            }
        });
        let (seen, _sub) = counting(&deep);

        deep.write()[0] = 1;
        assert_eq!(sched.flush(), 2);
        assert_eq!(*seen.borrow(), vec![vec![1], vec![2]]);
    }

    #[test]
    fn dropped_observable_cancels_pending_task() {
        let sched = Scheduler::new();
        let deep = DeepObservable::with_scheduler(vec![0], NotifyMode::Coalesced, sched.clone());
        deep.write()[0] = 1;
        drop(deep);
        assert_eq!(sched.flush(), 1);
    }

    #[test]
    fn cleared_scheduler_does_not_wedge_notifications() {
        let sched = Scheduler::new();
        let deep = DeepObservable::with_scheduler(vec![0], NotifyMode::Coalesced, sched.clone());
        let (seen, _sub) = counting(&deep);

        deep.write()[0] = 1;
        assert_eq!(sched.clear(), 1);
        assert!(!deep.is_pending());

        deep.write()[0] = 2;
        assert!(deep.is_pending());
        assert_eq!(sched.flush(), 1);
        assert_eq!(*seen.borrow(), vec![vec![2]]);
        assert!(!deep.is_pending());
    }
}
