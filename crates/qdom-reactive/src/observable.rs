#![forbid(unsafe_code)]

//! Single-value observables with queue-and-drain change delivery.
//!
//! An [`Observable<T>`] is a cloneable handle to one shared cell. `set()`
//! stores the new value at once, pushes a `(new, old)` pair onto the cell's
//! delivery queue, and, unless a delivery is already under way, drains that
//! queue: each pair goes to every live subscriber, oldest subscriber first.
//!
//! # Equality
//!
//! A `set()` is dropped when the new value `==` the current one. This is
//! `PartialEq`, so containers compare by content: setting an
//! `Observable<Vec<i32>>` to a freshly built but equal vector notifies
//! nobody. Wrap the value in [`ByRef`] to notify on every new allocation
//! instead.
//!
//! # Re-entrancy
//!
//! A subscriber may call `set()` on the observable that is notifying it.
//! The value changes immediately; the matching pair joins the queue and is
//! delivered after the current pair has reached every subscriber. No
//! subscriber ever sees two changes interleaved.
//!
//! | Call          | Cost                                  |
//! |---------------|---------------------------------------|
//! | `get()`       | one borrow and a clone of `T`         |
//! | `set()`       | one `==`, then S calls per queued pair |
//! | `subscribe()` | push onto the slot list               |
//! | unsubscribe   | linear scan of the slot list          |
//!
//! # Failure Modes
//!
//! - **Runaway cycle**: subscribers that keep setting new values would drain
//!   forever. After [`ReactiveConfig::max_drain`](qdom_core::ReactiveConfig)
//!   deliveries in one drain the remaining queue is dropped and an error is
//!   logged.
//! - **Re-entrant update**: touching the same observable from inside the
//!   closure passed to `update()` panics on the `RefCell` borrow.
//! - **Panicking subscriber**: the panic propagates; the queue is cleared so
//!   the observable stays usable.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use crate::subscription::Subscription;
use crate::tracking::{self, Dependency};
use crate::Source;

/// One registered subscriber.
struct Slot<T> {
    id: u64,
    active: Cell<bool>,
    callback: Box<dyn Fn(&T, &T)>,
}

/// Shared interior for [`Observable<T>`].
struct ObservableInner<T> {
    value: T,
    version: u64,
    next_id: u64,
    subscribers: Vec<Rc<Slot<T>>>,
    /// Queued `(new, old)` pairs awaiting delivery.
    pending: VecDeque<(T, T)>,
    draining: bool,
}

/// Shared value cell; the module docs describe delivery order.
///
/// Clones are handles to one cell. A `set` through any of them is seen by
/// the subscribers of all of them.
///
/// # Invariants
///
/// 1. Every queued pair bumps `version` once; an equal value queues nothing.
/// 2. Pairs are delivered in the order they were queued, each to every
///    subscriber (oldest first) before the next pair starts.
/// 3. An unsubscribed callback is never invoked again, even if it was
///    removed in the middle of a notification pass.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("Observable")
                .field("value", &inner.value)
                .field("version", &inner.version)
                .field("queued", &inner.pending.len())
                .field("draining", &inner.draining)
                .finish(),
            Err(_) => f.debug_struct("Observable").finish_non_exhaustive(),
        }
    }
}

impl<T: Default + Clone + PartialEq + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create a new observable with the given initial value.
    ///
    /// The initial version is 0 and no subscribers are registered.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                next_id: 0,
                subscribers: Vec::new(),
                pending: VecDeque::new(),
                draining: false,
            })),
        }
    }

    /// Get a clone of the current value.
    ///
    /// Inside an effect body this also records the observable as a
    /// dependency.
    #[must_use]
    pub fn get(&self) -> T {
        self.track();
        self.inner.borrow().value.clone()
    }

    /// Get a clone of the current value without recording a dependency.
    #[must_use]
    pub fn get_untracked(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.borrow().value)
    }

    /// Set a new value. If it differs from the current value (by
    /// `PartialEq`), the version is incremented and every subscriber is
    /// called with `(new, old)`.
    pub fn set(&self, value: T) {
        let start = {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return;
            }
            let old = std::mem::replace(&mut inner.value, value.clone());
            inner.version += 1;
            inner.pending.push_back((value, old));
            !inner.draining
        };
        if start {
            self.drain();
        }
    }

    /// Modify the value in place via a closure. If the value changes
    /// (compared by `PartialEq` against a snapshot), the version is
    /// incremented and subscribers are notified.
    ///
    /// # Panics
    ///
    /// Panics if `f` accesses this observable.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let start = {
            let mut inner = self.inner.borrow_mut();
            let old = inner.value.clone();
            f(&mut inner.value);
            if inner.value == old {
                return;
            }
            inner.version += 1;
            let new = inner.value.clone();
            inner.pending.push_back((new, old));
            !inner.draining
        };
        if start {
            self.drain();
        }
    }

    /// Subscribe to value changes. The callback receives `(new, old)`.
    ///
    /// Returns a [`Subscription`]; unsubscribing (or dropping every clone of
    /// it) removes the callback from the subscriber list.
    pub fn subscribe(&self, callback: impl Fn(&T, &T) + 'static) -> Subscription {
        let slot = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            let slot = Rc::new(Slot {
                id,
                active: Cell::new(true),
                callback: Box::new(callback),
            });
            inner.subscribers.push(Rc::clone(&slot));
            slot
        };
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            slot.active.set(false);
            if let Some(shared) = weak.upgrade()
                && let Ok(mut inner) = shared.try_borrow_mut()
            {
                inner.subscribers.retain(|s| s.id != slot.id);
            }
        })
    }

    /// Current version number. Increments by 1 on each value-changing
    /// mutation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|s| s.active.get())
            .count()
    }

    /// Whether two handles share the same state.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn key(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    fn track(&self) {
        tracking::record_with(self.key(), || Rc::new(self.clone()) as Rc<dyn Dependency>);
    }

    /// Deliver queued changes until the queue is empty.
    fn drain(&self) {
        let max_drain = qdom_core::config::current().max_drain;
        let _guard = DrainGuard::enter(&self.inner);
        let mut delivered = 0usize;
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                let Some(change) = inner.pending.pop_front() else {
                    break;
                };
                if delivered >= max_drain {
                    let dropped = inner.pending.len() + 1;
                    inner.pending.clear();
                    tracing::error!(
                        max_drain,
                        dropped,
                        "observable notification cycle exceeded drain bound; dropping queued changes"
                    );
                    break;
                }
                inner.subscribers.retain(|s| s.active.get());
                (change, inner.subscribers.clone())
            };
            delivered += 1;
            let ((new, old), slots) = next;
            for slot in &slots {
                if slot.active.get() {
                    (slot.callback)(&new, &old);
                }
            }
        }
    }
}

/// Marks an observable as draining; clears the flag and any leftover queue
/// on exit, including unwinding out of a subscriber.
struct DrainGuard<'a, T> {
    inner: &'a RefCell<ObservableInner<T>>,
}

impl<'a, T> DrainGuard<'a, T> {
    fn enter(inner: &'a RefCell<ObservableInner<T>>) -> Self {
        inner.borrow_mut().draining = true;
        Self { inner }
    }
}

impl<T> Drop for DrainGuard<'_, T> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            inner.draining = false;
            inner.pending.clear();
        }
    }
}

impl<T: Clone + PartialEq + 'static> Dependency for Observable<T> {
    fn key(&self) -> usize {
        Observable::key(self)
    }

    fn on_change(&self, on_change: Rc<dyn Fn()>) -> Subscription {
        self.subscribe(move |_, _| on_change())
    }
}

impl<T: Clone + PartialEq + 'static> Source<T> for Observable<T> {
    fn get(&self) -> T {
        Observable::get(self)
    }

    fn observe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.subscribe(move |new, _| callback(new))
    }
}

/// Create an observable holding an optional value; `None` is the empty
/// sentinel.
#[must_use]
pub fn reactive_ref<T: Clone + PartialEq + 'static>(value: Option<T>) -> Observable<Option<T>> {
    Observable::new(value)
}

// ---------------------------------------------------------------------------
// ByRef
// ---------------------------------------------------------------------------

/// Shared value compared by identity rather than content.
///
/// `Observable<ByRef<T>>::set` only notifies when handed a different
/// allocation, even if its contents are equal.
pub struct ByRef<T: ?Sized>(pub Rc<T>);

impl<T> ByRef<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self(Rc::new(value))
    }
}

impl<T: ?Sized> Clone for ByRef<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: ?Sized> PartialEq for ByRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: ?Sized> Eq for ByRef<T> {}

impl<T: ?Sized> Deref for ByRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for ByRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ByRef").field(&&*self.0).finish()
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for ByRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl<T> From<T> for ByRef<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use qdom_core::{ReactiveConfig, with_config};

    fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<(T, T)>>>, impl Fn(&T, &T) + 'static) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        (log, move |new: &T, old: &T| {
            sink.borrow_mut().push((new.clone(), old.clone()))
        })
    }

    #[test]
    fn version_counts_real_changes_only() {
        let obs = Observable::new('a');
        obs.set('a');
        assert_eq!((obs.get(), obs.version()), ('a', 0));

        obs.set('b');
        obs.set('b');
        obs.set('c');
        assert_eq!((obs.get(), obs.version()), ('c', 2));
    }

    #[test]
    fn equal_vec_is_not_a_change() {
        let obs = Observable::new(vec![String::from("x")]);
        let (log, cb) = recorder();
        let _sub = obs.subscribe(cb);

        obs.set(vec![String::from("x")]);
        assert!(log.borrow().is_empty());
        assert_eq!(obs.version(), 0);
    }

    #[test]
    fn subscriber_receives_new_and_old() {
        let obs = Observable::new(0);
        let (log, cb) = recorder();
        let _sub = obs.subscribe(cb);

        obs.set(5);
        obs.set(5);
        assert_eq!(*log.borrow(), vec![(5, 0)]);
    }

    #[test]
    fn two_distinct_sets_notify_twice_in_order() {
        let obs = Observable::new("a".to_string());
        let (log, cb) = recorder();
        let _sub = obs.subscribe(cb);

        obs.set("b".into());
        obs.set("c".into());
        assert_eq!(
            *log.borrow(),
            vec![
                (String::from("b"), String::from("a")),
                (String::from("c"), String::from("b")),
            ]
        );
    }

    #[test]
    fn update_reports_snapshot_as_old() {
        let obs = Observable::new(String::from("todo"));
        let (log, cb) = recorder();
        let _sub = obs.subscribe(cb);

        obs.update(|s| s.push_str(": ship"));
        assert_eq!(
            *log.borrow(),
            vec![(String::from("todo: ship"), String::from("todo"))]
        );
    }

    #[test]
    fn update_that_restores_value_is_silent() {
        let obs = Observable::new(vec![1, 2]);
        obs.update(|v| {
            v.push(3);
            v.pop();
        });
        assert_eq!(obs.version(), 0);
    }

    #[test]
    fn with_borrows_without_cloning() {
        let obs = Observable::new(String::from("borrowed"));
        assert_eq!(obs.with(String::len), 8);
    }

    #[test]
    fn unsubscribe_twice_is_harmless() {
        let obs = Observable::new(0);
        let (log, cb) = recorder();
        let sub = obs.subscribe(cb);

        obs.set(1);
        sub.unsubscribe();
        sub.unsubscribe();
        obs.set(2);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(obs.subscriber_count(), 0);
    }

    #[test]
    fn subscription_drop_unsubscribes() {
        let obs = Observable::new(0);
        let (log, cb) = recorder();
        let sub = obs.subscribe(cb);
        drop(sub);
        obs.set(1);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn detached_subscription_persists() {
        let obs = Observable::new(0);
        let (log, cb) = recorder();
        obs.subscribe(cb).detach();
        obs.set(1);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn notification_order_is_registration_order() {
        let obs = Observable::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let subs: Vec<_> = ['A', 'B', 'C']
            .into_iter()
            .map(|tag| {
                let log = Rc::clone(&log);
                obs.subscribe(move |_, _| log.borrow_mut().push(tag))
            })
            .collect();

        obs.set(1);
        assert_eq!(*log.borrow(), vec!['A', 'B', 'C']);
        drop(subs);
    }

    #[test]
    fn unsubscribe_during_pass_skips_later_subscriber() {
        let obs = Observable::new(0);
        let hits = Rc::new(Cell::new(0u32));
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let v = Rc::clone(&victim);
        let _killer = obs.subscribe(move |_, _| {
            if let Some(sub) = v.borrow().as_ref() {
                sub.unsubscribe();
            }
        });
        let h = Rc::clone(&hits);
        *victim.borrow_mut() = Some(obs.subscribe(move |_, _| h.set(h.get() + 1)));

        obs.set(1);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn reentrant_set_is_queued_and_drained_in_order() {
        let obs = Observable::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let feedback = obs.clone();
        let _bump = obs.subscribe(move |new, _| {
            if *new == 1 {
                feedback.set(2);
            }
        });
        let l = Rc::clone(&log);
        let _logger = obs.subscribe(move |new, old| l.borrow_mut().push((*new, *old)));

        obs.set(1);
        // The logger sees 1 before 2 even though 2 was set mid-pass.
        assert_eq!(*log.borrow(), vec![(1, 0), (2, 1)]);
        assert_eq!(obs.get(), 2);
    }

    #[test]
    fn runaway_cycle_is_cut_off() {
        with_config(ReactiveConfig::default().with_max_drain(5), || {
            let obs = Observable::new(0u64);
            let feedback = obs.clone();
            let calls = Rc::new(Cell::new(0u32));
            let c = Rc::clone(&calls);
            let _sub = obs.subscribe(move |new, _| {
                c.set(c.get() + 1);
                feedback.set(new + 1);
            });

            obs.set(1);
            assert_eq!(calls.get(), 5);

            // Still usable afterwards.
            let before = calls.get();
            obs.set(1000);
            assert!(calls.get() > before);
        });
    }

    #[test]
    fn panicking_subscriber_leaves_observable_usable() {
        let obs = Observable::new(0);
        let boom = obs.subscribe(|new, _| {
            if *new == 1 {
                panic!("subscriber failure");
            }
        });
        let o = obs.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| o.set(1)));
        assert!(result.is_err());
        drop(boom);

        let (log, cb) = recorder();
        let _sub = obs.subscribe(cb);
        obs.set(2);
        assert_eq!(*log.borrow(), vec![(2, 1)]);
    }

    #[test]
    fn clone_shares_state_and_subscribers() {
        let obs1 = Observable::new(0);
        let (log, cb) = recorder();
        let _sub = obs1.subscribe(cb);

        let obs2 = obs1.clone();
        obs2.set(42);
        assert_eq!(obs1.get(), 42);
        assert_eq!(log.borrow().len(), 1);
        assert!(obs1.same(&obs2));
        assert!(!obs1.same(&Observable::new(42)));
    }

    #[test]
    fn by_ref_compares_identity() {
        let first = ByRef::new(vec![1, 2]);
        let obs = Observable::new(first.clone());
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let _sub = obs.subscribe(move |_, _| h.set(h.get() + 1));

        obs.set(first.clone());
        assert_eq!(hits.get(), 0);

        obs.set(ByRef::new(vec![1, 2]));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn reactive_ref_defaults_to_none() {
        let r = reactive_ref::<i32>(None);
        assert_eq!(r.get(), None);
        r.set(Some(3));
        assert_eq!(r.get(), Some(3));
    }

    #[test]
    fn debug_shows_queue_state() {
        let obs = Observable::new(7u8);
        let text = format!("{obs:?}");
        assert!(text.contains("value: 7"));
        assert!(text.contains("queued: 0"));
        assert!(text.contains("draining: false"));

        let seen = Rc::new(RefCell::new(String::new()));
        let (inner, sink) = (obs.clone(), Rc::clone(&seen));
        let _sub = obs.subscribe(move |_, _| *sink.borrow_mut() = format!("{inner:?}"));
        obs.set(8);
        assert!(seen.borrow().contains("draining: true"));
    }
}
