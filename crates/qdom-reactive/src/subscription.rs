#![forbid(unsafe_code)]

//! Unsubscribe handles.
//!
//! A [`Subscription`] owns the cancel action for one registration (an
//! observable subscriber, an effect, a DOM listener, or a group of those).
//!
//! # Invariants
//!
//! 1. The cancel action runs at most once, no matter how many times
//!    [`Subscription::unsubscribe`] is called or how many clones exist.
//! 2. Clones share state: unsubscribing through one clone deactivates all.
//! 3. When the last clone is dropped while still active, the cancel action
//!    runs (RAII). [`Subscription::detach`] opts out of this.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Cancel = Box<dyn FnOnce()>;

struct SubscriptionInner {
    cancel: RefCell<Option<Cancel>>,
    /// Members of a group built with [`Subscription::all`].
    parts: RefCell<Vec<Subscription>>,
}

impl SubscriptionInner {
    fn cancel(&self) {
        // The borrow is released before the action runs.
        let action = self.cancel.borrow_mut().take();
        if let Some(action) = action {
            action();
        }
        let parts = std::mem::take(&mut *self.parts.borrow_mut());
        for part in &parts {
            part.unsubscribe();
        }
    }
}

impl Drop for SubscriptionInner {
    fn drop(&mut self) {
        if let Some(action) = self.cancel.get_mut().take() {
            action();
        }
        for part in self.parts.get_mut().drain(..) {
            part.unsubscribe();
        }
    }
}

/// Handle that removes a registration when invoked or dropped.
#[derive(Clone)]
#[must_use = "dropping a Subscription unsubscribes immediately; call `detach()` to keep it"]
pub struct Subscription {
    inner: Rc<SubscriptionInner>,
}

impl Subscription {
    /// Wrap a cancel action.
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self::from_parts(Some(Box::new(cancel)), Vec::new())
    }

    /// A subscription that is already inactive.
    pub fn empty() -> Self {
        Self::from_parts(None, Vec::new())
    }

    /// Combine several subscriptions into one handle that cancels (or
    /// detaches) them all, in order.
    pub fn all(parts: impl IntoIterator<Item = Subscription>) -> Self {
        Self::from_parts(None, parts.into_iter().collect())
    }

    fn from_parts(cancel: Option<Cancel>, parts: Vec<Subscription>) -> Self {
        Self {
            inner: Rc::new(SubscriptionInner {
                cancel: RefCell::new(cancel),
                parts: RefCell::new(parts),
            }),
        }
    }

    /// Remove the registration. Calling this more than once is harmless.
    pub fn unsubscribe(&self) {
        self.inner.cancel();
    }

    /// Whether the registration is still live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.cancel.borrow().is_some()
            || self.inner.parts.borrow().iter().any(Subscription::is_active)
    }

    /// Keep the registration for the lifetime of its source.
    ///
    /// After detaching, the registration can no longer be removed through
    /// this handle or its clones.
    pub fn detach(self) {
        let action = self.inner.cancel.borrow_mut().take();
        drop(action);
        let parts = std::mem::take(&mut *self.inner.parts.borrow_mut());
        for part in parts {
            part.detach();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, Subscription) {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        (count, Subscription::new(move || c.set(c.get() + 1)))
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let (count, sub) = counter();
        assert!(sub.is_active());
        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(count.get(), 1);
        assert!(!sub.is_active());
    }

    #[test]
    fn drop_cancels() {
        let (count, sub) = counter();
        drop(sub);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn clones_share_and_last_drop_cancels() {
        let (count, sub) = counter();
        let other = sub.clone();
        drop(sub);
        assert_eq!(count.get(), 0);
        assert!(other.is_active());
        drop(other);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn detach_never_cancels() {
        let (count, sub) = counter();
        let other = sub.clone();
        sub.detach();
        other.unsubscribe();
        drop(other);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn all_cancels_every_part() {
        let (a, sub_a) = counter();
        let (b, sub_b) = counter();
        let group = Subscription::all([sub_a, sub_b]);
        group.unsubscribe();
        group.unsubscribe();
        assert_eq!((a.get(), b.get()), (1, 1));
    }

    #[test]
    fn detaching_a_group_keeps_every_part() {
        let (a, sub_a) = counter();
        let (b, sub_b) = counter();
        let group = Subscription::all([sub_a, sub_b]);
        assert!(group.is_active());
        group.detach();
        assert_eq!((a.get(), b.get()), (0, 0));
    }

    #[test]
    fn dropping_a_group_cancels_every_part() {
        let (a, sub_a) = counter();
        drop(Subscription::all([sub_a]));
        assert_eq!(a.get(), 1);
    }

    #[test]
    fn empty_is_inactive() {
        let sub = Subscription::empty();
        assert!(!sub.is_active());
        sub.unsubscribe();
        assert!(format!("{sub:?}").contains("active: false"));
    }
}
