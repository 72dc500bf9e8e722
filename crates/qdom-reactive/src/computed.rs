#![forbid(unsafe_code)]

//! Derived values that recompute when their inputs change.
//!
//! A [`Computed`] evaluates its closure once up front and again whenever a
//! source it read changes. The result is stored in an [`Observable`], so a
//! recomputation that produces an equal value notifies nobody.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::Source;
use crate::effect::effect;
use crate::observable::Observable;
use crate::subscription::Subscription;
use crate::tracking::untracked;

/// A read-only derived value.
///
/// Clones share the same cached value and the same recomputation effect;
/// the effect is disposed when the last clone is dropped.
pub struct Computed<T> {
    value: Observable<T>,
    effect: Subscription,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            effect: self.effect.clone(),
        }
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("value", &self.value.get_untracked())
            .field("version", &self.value.version())
            .field("active", &self.effect.is_active())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
    /// Evaluate `compute` once, inside the tracking effect that will
    /// re-evaluate it, and cache the result.
    #[must_use]
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        let compute: Rc<dyn Fn() -> T> = Rc::new(compute);
        let cache: Rc<RefCell<Option<Observable<T>>>> = Rc::new(RefCell::new(None));

        let effect = {
            let compute = Rc::clone(&compute);
            let cache = Rc::clone(&cache);
            effect(move || {
                let next = compute();
                let current = cache.borrow().clone();
                match current {
                    Some(value) => value.set(next),
                    None => *cache.borrow_mut() = Some(Observable::new(next)),
                }
            })
        };
        // The effect's first run fills the cache; evaluate here only if it
        // could not run.
        let seeded = cache.borrow().clone();
        let value = seeded.unwrap_or_else(|| {
            let value = Observable::new(untracked(|| compute()));
            *cache.borrow_mut() = Some(value.clone());
            value
        });
        Self { value, effect }
    }

    /// Current value; records a dependency when read inside an effect.
    #[must_use]
    pub fn get(&self) -> T {
        self.value.get()
    }

    #[must_use]
    pub fn get_untracked(&self) -> T {
        self.value.get_untracked()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.value.with(f)
    }

    /// Subscribe to recomputed values as `(new, old)`.
    pub fn subscribe(&self, callback: impl Fn(&T, &T) + 'static) -> Subscription {
        self.value.subscribe(callback)
    }

    /// Number of times the cached value actually changed.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.value.version()
    }

    /// Stop recomputing. The last value stays readable.
    pub fn dispose(&self) {
        self.effect.unsubscribe();
    }
}

impl<T: Clone + PartialEq + 'static> Source<T> for Computed<T> {
    fn get(&self) -> T {
        Computed::get(self)
    }

    fn observe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.value.subscribe(move |new, _| callback(new))
    }
}
