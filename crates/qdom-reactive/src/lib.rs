#![forbid(unsafe_code)]

//! Reactive primitives for qdom.
//!
//! - [`Observable`]: a shared value that notifies `(new, old)` on change.
//! - [`DeepObservable`]: a structured value whose nested mutations are
//!   coalesced into one notification per turn.
//! - [`effect`], [`Computed`], [`EffectScope`]: auto-tracking derivations.
//! - [`Subscription`]: cancellation handle returned by every registration.
//! - [`Scheduler`]: the host-driven microtask queue deep notifications wait on.
//!
//! # Architecture
//!
//! Everything is single-threaded: state lives behind `Rc<RefCell<..>>` and
//! handles are `!Send`. Reads made inside an effect body are recorded on a
//! thread-local tracking stack; see [`tracking`].
//!
//! # Invariants
//!
//! 1. Version counters increment exactly once per notifying change.
//! 2. Subscribers are notified in registration order.
//! 3. Setting an `Observable` to an equal value is a no-op.
//! 4. A cancelled subscription is never invoked again.

pub mod computed;
pub mod deep;
pub mod effect;
pub mod observable;
pub mod scheduler;
pub mod subscription;
pub mod tracking;
pub mod watch;

pub use computed::Computed;
pub use deep::{DeepObservable, DeepWriteGuard};
pub use effect::{EffectScope, EffectStats, effect, effect_scope, effect_with_stats};
pub use observable::{ByRef, Observable, reactive_ref};
pub use scheduler::Scheduler;
pub use subscription::Subscription;
pub use tracking::{is_tracking, untracked};
pub use watch::{DynWatcher, ReactiveError, watch, watch_dyn};

/// A readable value that can be observed for changes.
///
/// Binders accept any `Source`, so an [`Observable`], a [`DeepObservable`]
/// and a [`Computed`] can all drive the same DOM sink.
pub trait Source<T> {
    /// Current value. Recorded as a dependency inside effect bodies.
    fn get(&self) -> T;

    /// Call `callback` with the new value after each change.
    fn observe(&self, callback: impl Fn(&T) + 'static) -> Subscription;
}
