#![forbid(unsafe_code)]

//! Dependency tracking for effects.
//!
//! While an effect body runs, a tracking frame is pushed onto a
//! thread-local stack. Every [`Source`](crate::Source) read records itself
//! into the innermost frame; the effect then subscribes to exactly the set of
//! sources it read. [`untracked`] pushes a frame that records nothing.
//!
//! # Invariants
//!
//! 1. A source is recorded at most once per frame (deduplicated by key).
//! 2. Frames are popped even if the body panics.

use std::cell::RefCell;
use std::rc::Rc;

use crate::subscription::Subscription;

/// A readable thing an effect can depend on, with its concrete value type
/// erased.
pub(crate) trait Dependency {
    /// Stable identity of the underlying shared state.
    fn key(&self) -> usize;

    /// Invoke `on_change` whenever the source changes.
    fn on_change(&self, on_change: Rc<dyn Fn()>) -> Subscription;
}

type Frame = Option<Vec<Rc<dyn Dependency>>>;

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Pops the frame it pushed on drop.
struct FrameGuard {
    popped: bool,
}

impl FrameGuard {
    fn push(frame: Frame) -> Self {
        FRAMES.with(|frames| frames.borrow_mut().push(frame));
        Self { popped: false }
    }

    fn pop(mut self) -> Frame {
        self.popped = true;
        FRAMES.with(|frames| frames.borrow_mut().pop()).flatten()
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if !self.popped {
            FRAMES.with(|frames| frames.borrow_mut().pop());
        }
    }
}

/// Record a read of the source identified by `key`. `make` is only called
/// when a tracking frame is active and the key is new to it.
pub(crate) fn record_with(key: usize, make: impl FnOnce() -> Rc<dyn Dependency>) {
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        if let Some(Some(deps)) = frames.last_mut()
            && !deps.iter().any(|dep| dep.key() == key)
        {
            deps.push(make());
        }
    });
}

/// Run `f` and return its result together with every source it read.
pub(crate) fn collect<R>(f: impl FnOnce() -> R) -> (R, Vec<Rc<dyn Dependency>>) {
    let guard = FrameGuard::push(Some(Vec::new()));
    let result = f();
    let deps = guard.pop().unwrap_or_default();
    (result, deps)
}

/// Run `f` without recording any reads into the enclosing effect.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = FrameGuard::push(None);
    f()
}

/// Whether a read right now would be recorded by an effect.
#[must_use]
pub fn is_tracking() -> bool {
    FRAMES.with(|frames| matches!(frames.borrow().last(), Some(Some(_))))
}
