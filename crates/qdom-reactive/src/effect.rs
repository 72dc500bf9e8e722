#![forbid(unsafe_code)]

//! Auto-tracking effects and effect scopes.
//!
//! [`effect`] runs a closure immediately and records every source it reads
//! ([`Observable::get`](crate::Observable::get), `Computed::get`,
//! `DeepObservable::get`/`with`). When any of those sources change, the
//! closure runs again and its dependencies are re-collected, so branches
//! that stop reading a source also stop depending on it.
//!
//! [`EffectScope`] groups effects created inside [`EffectScope::run`] so
//! they can be disposed together.
//!
//! # Invariants
//!
//! 1. An effect never re-enters itself: writes made by its own body do not
//!    re-trigger it.
//! 2. After disposal an effect never runs again.
//! 3. Effects created inside a scope live until the scope is disposed, even
//!    if the caller drops the returned handle.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::subscription::Subscription;
use crate::tracking;

struct EffectInner {
    body: RefCell<Box<dyn FnMut()>>,
    deps: RefCell<Vec<Subscription>>,
    disposed: Cell<bool>,
    running: Cell<bool>,
    runs: Cell<u64>,
}

fn execute(effect: &Rc<EffectInner>) {
    if effect.disposed.get() || effect.running.replace(true) {
        return;
    }
    let _guard = RunGuard(&effect.running);

    // Old dependencies go away before the body runs.
    let stale = std::mem::take(&mut *effect.deps.borrow_mut());
    drop(stale);

    let ((), sources) = tracking::collect(|| (effect.body.borrow_mut())());
    effect.runs.set(effect.runs.get() + 1);
    if effect.disposed.get() {
        return;
    }

    let deps: Vec<Subscription> = sources
        .into_iter()
        .map(|source| {
            let target = Rc::clone(effect);
            source.on_change(Rc::new(move || execute(&target)))
        })
        .collect();
    *effect.deps.borrow_mut() = deps;
}

fn dispose(effect: &EffectInner) {
    effect.disposed.set(true);
    let deps = std::mem::take(&mut *effect.deps.borrow_mut());
    drop(deps);
}

struct RunGuard<'a>(&'a Cell<bool>);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Run `body` now and again whenever a source it read changes.
///
/// The returned [`Subscription`] disposes the effect. Dropping it disposes
/// the effect too, unless the effect belongs to an [`EffectScope`] or the
/// handle is detached. A scope shares the handle, so detaching an effect
/// created inside a scope also takes it out of the scope's reach.
pub fn effect(body: impl FnMut() + 'static) -> Subscription {
    let (handle, _) = effect_with_stats(body);
    handle
}

/// [`effect`], also returning a run counter (used by tests and diagnostics).
pub fn effect_with_stats(body: impl FnMut() + 'static) -> (Subscription, EffectStats) {
    let inner = Rc::new(EffectInner {
        body: RefCell::new(Box::new(body)),
        deps: RefCell::new(Vec::new()),
        disposed: Cell::new(false),
        running: Cell::new(false),
        runs: Cell::new(0),
    });
    execute(&inner);
    let stats = EffectStats {
        inner: Rc::downgrade(&inner),
    };
    let handle = Subscription::new(move || dispose(&inner));
    register_in_scope(&handle);
    (handle, stats)
}

/// Read-only view of an effect's bookkeeping.
#[derive(Clone)]
pub struct EffectStats {
    inner: Weak<EffectInner>,
}

impl EffectStats {
    /// How many times the body has run (0 once the effect is gone).
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.inner.upgrade().map_or(0, |e| e.runs.get())
    }

    /// Number of sources the last run depended on.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.inner.upgrade().map_or(0, |e| e.deps.borrow().len())
    }

    /// Whether the effect is still live.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.upgrade().is_some_and(|e| !e.disposed.get())
    }
}

impl fmt::Debug for EffectStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectStats")
            .field("runs", &self.runs())
            .field("dependencies", &self.dependency_count())
            .field("live", &self.is_live())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EffectScope
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScopeInner {
    members: RefCell<Vec<Subscription>>,
    disposed: Cell<bool>,
}

thread_local! {
    static ACTIVE_SCOPES: RefCell<Vec<Rc<ScopeInner>>> = const { RefCell::new(Vec::new()) };
}

fn active_scope() -> Option<Rc<ScopeInner>> {
    ACTIVE_SCOPES.with(|scopes| scopes.borrow().last().cloned())
}

fn register_in_scope(handle: &Subscription) {
    if let Some(scope) = active_scope() {
        if scope.disposed.get() {
            handle.unsubscribe();
        } else {
            scope.members.borrow_mut().push(handle.clone());
        }
    }
}

/// A group of effects disposed together.
///
/// Scopes created inside another scope's `run` are disposed with it.
#[derive(Clone)]
pub struct EffectScope {
    inner: Rc<ScopeInner>,
}

impl Default for EffectScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("members", &self.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        ACTIVE_SCOPES.with(|scopes| scopes.borrow_mut().pop());
    }
}

impl EffectScope {
    #[must_use]
    pub fn new() -> Self {
        let inner = Rc::new(ScopeInner::default());
        if active_scope().is_some() {
            let weak = Rc::downgrade(&inner);
            let link = Subscription::new(move || {
                if let Some(inner) = weak.upgrade() {
                    dispose_scope(&inner);
                }
            });
            register_in_scope(&link);
        }
        Self { inner }
    }

    /// Run `f` with this scope active; effects created inside join it.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        ACTIVE_SCOPES.with(|scopes| scopes.borrow_mut().push(Rc::clone(&self.inner)));
        let _guard = ScopeGuard;
        f()
    }

    /// Dispose every member. Effects created in the scope afterwards are
    /// disposed immediately.
    pub fn dispose(&self) {
        dispose_scope(&self.inner);
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Number of live members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .members
            .borrow()
            .iter()
            .filter(|m| m.is_active())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn dispose_scope(inner: &ScopeInner) {
    inner.disposed.set(true);
    let members = std::mem::take(&mut *inner.members.borrow_mut());
    for member in &members {
        member.unsubscribe();
    }
}

/// Run `f` inside a fresh scope and return the scope.
pub fn effect_scope(f: impl FnOnce()) -> EffectScope {
    let scope = EffectScope::new();
    scope.run(f);
    scope
}
