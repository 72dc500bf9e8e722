#![forbid(unsafe_code)]

//! Host-driven microtask queue.
//!
//! [`Scheduler`] stands in for the event loop's microtask queue: deferred
//! work (coalesced deep-observable notifications) is queued with
//! [`Scheduler::schedule`] and runs when the host calls
//! [`Scheduler::flush`]. In a browser the web crate installs a flush hook
//! that arranges a real microtask; natively the host (or a test) flushes at
//! the end of each turn.
//!
//! ```text
//! mutation → schedule(task) → [hook: request flush] → flush() → task()
//! ```
//!
//! # Invariants
//!
//! 1. Tasks run in FIFO order.
//! 2. Tasks scheduled during a flush run in the same flush.
//! 3. A nested `flush()` from inside a task is a no-op returning 0.
//! 4. The flush hook fires once per transition from idle to non-empty.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

type Task = Box<dyn FnOnce()>;
type FlushHook = Rc<dyn Fn()>;

struct SchedulerInner {
    queue: RefCell<VecDeque<Task>>,
    flushing: Cell<bool>,
    hook: RefCell<Option<FlushHook>>,
    flushed_total: Cell<u64>,
}

/// Single-threaded FIFO task queue drained by the host.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

thread_local! {
    static CURRENT: Scheduler = Scheduler::new();
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("flushing", &self.inner.flushing.get())
            .field("has_hook", &self.inner.hook.borrow().is_some())
            .finish()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                queue: RefCell::new(VecDeque::new()),
                flushing: Cell::new(false),
                hook: RefCell::new(None),
                flushed_total: Cell::new(0),
            }),
        }
    }

    /// The thread's default scheduler.
    #[must_use]
    pub fn current() -> Self {
        CURRENT.with(Clone::clone)
    }

    /// Queue a task for the next flush.
    pub fn schedule(&self, task: impl FnOnce() + 'static) {
        let was_idle = {
            let mut queue = self.inner.queue.borrow_mut();
            let was_idle = queue.is_empty();
            queue.push_back(Box::new(task));
            was_idle
        };
        if was_idle && !self.inner.flushing.get() {
            let hook = self.inner.hook.borrow().clone();
            if let Some(hook) = hook {
                hook();
            }
        }
    }

    /// Run queued tasks until the queue is empty. Returns how many ran.
    pub fn flush(&self) -> usize {
        if self.inner.flushing.replace(true) {
            return 0;
        }
        let _guard = FlushGuard(&self.inner.flushing);
        let mut ran = 0usize;
        loop {
            let task = self.inner.queue.borrow_mut().pop_front();
            let Some(task) = task else { break };
            task();
            ran += 1;
        }
        self.inner
            .flushed_total
            .set(self.inner.flushed_total.get() + ran as u64);
        if ran > 0 {
            tracing::trace!(ran, "scheduler flushed");
        }
        ran
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Whether a flush is in progress.
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.inner.flushing.get()
    }

    /// Total tasks run by this scheduler.
    #[must_use]
    pub fn flushed_total(&self) -> u64 {
        self.inner.flushed_total.get()
    }

    /// Install a hook invoked when work is queued on an idle scheduler.
    /// The hook should arrange for [`flush`](Self::flush) to run soon.
    pub fn set_flush_hook(&self, hook: impl Fn() + 'static) {
        *self.inner.hook.borrow_mut() = Some(Rc::new(hook));
    }

    pub fn clear_flush_hook(&self) {
        self.inner.hook.borrow_mut().take();
    }

    /// Drop every queued task without running it.
    pub fn clear(&self) -> usize {
        let drained: Vec<Task> = self.inner.queue.borrow_mut().drain(..).collect();
        drained.len()
    }
}

struct FlushGuard<'a>(&'a Cell<bool>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_run_fifo_on_flush() {
        let sched = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = Rc::clone(&log);
            sched.schedule(move || log.borrow_mut().push(i));
        }
        assert_eq!(sched.pending(), 3);
        assert!(log.borrow().is_empty());

        assert_eq!(sched.flush(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(sched.pending(), 0);
        assert_eq!(sched.flushed_total(), 3);
    }

    #[test]
    fn tasks_scheduled_during_flush_run_in_same_flush() {
        let sched = Scheduler::new();
        let hits = Rc::new(Cell::new(0u32));
        let s = sched.clone();
        let h = Rc::clone(&hits);
        sched.schedule(move || {
            let h = Rc::clone(&h);
            s.schedule(move || h.set(h.get() + 1));
        });
        assert_eq!(sched.flush(), 2);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn nested_flush_is_noop() {
        let sched = Scheduler::new();
        let inner_ran = Rc::new(Cell::new(usize::MAX));
        let s = sched.clone();
        let r = Rc::clone(&inner_ran);
        sched.schedule(move || r.set(s.flush()));
        sched.flush();
        assert_eq!(inner_ran.get(), 0);
        assert!(!sched.is_flushing());
    }

    #[test]
    fn hook_fires_on_idle_to_busy_only() {
        let sched = Scheduler::new();
        let requests = Rc::new(Cell::new(0u32));
        let r = Rc::clone(&requests);
        sched.set_flush_hook(move || r.set(r.get() + 1));

        sched.schedule(|| {});
        sched.schedule(|| {});
        assert_eq!(requests.get(), 1);

        sched.flush();
        sched.schedule(|| {});
        assert_eq!(requests.get(), 2);

        sched.clear_flush_hook();
        sched.flush();
        sched.schedule(|| {});
        assert_eq!(requests.get(), 2);
    }

    #[test]
    fn clear_drops_without_running() {
        let sched = Scheduler::new();
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        sched.schedule(move || h.set(1));
        assert_eq!(sched.clear(), 1);
        assert_eq!(sched.flush(), 0);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn current_is_shared_per_thread() {
        let a = Scheduler::current();
        let b = Scheduler::current();
        a.schedule(|| {});
        assert_eq!(b.pending(), a.pending());
        a.flush();
    }
}
