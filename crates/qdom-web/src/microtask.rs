#![forbid(unsafe_code)]

//! Scheduler flush hooks.
//!
//! A [`Scheduler`] calls its hook when work lands on an idle queue. The hook
//! installed here hands a flush task to a spawner; in the browser the
//! spawner is `wasm_bindgen_futures::spawn_local`, which runs the task on the
//! microtask queue.

use qdom_reactive::Scheduler;

/// A deferred unit of work handed to a spawner.
pub type FlushTask = Box<dyn FnOnce()>;

/// Make `scheduler` request a flush through `spawn` whenever work is queued
/// on it while idle.
///
/// The hook keeps a handle to the scheduler; call
/// [`Scheduler::clear_flush_hook`] to release it.
pub fn install_flush_hook(scheduler: &Scheduler, spawn: impl Fn(FlushTask) + 'static) {
    let target = scheduler.clone();
    scheduler.set_flush_hook(move || {
        let target = target.clone();
        spawn(Box::new(move || {
            let ran = target.flush();
            tracing::trace!(ran, "microtask flush");
        }));
    });
}

/// Flush `scheduler` from the browser microtask queue.
#[cfg(target_arch = "wasm32")]
pub fn install_microtask_flush(scheduler: &Scheduler) {
    install_flush_hook(scheduler, |task| {
        wasm_bindgen_futures::spawn_local(async move { task() });
    });
}
