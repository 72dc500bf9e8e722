#![forbid(unsafe_code)]

//! `watch`: the `(new, old)` change callback entry points.
//!
//! [`watch`] is the typed form; misuse cannot compile. [`watch_dyn`] accepts
//! type-erased arguments for hosts that route values through `dyn Any`
//! (plugin calls, scripting bridges) and reports misuse as
//! [`ReactiveError::InvalidArgument`].

use std::any::Any;
use std::rc::Rc;

use thiserror::Error;

use crate::observable::Observable;
use crate::subscription::Subscription;

/// Errors raised by the reactive entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: &'static str,
    },
}

/// A type-erased watcher accepted by [`watch_dyn`].
pub type DynWatcher<T> = Rc<dyn Fn(&T, &T)>;

/// Call `watcher(new, old)` after every change of `target`.
///
/// Equivalent to [`Observable::subscribe`].
pub fn watch<T: Clone + PartialEq + 'static>(
    target: &Observable<T>,
    watcher: impl Fn(&T, &T) + 'static,
) -> Subscription {
    target.subscribe(watcher)
}

/// [`watch`] over type-erased arguments.
///
/// `target` must be an `Observable<T>` and `watcher` a [`DynWatcher<T>`].
///
/// # Errors
///
/// Returns [`ReactiveError::InvalidArgument`] naming the offending argument
/// when either has the wrong type. Nothing is subscribed in that case.
pub fn watch_dyn<T: Clone + PartialEq + 'static>(
    target: &dyn Any,
    watcher: &dyn Any,
) -> Result<Subscription, ReactiveError> {
    let target = target
        .downcast_ref::<Observable<T>>()
        .ok_or(ReactiveError::InvalidArgument {
            argument: "target",
            reason: "must be an observable",
        })?;
    let watcher = watcher
        .downcast_ref::<DynWatcher<T>>()
        .ok_or(ReactiveError::InvalidArgument {
            argument: "watcher",
            reason: "must be a function",
        })?;
    let watcher = Rc::clone(watcher);
    Ok(watch(target, move |new, old| watcher(new, old)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn watch_delivers_new_and_old() {
        let obs = Observable::new(1);
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let _w = watch(&obs, move |new, old| l.borrow_mut().push((*new, *old)));
        obs.set(2);
        assert_eq!(*log.borrow(), vec![(2, 1)]);
    }

    #[test]
    fn watch_dyn_accepts_well_typed_arguments() {
        let obs = Observable::new(String::from("x"));
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let watcher: DynWatcher<String> = Rc::new(move |new, _| l.borrow_mut().push(new.clone()));

        let sub = watch_dyn::<String>(&obs, &watcher).expect("valid arguments");
        obs.set("y".into());
        assert_eq!(*log.borrow(), vec![String::from("y")]);
        sub.unsubscribe();
        assert_eq!(obs.subscriber_count(), 0);
    }

    #[test]
    fn watch_dyn_rejects_non_observable_target() {
        let watcher: DynWatcher<i32> = Rc::new(|_, _| {});
        let err = watch_dyn::<i32>(&42_i32, &watcher).unwrap_err();
        assert_eq!(
            err,
            ReactiveError::InvalidArgument {
                argument: "target",
                reason: "must be an observable",
            }
        );
    }

    #[test]
    fn watch_dyn_rejects_non_function_watcher() {
        let obs = Observable::new(0_i32);
        let err = watch_dyn::<i32>(&obs, &"not a function").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid argument `watcher`: must be a function"
        );
        assert_eq!(obs.subscriber_count(), 0);
    }

    #[test]
    fn watch_dyn_rejects_wrong_value_type() {
        let obs = Observable::new(0_i32);
        let watcher: DynWatcher<String> = Rc::new(|_, _| {});
        assert!(watch_dyn::<String>(&obs, &watcher).is_err());
    }
}
