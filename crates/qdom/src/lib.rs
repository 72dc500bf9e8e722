#![forbid(unsafe_code)]

//! qdom: a small DOM helper library built around observable values.
//!
//! # Crates
//!
//! | Crate           | Contents                                           |
//! |-----------------|----------------------------------------------------|
//! | `qdom-core`     | configuration (`QDOM_*` env vars), logging         |
//! | `qdom-reactive` | `Observable`, `DeepObservable`, effects, `watch`   |
//! | `qdom-dom`      | `DomNode`, `ElementSet`, binders, plugin registry  |
//! | `qdom-web`      | `web-sys` nodes and the microtask hook (wasm32)    |
//!
//! # Example
//!
//! ```
//! use qdom::prelude::*;
//!
//! let counter = ElementSet::new(vec![MemoryNode::new("span")]);
//! let count = Observable::new(0);
//! let _binding = counter.bind_text(&count);
//!
//! let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
//! let sink = log.clone();
//! let _watch = watch(&count, move |new, old| sink.borrow_mut().push((*new, *old)));
//!
//! count.set(5);
//! count.set(5);
//! assert_eq!(*log.borrow(), vec![(5, 0)]);
//! assert_eq!(counter.text().as_deref(), Some("5"));
//! ```

pub use qdom_dom as dom;
pub use qdom_reactive as reactive;

#[cfg(target_arch = "wasm32")]
pub use qdom_web as web;

pub use qdom_core::{ConfigError, NotifyMode, ReactiveConfig, logging, with_config};
pub use qdom_dom::{
    DomNode, ElementSet, Extender, MemoryNode, Plugin, PluginError, PluginRegistry,
};
pub use qdom_reactive::{
    ByRef, Computed, DeepObservable, EffectScope, Observable, ReactiveError, Scheduler, Source,
    Subscription, effect, effect_scope, reactive_ref, untracked, watch, watch_dyn,
};

/// Everything most pages need.
pub mod prelude {
    pub use qdom_dom::{DomNode, ElementSet, MemoryNode, Plugin, PluginRegistry};
    pub use qdom_reactive::{
        Computed, DeepObservable, Observable, Source, Subscription, effect, reactive_ref, watch,
    };

    #[cfg(target_arch = "wasm32")]
    pub use qdom_web::{WebNode, query_all};
}
