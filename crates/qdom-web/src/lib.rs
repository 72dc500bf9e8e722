#![forbid(unsafe_code)]

//! Browser backend for qdom.
//!
//! - [`WebNode`]: a [`DomNode`](qdom_dom::DomNode) over `web_sys::HtmlElement`.
//! - [`query_all`]: select elements from the current document into an
//!   [`ElementSet`](qdom_dom::ElementSet).
//! - [`install_microtask_flush`]: drive the reactive [`Scheduler`] from the
//!   browser's microtask queue, so coalesced deep notifications go out at the
//!   end of the current task.
//!
//! Only the scheduler glue builds natively; everything touching `web-sys` is
//! compiled for `wasm32` only.
//!
//! [`Scheduler`]: qdom_reactive::Scheduler

pub mod microtask;

#[cfg(target_arch = "wasm32")]
mod node;

#[cfg(target_arch = "wasm32")]
pub use node::{WebNode, query_all};

#[cfg(target_arch = "wasm32")]
pub use microtask::install_microtask_flush;

pub use microtask::install_flush_hook;

use thiserror::Error;

/// Failures reaching the browser document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebError {
    #[error("no global window or document")]
    NoDocument,

    #[error("invalid selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },
}
