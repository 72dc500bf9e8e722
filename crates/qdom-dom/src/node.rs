#![forbid(unsafe_code)]

//! The DOM node surface the binders write to.
//!
//! Implementations are cheap handles onto a live node (like a JS element
//! reference), so every method takes `&self`. [`MemoryNode`](crate::MemoryNode)
//! backs native builds and tests; the web crate provides a `web-sys` backed
//! node on wasm32.

use std::rc::Rc;

use qdom_reactive::Subscription;

/// Event fired when the user edits a form control.
pub const INPUT_EVENT: &str = "input";

/// A live DOM node handle.
pub trait DomNode {
    /// Concatenated text of the node and its descendants.
    fn text_content(&self) -> String;

    /// Replace the node's children with a single text node.
    fn set_text_content(&self, text: &str);

    fn inner_html(&self) -> String;

    /// Replace the node's children with parsed markup. Not escaped.
    fn set_inner_html(&self, html: &str);

    fn attribute(&self, name: &str) -> Option<String>;

    fn set_attribute(&self, name: &str, value: &str);

    /// The form value, or `None` when the node is not a form control.
    fn value(&self) -> Option<String>;

    /// Set the form value. Ignored by nodes that are not form controls.
    fn set_value(&self, value: &str);

    /// Whether the node is attached to a document.
    fn is_connected(&self) -> bool;

    /// Call `handler` whenever `event` fires on this node. The listener is
    /// removed when the returned subscription is cancelled.
    fn listen(&self, event: &str, handler: Rc<dyn Fn()>) -> Subscription;
}
