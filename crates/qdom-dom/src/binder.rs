#![forbid(unsafe_code)]

//! Reactive bindings from sources to DOM nodes.
//!
//! Every binder renders once immediately and again after each change of its
//! source, and returns a [`Subscription`] that stops the binding. Bindings
//! are not cleaned up when nodes leave the document; cancel them explicitly.
//!
//! ```text
//! Source ──observe──► render(value) ──► node.set_text_content / ...
//! ```
//!
//! `bind_input_value` is two-way:
//!
//! ```text
//! node ──input──► parse ──► Observable::set
//!   ▲                              │
//!   └──── set_value(Display) ◄─────┘
//! ```
//!
//! # Invariants
//!
//! 1. The initial render reads the source untracked, so binding inside an
//!    effect does not make the effect depend on the source.
//! 2. With the input guard on, the node is never rewritten with the value
//!    the user just typed, and a value write never re-enters as input.
//! 3. Once an input event settles, a node whose text parsed shows a value
//!    that parses to the observable's current value.
//!
//! # Failure Modes
//!
//! - **Unparsable input**: the value is logged at `warn` and the observable
//!   keeps its previous value.
//! - **Empty set**: `bind_input_value` on an empty set binds nothing and
//!   returns an inactive subscription.

use std::cell::{Cell, RefCell};
use std::fmt::Display;
use std::rc::Rc;
use std::str::FromStr;

use qdom_reactive::{Observable, Source, Subscription, untracked};

use crate::element_set::ElementSet;
use crate::node::{DomNode, INPUT_EVENT};

/// Sets the flag while the binding writes to the node.
struct Busy<'a>(&'a Cell<bool>);

impl<'a> Busy<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<N: DomNode + Clone + 'static> ElementSet<N> {
    fn bind_with<T, S>(&self, source: &S, render: impl Fn(&N, &str) + 'static) -> Subscription
    where
        S: Source<T>,
        T: Display + 'static,
    {
        let nodes = self.nodes().to_vec();
        let paint = move |value: &T| {
            let text = value.to_string();
            for node in &nodes {
                render(node, &text);
            }
        };
        paint(&untracked(|| source.get()));
        source.observe(paint)
    }

    /// Keep every node's text content equal to the source's `Display` form.
    pub fn bind_text<T, S>(&self, source: &S) -> Subscription
    where
        S: Source<T>,
        T: Display + 'static,
    {
        self.bind_with(source, |node, text| node.set_text_content(text))
    }

    /// Keep every node's inner markup equal to the source's `Display` form.
    ///
    /// The markup is not escaped; never bind untrusted input this way.
    pub fn bind_markup<T, S>(&self, source: &S) -> Subscription
    where
        S: Source<T>,
        T: Display + 'static,
    {
        self.bind_with(source, |node, html| node.set_inner_html(html))
    }

    /// Keep attribute `name` on every node equal to the source's `Display`
    /// form.
    pub fn bind_attribute<T, S>(&self, name: &str, source: &S) -> Subscription
    where
        S: Source<T>,
        T: Display + 'static,
    {
        let name = name.to_owned();
        self.bind_with(source, move |node, value| node.set_attribute(&name, value))
    }

    /// Two-way binding between the first node's form value and `target`.
    ///
    /// The node shows `target`'s `Display` form right away. `input` events
    /// parse the node's value with `FromStr` and store it in `target`;
    /// changes of `target` are written back to the node. A value that a
    /// subscriber corrects while the input is being stored (a clamp, a
    /// normalizer) is written back like any other change.
    pub fn bind_input_value<T>(&self, target: &Observable<T>) -> Subscription
    where
        T: FromStr + Display + Clone + PartialEq + 'static,
        T::Err: Display,
    {
        let Some(node) = self.first().cloned() else {
            return Subscription::empty();
        };
        let guarded = qdom_core::config::current().input_guard;
        let writing = Rc::new(Cell::new(false));
        let echo: Rc<RefCell<Option<Echo>>> = Rc::new(RefCell::new(None));

        let write_back = {
            let node = node.clone();
            let writing = Rc::clone(&writing);
            let echo = Rc::clone(&echo);
            move |value: &T| {
                let rendered = value.to_string();
                if guarded {
                    let shown = node.value();
                    if shown.as_deref() == Some(rendered.as_str()) {
                        return;
                    }
                    let is_echo = echo.borrow().as_ref().is_some_and(|typed| {
                        typed.rendered == rendered && shown.as_deref() == Some(typed.raw.as_str())
                    });
                    if is_echo {
                        return;
                    }
                }
                let _writing = Busy::enter(&writing);
                node.set_value(&rendered);
            }
        };
        write_back(&target.get_untracked());
        let outbound = target.subscribe(move |new, _| write_back(new));

        let inbound = {
            let source_node = node.clone();
            let target = target.clone();
            node.listen(
                INPUT_EVENT,
                Rc::new(move || {
                    if guarded && writing.get() {
                        return;
                    }
                    let Some(raw) = source_node.value() else {
                        return;
                    };
                    match raw.parse::<T>() {
                        Ok(parsed) => {
                            let _echo = EchoGuard::record(&echo, raw, parsed.to_string());
                            target.set(parsed);
                        }
                        Err(err) => {
                            tracing::warn!(
                                value = %raw,
                                error = %err,
                                "input value did not parse; binding left unchanged"
                            );
                        }
                    }
                }),
            )
        };

        Subscription::all([outbound, inbound])
    }
}

/// The text the user typed and the `Display` form it parsed to.
struct Echo {
    raw: String,
    rendered: String,
}

/// Holds the current [`Echo`] while a typed value is being stored.
struct EchoGuard<'a>(&'a RefCell<Option<Echo>>);

impl<'a> EchoGuard<'a> {
    fn record(slot: &'a RefCell<Option<Echo>>, raw: String, rendered: String) -> Self {
        *slot.borrow_mut() = Some(Echo { raw, rendered });
        Self(slot)
    }
}

impl Drop for EchoGuard<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().take();
    }
}
