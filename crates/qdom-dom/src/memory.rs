#![forbid(unsafe_code)]

//! In-memory DOM node.
//!
//! [`MemoryNode`] models the parts of an element the binders touch: text vs
//! markup content, attributes, the value of form controls, connection state,
//! and event listeners. It also counts writes so callers can assert that a
//! binding did not touch the node redundantly.
//!
//! # Invariants
//!
//! 1. `text_content` of a node whose markup was set never contains tags.
//! 2. `inner_html` of a node whose text was set is escaped.
//! 3. Listeners run in registration order; a listener removed during
//!    dispatch does not run afterwards.
//! 4. With `echo_value_writes`, every `set_value` dispatches an `input`
//!    event, like hosts that report programmatic edits.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use qdom_reactive::Subscription;

use crate::node::{DomNode, INPUT_EVENT};

const FORM_TAGS: [&str; 3] = ["input", "textarea", "select"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Content {
    Text(String),
    Markup(String),
}

struct Listener {
    id: u64,
    event: String,
    active: Rc<Cell<bool>>,
    handler: Rc<dyn Fn()>,
}

struct NodeState {
    tag: String,
    content: Content,
    attributes: Vec<(String, String)>,
    value: Option<String>,
    connected: bool,
    echo_value_writes: bool,
    listeners: Vec<Listener>,
    next_listener: u64,
    writes: WriteCounts,
}

/// How many times each part of a [`MemoryNode`] was written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub text: u32,
    pub html: u32,
    pub attribute: u32,
    pub value: u32,
}

/// A shared in-memory element. Clones are handles to the same node.
#[derive(Clone)]
pub struct MemoryNode {
    state: Rc<RefCell<NodeState>>,
}

impl fmt::Debug for MemoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MemoryNode")
            .field("tag", &state.tag)
            .field("content", &state.content)
            .field("attributes", &state.attributes)
            .field("value", &state.value)
            .field("connected", &state.connected)
            .finish()
    }
}

impl MemoryNode {
    /// Create a connected element. `input`, `textarea` and `select` are
    /// form controls with an empty value.
    #[must_use]
    pub fn new(tag: &str) -> Self {
        let tag = tag.to_ascii_lowercase();
        let value = FORM_TAGS.contains(&tag.as_str()).then(String::new);
        Self {
            state: Rc::new(RefCell::new(NodeState {
                tag,
                content: Content::Text(String::new()),
                attributes: Vec::new(),
                value,
                connected: true,
                echo_value_writes: false,
                listeners: Vec::new(),
                next_listener: 0,
                writes: WriteCounts::default(),
            })),
        }
    }

    /// Shorthand for `MemoryNode::new("input")`.
    #[must_use]
    pub fn input() -> Self {
        Self::new("input")
    }

    /// Dispatch `input` after every `set_value`.
    #[must_use]
    pub fn with_echo_value_writes(self, echo: bool) -> Self {
        self.state.borrow_mut().echo_value_writes = echo;
        self
    }

    #[must_use]
    pub fn tag(&self) -> String {
        self.state.borrow().tag.clone()
    }

    /// Remove the node from its document. Writes still land on the node.
    pub fn detach(&self) {
        self.state.borrow_mut().connected = false;
    }

    pub fn attach(&self) {
        self.state.borrow_mut().connected = true;
    }

    /// Fire `event`, running matching listeners in registration order.
    /// Returns how many ran.
    pub fn dispatch(&self, event: &str) -> usize {
        let targets: Vec<(Rc<Cell<bool>>, Rc<dyn Fn()>)> = self
            .state
            .borrow()
            .listeners
            .iter()
            .filter(|l| l.event == event)
            .map(|l| (Rc::clone(&l.active), Rc::clone(&l.handler)))
            .collect();
        let mut ran = 0;
        for (active, handler) in targets {
            if active.get() {
                handler();
                ran += 1;
            }
        }
        ran
    }

    /// Simulate the user typing: replace the value without counting it as a
    /// programmatic write, then fire `input`.
    pub fn type_value(&self, value: &str) {
        {
            let mut state = self.state.borrow_mut();
            if state.value.is_none() {
                return;
            }
            state.value = Some(value.to_owned());
        }
        self.dispatch(INPUT_EVENT);
    }

    /// Number of listeners registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.state
            .borrow()
            .listeners
            .iter()
            .filter(|l| l.event == event)
            .count()
    }

    #[must_use]
    pub fn writes(&self) -> WriteCounts {
        self.state.borrow().writes
    }
}

impl DomNode for MemoryNode {
    fn text_content(&self) -> String {
        match &self.state.borrow().content {
            Content::Text(text) => text.clone(),
            Content::Markup(html) => strip_tags(html),
        }
    }

    fn set_text_content(&self, text: &str) {
        let mut state = self.state.borrow_mut();
        state.content = Content::Text(text.to_owned());
        state.writes.text += 1;
    }

    fn inner_html(&self) -> String {
        match &self.state.borrow().content {
            Content::Text(text) => escape_text(text),
            Content::Markup(html) => html.clone(),
        }
    }

    fn set_inner_html(&self, html: &str) {
        let mut state = self.state.borrow_mut();
        state.content = Content::Markup(html.to_owned());
        state.writes.html += 1;
    }

    fn attribute(&self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        self.state
            .borrow()
            .attributes
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.clone())
    }

    fn set_attribute(&self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        let mut state = self.state.borrow_mut();
        state.writes.attribute += 1;
        if let Some(slot) = state.attributes.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value.to_owned();
        } else {
            state.attributes.push((name, value.to_owned()));
        }
    }

    fn value(&self) -> Option<String> {
        self.state.borrow().value.clone()
    }

    fn set_value(&self, value: &str) {
        let echo = {
            let mut state = self.state.borrow_mut();
            let Some(slot) = state.value.as_mut() else {
                return;
            };
            value.clone_into(slot);
            state.writes.value += 1;
            state.echo_value_writes
        };
        if echo {
            self.dispatch(INPUT_EVENT);
        }
    }

    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn listen(&self, event: &str, handler: Rc<dyn Fn()>) -> Subscription {
        let active = Rc::new(Cell::new(true));
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_listener;
            state.next_listener += 1;
            state.listeners.push(Listener {
                id,
                event: event.to_owned(),
                active: Rc::clone(&active),
                handler,
            });
            id
        };
        let weak = Rc::downgrade(&self.state);
        Subscription::new(move || {
            active.set(false);
            if let Some(shared) = weak.upgrade()
                && let Ok(mut state) = shared.try_borrow_mut()
            {
                state.listeners.retain(|l| l.id != id);
            }
        })
    }
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
