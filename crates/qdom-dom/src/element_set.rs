#![forbid(unsafe_code)]

//! A wrapped list of nodes.
//!
//! Getters read the first node; setters write every node and return `&Self`
//! so calls chain. An empty set reads as `None` and ignores writes.

use crate::node::DomNode;

/// An ordered set of DOM nodes.
#[derive(Debug, Clone)]
pub struct ElementSet<N> {
    nodes: Vec<N>,
}

impl<N> Default for ElementSet<N> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<N> FromIterator<N> for ElementSet<N> {
    fn from_iter<I: IntoIterator<Item = N>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

impl<N> From<Vec<N>> for ElementSet<N> {
    fn from(nodes: Vec<N>) -> Self {
        Self { nodes }
    }
}

impl<N: DomNode> ElementSet<N> {
    #[must_use]
    pub fn new(nodes: Vec<N>) -> Self {
        Self { nodes }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn first(&self) -> Option<&N> {
        self.nodes.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    /// Text content of the first node.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.first().map(DomNode::text_content)
    }

    pub fn set_text(&self, text: &str) -> &Self {
        for node in &self.nodes {
            node.set_text_content(text);
        }
        self
    }

    /// Inner markup of the first node.
    #[must_use]
    pub fn html(&self) -> Option<String> {
        self.first().map(DomNode::inner_html)
    }

    pub fn set_html(&self, html: &str) -> &Self {
        for node in &self.nodes {
            node.set_inner_html(html);
        }
        self
    }

    #[must_use]
    pub fn attr(&self, name: &str) -> Option<String> {
        self.first().and_then(|node| node.attribute(name))
    }

    pub fn set_attr(&self, name: &str, value: &str) -> &Self {
        for node in &self.nodes {
            node.set_attribute(name, value);
        }
        self
    }

    /// Form value of the first node.
    #[must_use]
    pub fn value(&self) -> Option<String> {
        self.first().and_then(DomNode::value)
    }

    pub fn set_value(&self, value: &str) -> &Self {
        for node in &self.nodes {
            node.set_value(value);
        }
        self
    }
}
