#![forbid(unsafe_code)]

use std::rc::Rc;

use qdom_dom::{DomNode, ElementSet};
use qdom_reactive::Subscription;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{EventTarget, HtmlElement, HtmlInputElement, HtmlSelectElement, HtmlTextAreaElement};

use crate::WebError;

/// A live browser element.
#[derive(Debug, Clone)]
pub struct WebNode {
    element: HtmlElement,
}

impl WebNode {
    #[must_use]
    pub fn new(element: HtmlElement) -> Self {
        Self { element }
    }

    #[must_use]
    pub fn element(&self) -> &HtmlElement {
        &self.element
    }
}

impl From<HtmlElement> for WebNode {
    fn from(element: HtmlElement) -> Self {
        Self::new(element)
    }
}

impl DomNode for WebNode {
    fn text_content(&self) -> String {
        self.element.text_content().unwrap_or_default()
    }

    fn set_text_content(&self, text: &str) {
        self.element.set_text_content(Some(text));
    }

    fn inner_html(&self) -> String {
        self.element.inner_html()
    }

    fn set_inner_html(&self, html: &str) {
        self.element.set_inner_html(html);
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.element.get_attribute(name)
    }

    fn set_attribute(&self, name: &str, value: &str) {
        if let Err(err) = self.element.set_attribute(name, value) {
            tracing::warn!(attribute = name, error = ?err, "set_attribute rejected");
        }
    }

    fn value(&self) -> Option<String> {
        if let Some(input) = self.element.dyn_ref::<HtmlInputElement>() {
            Some(input.value())
        } else if let Some(area) = self.element.dyn_ref::<HtmlTextAreaElement>() {
            Some(area.value())
        } else {
            self.element
                .dyn_ref::<HtmlSelectElement>()
                .map(HtmlSelectElement::value)
        }
    }

    fn set_value(&self, value: &str) {
        if let Some(input) = self.element.dyn_ref::<HtmlInputElement>() {
            input.set_value(value);
        } else if let Some(area) = self.element.dyn_ref::<HtmlTextAreaElement>() {
            area.set_value(value);
        } else if let Some(select) = self.element.dyn_ref::<HtmlSelectElement>() {
            select.set_value(value);
        }
    }

    fn is_connected(&self) -> bool {
        self.element.is_connected()
    }

    fn listen(&self, event: &str, handler: Rc<dyn Fn()>) -> Subscription {
        let closure = Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
            handler();
        });
        let target: EventTarget = self.element.clone().into();
        if let Err(err) =
            target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
        {
            tracing::warn!(event, error = ?err, "add_event_listener rejected");
            return Subscription::empty();
        }
        let listener = Listener {
            target,
            event: event.to_owned(),
            closure: Some(closure),
        };
        Subscription::new(move || listener.remove())
    }
}

/// Owns a registered JS callback. Removing it unregisters and frees the
/// callback; dropping it without removal (a detached subscription) leaks the
/// callback so the listener keeps working.
struct Listener {
    target: EventTarget,
    event: String,
    closure: Option<Closure<dyn FnMut(web_sys::Event)>>,
}

impl Listener {
    fn remove(mut self) {
        if let Some(closure) = self.closure.take() {
            let _ = self
                .target
                .remove_event_listener_with_callback(&self.event, closure.as_ref().unchecked_ref());
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure.forget();
        }
    }
}

/// Select every element matching `selector` in the current document.
///
/// # Errors
///
/// [`WebError::NoDocument`] outside a browser window;
/// [`WebError::InvalidSelector`] when the selector does not parse.
pub fn query_all(selector: &str) -> Result<ElementSet<WebNode>, WebError> {
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or(WebError::NoDocument)?;
    let list = document
        .query_selector_all(selector)
        .map_err(|err| WebError::InvalidSelector {
            selector: selector.to_owned(),
            message: err.as_string().unwrap_or_else(|| format!("{err:?}")),
        })?;
    let nodes = (0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|node| node.dyn_into::<HtmlElement>().ok())
        .map(WebNode::new)
        .collect();
    Ok(nodes)
}
