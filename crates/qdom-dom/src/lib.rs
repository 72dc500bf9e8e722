#![forbid(unsafe_code)]

//! DOM side of qdom: the node seam, element sets, reactive binders, and the
//! plugin registry.
//!
//! Binders are methods on [`ElementSet`]:
//!
//! ```
//! use qdom_dom::{DomNode, ElementSet, MemoryNode};
//! use qdom_reactive::Observable;
//!
//! let title = ElementSet::new(vec![MemoryNode::new("h1")]);
//! let text = Observable::new(String::from("Hello"));
//! let _binding = title.bind_text(&text);
//!
//! text.set("Bonjour".into());
//! assert_eq!(title.first().map(DomNode::text_content).as_deref(), Some("Bonjour"));
//! ```

pub mod binder;
pub mod element_set;
pub mod memory;
pub mod node;
pub mod plugin;

pub use element_set::ElementSet;
pub use memory::{MemoryNode, WriteCounts};
pub use node::{DomNode, INPUT_EVENT};
pub use plugin::{BoxError, Extender, Method, Plugin, PluginError, PluginRegistry};
