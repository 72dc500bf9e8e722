#![forbid(unsafe_code)]

//! Named element-set methods contributed by plugins.
//!
//! A [`Plugin`] is a name plus an installer. The installer receives an
//! [`Extender`] and registers methods on it; [`PluginRegistry::install`]
//! then commits them all at once. Methods are called explicitly through the
//! registry, with `serde_json::Value` arguments and results.
//!
//! ```
//! use qdom_dom::{ElementSet, MemoryNode, Plugin, PluginRegistry};
//! use serde_json::{Value, json};
//!
//! let mut registry = PluginRegistry::<MemoryNode>::new();
//! registry
//!     .install(Plugin::new("count", |ext| {
//!         ext.extend("count", |set: &ElementSet<MemoryNode>, _args: &[Value]| {
//!             Ok(json!(set.len()))
//!         });
//!         Ok(())
//!     }))
//!     .unwrap();
//!
//! let set = ElementSet::new(vec![MemoryNode::new("li"), MemoryNode::new("li")]);
//! assert_eq!(registry.call(&set, "count", &[]).unwrap(), json!(2));
//! ```
//!
//! # Failure Modes
//!
//! - **Duplicate plugin**: rejected with [`PluginError::AlreadyInstalled`]
//!   and logged at `warn`.
//! - **Installer error**: rejected with [`PluginError::InstallFailed`] and
//!   logged at `error`; none of the plugin's methods are registered.
//! - **Method name clash**: rejected with [`PluginError::MethodConflict`];
//!   the registry is unchanged.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;

use crate::element_set::ElementSet;

/// Error type returned by installers and methods.
pub type BoxError = Box<dyn StdError + 'static>;

/// A registered element-set method.
pub type Method<N> = Rc<dyn Fn(&ElementSet<N>, &[Value]) -> Result<Value, BoxError>>;

type Installer<N> = Box<dyn Fn(&mut Extender<N>) -> Result<(), BoxError>>;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin \"{plugin}\" is already installed")]
    AlreadyInstalled { plugin: String },

    #[error("plugin \"{plugin}\" defines method \"{method}\", already provided by \"{owner}\"")]
    MethodConflict {
        plugin: String,
        method: String,
        owner: String,
    },

    #[error("failed to install plugin \"{plugin}\": {source}")]
    InstallFailed {
        plugin: String,
        #[source]
        source: BoxError,
    },

    #[error("no plugin method named \"{method}\"")]
    UnknownMethod { method: String },

    #[error("plugin method \"{method}\" failed: {source}")]
    MethodFailed {
        method: String,
        #[source]
        source: BoxError,
    },
}

/// A named bundle of element-set methods.
pub struct Plugin<N> {
    name: String,
    installer: Installer<N>,
}

impl<N> fmt::Debug for Plugin<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin").field("name", &self.name).finish()
    }
}

impl<N> Plugin<N> {
    pub fn new(
        name: impl Into<String>,
        installer: impl Fn(&mut Extender<N>) -> Result<(), BoxError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            installer: Box::new(installer),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Collects the methods a plugin's installer defines.
pub struct Extender<N> {
    methods: Vec<(String, Method<N>)>,
}

impl<N> Extender<N> {
    /// Define method `name`. A later definition with the same name replaces
    /// an earlier one from the same installer.
    pub fn extend(
        &mut self,
        name: impl Into<String>,
        method: impl Fn(&ElementSet<N>, &[Value]) -> Result<Value, BoxError> + 'static,
    ) -> &mut Self {
        let name = name.into();
        let method: Method<N> = Rc::new(method);
        if let Some(slot) = self.methods.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = method;
        } else {
            self.methods.push((name, method));
        }
        self
    }
}

struct Entry<N> {
    owner: String,
    method: Method<N>,
}

/// The set of installed plugins and the methods they provide.
pub struct PluginRegistry<N> {
    /// Installed plugin names, in install order.
    plugins: Vec<String>,
    methods: HashMap<String, Entry<N>>,
}

impl<N> Default for PluginRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> fmt::Debug for PluginRegistry<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        methods.sort_unstable();
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins)
            .field("methods", &methods)
            .finish()
    }
}

impl<N> PluginRegistry<N> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            methods: HashMap::new(),
        }
    }

    /// Run the plugin's installer and register its methods.
    ///
    /// # Errors
    ///
    /// [`PluginError::AlreadyInstalled`], [`PluginError::InstallFailed`] or
    /// [`PluginError::MethodConflict`]. On error nothing is registered.
    pub fn install(&mut self, plugin: Plugin<N>) -> Result<(), PluginError> {
        let Plugin { name, installer } = plugin;
        if self.is_installed(&name) {
            tracing::warn!(plugin = %name, "plugin is already installed");
            return Err(PluginError::AlreadyInstalled { plugin: name });
        }

        let mut extender = Extender {
            methods: Vec::new(),
        };
        if let Err(source) = installer(&mut extender) {
            tracing::error!(plugin = %name, error = %source, "failed to install plugin");
            return Err(PluginError::InstallFailed {
                plugin: name,
                source,
            });
        }

        if let Some((method, entry)) = extender
            .methods
            .iter()
            .find_map(|(method, _)| self.methods.get(method).map(|entry| (method, entry)))
        {
            tracing::warn!(plugin = %name, method = %method, owner = %entry.owner, "plugin method conflict");
            return Err(PluginError::MethodConflict {
                method: method.clone(),
                owner: entry.owner.clone(),
                plugin: name,
            });
        }

        let count = extender.methods.len();
        for (method, body) in extender.methods {
            self.methods.insert(
                method,
                Entry {
                    owner: name.clone(),
                    method: body,
                },
            );
        }
        tracing::debug!(plugin = %name, methods = count, "plugin installed");
        self.plugins.push(name);
        Ok(())
    }

    /// Call method `name` on `set`.
    ///
    /// # Errors
    ///
    /// [`PluginError::UnknownMethod`] when no installed plugin provides
    /// `name`; [`PluginError::MethodFailed`] when the method returns an
    /// error.
    pub fn call(&self, set: &ElementSet<N>, name: &str, args: &[Value]) -> Result<Value, PluginError> {
        let entry = self
            .methods
            .get(name)
            .ok_or_else(|| PluginError::UnknownMethod {
                method: name.to_owned(),
            })?;
        let method = Rc::clone(&entry.method);
        method(set, args).map_err(|source| PluginError::MethodFailed {
            method: name.to_owned(),
            source,
        })
    }

    /// Remove a plugin and its methods. Returns whether it was installed.
    pub fn uninstall(&mut self, name: &str) -> bool {
        let Some(pos) = self.plugins.iter().position(|p| p == name) else {
            return false;
        };
        self.plugins.remove(pos);
        self.methods.retain(|_, entry| entry.owner != name);
        tracing::debug!(plugin = name, "plugin uninstalled");
        true
    }

    #[must_use]
    pub fn is_installed(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p == name)
    }

    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Installed plugin names in install order.
    #[must_use]
    pub fn installed(&self) -> Vec<&str> {
        self.plugins.iter().map(String::as_str).collect()
    }

    /// Remove every plugin.
    pub fn clear(&mut self) {
        self.plugins.clear();
        self.methods.clear();
    }
}
