//! Capability registry: name -> handler, validated at registration time

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Schema of a capability the model may invoke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDeclaration {
    /// Unique name
    pub name: String,

    /// What the capability does, shown to the model
    pub description: String,

    /// JSON schema of the argument object
    pub parameters: serde_json::Value,
}

/// A model's request to run a capability
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityInvocation {
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl CapabilityInvocation {
    /// Build an invocation from any JSON value; non-objects become empty args
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        let arguments = match arguments {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Executes one capability
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Declaration passed to every model call
    fn declaration(&self) -> CapabilityDeclaration;

    /// Run with the model-supplied arguments, producing text to speak
    ///
    /// # Errors
    ///
    /// Returns error if the arguments do not match the declared schema
    async fn call(&self, arguments: serde_json::Map<String, serde_json::Value>) -> Result<String>;
}

/// Registered capabilities, built once at startup
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
    order: Vec<String>,
}

impl CapabilityRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its declared name
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty or already registered
    pub fn register(&mut self, handler: Arc<dyn CapabilityHandler>) -> Result<()> {
        let name = handler.declaration().name;
        if name.trim().is_empty() {
            return Err(Error::Capability("capability name must not be empty".to_string()));
        }
        if self.handlers.contains_key(&name) {
            return Err(Error::Capability(format!("duplicate capability: {name}")));
        }

        tracing::debug!(capability = %name, "registered capability");
        self.order.push(name.clone());
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Declarations in registration order
    #[must_use]
    pub fn declarations(&self) -> Vec<CapabilityDeclaration> {
        self.order
            .iter()
            .filter_map(|name| self.handlers.get(name))
            .map(|handler| handler.declaration())
            .collect()
    }

    /// Look up a handler
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn CapabilityHandler>> {
        self.handlers.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.order)
            .finish()
    }
}
