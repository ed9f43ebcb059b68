//! Custom action handlers.
//!
//! Metadata may declare an action with a `handler` name instead of a url. The
//! handler is looked up here when the registry is built, never at call time:
//! a definition that names an unregistered handler fails registry setup.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use reclist_core::{MassActionError, RegistryError, TargetSpec};

/// Arguments passed to a handler when its action runs.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerRequest {
    pub entity_type: String,
    pub action: String,
    pub params: TargetSpec,
}

/// A registered implementation of one or more metadata-declared actions.
pub trait ActionHandler: Send + Sync {
    /// Deferred initialisation named by a definition's `initFunction`.
    ///
    /// The registry is not finalised until every scheduled init resolves.
    fn init(&self, function: &str) -> BoxFuture<'static, Result<(), MassActionError>>;

    fn run(&self, request: HandlerRequest) -> BoxFuture<'static, Result<(), MassActionError>>;
}

/// Handlers keyed by the name used in `massActionDefs.{action}.handler`.
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ActionHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler. Names are unique.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&name) {
            return Err(RegistryError::DuplicateHandler(name));
        }
        tracing::debug!("Registered action handler '{}'", name);
        handlers.insert(name, handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    pub fn count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
