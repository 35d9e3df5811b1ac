use bach_core::store::{InMemoryTaskStore, TaskStore};
use bach_core::PluginRegistry;
use std::sync::Arc;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<PluginRegistry>,
    pub store: Arc<dyn TaskStore>,
}

impl AppState {
    pub fn new(registry: Arc<PluginRegistry>, store: Arc<dyn TaskStore>) -> Self {
        Self { registry, store }
    }

    /// Built-in plugins and an in-memory task store.
    pub fn in_memory() -> bach_core::Result<Self> {
        Ok(Self::new(
            Arc::new(PluginRegistry::builtin()?),
            Arc::new(InMemoryTaskStore::new()),
        ))
    }
}
