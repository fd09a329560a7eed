//! Name-to-handler task registry.
//!
//! Replaces decorator-based task registration (`@app.task`, relying on
//! module import order) with an explicit table built at construction,
//! per design note §9.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use envelope_codec::Payload;

/// A registered task handler. Implementations must be reentrant across
/// broker reconnects -- the transport may redeliver a message to a
/// fresh handler invocation at any time.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Run the task. Returning `Err` causes the message to be nacked
    /// and redelivered.
    async fn handle(&self, payload: Payload) -> anyhow::Result<()>;
}

/// `{name -> handler}`, populated once at construction and consulted
/// for every inbound message's task name.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TaskRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any prior handler of
    /// the same name.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Look up the handler registered for `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }
}
