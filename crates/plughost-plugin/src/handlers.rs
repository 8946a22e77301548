//! Handler registry — (plugin id, event name) → callback, under one lock.
//!
//! Host-level handlers are registered under the privileged id `"host"`.
//! Registering the same (plugin id, event name) twice overwrites silently.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Trait for inbound request/notification handler implementations.
///
/// A handler failure is reported as a message string; the dispatcher
/// converts it into a protocol error reply and never lets it crash the host.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles an inbound request or notification payload.
    async fn handle(&self, params: Value) -> Result<Value, String>;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, String>> + Send,
{
    async fn handle(&self, params: Value) -> Result<Value, String> {
        (self.f)(params).await
    }
}

/// Wraps an async closure as an [`EventHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Registry of event handlers organized by owning plugin.
#[derive(Default)]
pub struct HandlerRegistry {
    /// Plugin id → event name → handler.
    handlers: RwLock<HashMap<String, HashMap<String, Arc<dyn EventHandler>>>>,
}

impl HandlerRegistry {
    /// Creates a new empty handler registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler; a prior handler for the same key is replaced.
    pub async fn register(&self, plugin_id: &str, event: &str, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        let replaced = handlers
            .entry(plugin_id.to_string())
            .or_default()
            .insert(event.to_string(), handler)
            .is_some();
        debug!(
            plugin_id = %plugin_id,
            event = %event,
            replaced = replaced,
            "Event handler registered"
        );
    }

    /// Looks up the handler for (plugin id, event name).
    pub async fn get(&self, plugin_id: &str, event: &str) -> Option<Arc<dyn EventHandler>> {
        let handlers = self.handlers.read().await;
        handlers.get(plugin_id).and_then(|t| t.get(event)).cloned()
    }

    /// Removes the entire handler table of a plugin.
    pub async fn unregister_plugin(&self, plugin_id: &str) {
        let mut handlers = self.handlers.write().await;
        if handlers.remove(plugin_id).is_some() {
            info!(plugin_id = %plugin_id, "All handlers unregistered for plugin");
        }
    }

    /// Every (plugin id, handler) pair registered for `event`, for broadcast
    /// delivery of untargeted notifications.
    pub async fn plugins_handling(&self, event: &str) -> Vec<(String, Arc<dyn EventHandler>)> {
        let handlers = self.handlers.read().await;
        handlers
            .iter()
            .filter_map(|(plugin_id, table)| {
                table
                    .get(event)
                    .map(|handler| (plugin_id.clone(), handler.clone()))
            })
            .collect()
    }

    /// Whether a plugin currently holds any handlers.
    pub async fn has_plugin(&self, plugin_id: &str) -> bool {
        self.handlers.read().await.contains_key(plugin_id)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry").finish()
    }
}
