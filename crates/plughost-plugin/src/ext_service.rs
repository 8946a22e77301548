//! Extension service directory — plugin-to-plugin capability sharing.
//!
//! A plugin registers an arbitrary service object under its own id; other
//! plugins look it up after their setup phase and call it directly
//! in-process. Entries are removed automatically when the owning plugin
//! unloads.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

/// A shared service instance registered by a plugin.
pub type ExtService = Arc<dyn Any + Send + Sync>;

/// Directory of extension services, keyed by owning plugin id.
#[derive(Default)]
pub struct ExtServiceDirectory {
    services: RwLock<HashMap<String, ExtService>>,
}

impl ExtServiceDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `instance` under `plugin_id`, replacing any prior registration.
    pub async fn register(&self, plugin_id: &str, instance: ExtService) {
        let mut services = self.services.write().await;
        services.insert(plugin_id.to_string(), instance);
        info!(plugin_id = %plugin_id, "Extension service registered");
    }

    /// Returns the service registered by `plugin_id`, if any.
    pub async fn lookup(&self, plugin_id: &str) -> Option<ExtService> {
        self.services.read().await.get(plugin_id).cloned()
    }

    /// Typed lookup; `None` when absent or when the stored instance is not `T`.
    pub async fn lookup_as<T: Any + Send + Sync>(&self, plugin_id: &str) -> Option<Arc<T>> {
        self.lookup(plugin_id)
            .await
            .and_then(|service| service.downcast::<T>().ok())
    }

    /// Removes the service of an unloading plugin. Returns whether one existed.
    pub async fn remove(&self, plugin_id: &str) -> bool {
        self.services.write().await.remove(plugin_id).is_some()
    }
}

impl std::fmt::Debug for ExtServiceDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtServiceDirectory").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Decryptor {
        key: u8,
    }

    #[tokio::test]
    async fn test_register_lookup_and_downcast() {
        let directory = ExtServiceDirectory::new();
        directory
            .register("temp_decrypt", Arc::new(Decryptor { key: 42 }))
            .await;

        let service = directory.lookup_as::<Decryptor>("temp_decrypt").await.unwrap();
        assert_eq!(service.key, 42);
        assert!(directory.lookup("ghost").await.is_none());
        assert!(directory.lookup_as::<String>("temp_decrypt").await.is_none());
    }

    #[tokio::test]
    async fn test_reregistration_overwrites() {
        let directory = ExtServiceDirectory::new();
        directory
            .register("temp_decrypt", Arc::new(Decryptor { key: 1 }))
            .await;
        directory
            .register("temp_decrypt", Arc::new(Decryptor { key: 2 }))
            .await;

        let service = directory.lookup_as::<Decryptor>("temp_decrypt").await.unwrap();
        assert_eq!(service.key, 2);
    }

    #[tokio::test]
    async fn test_remove_on_unload() {
        let directory = ExtServiceDirectory::new();
        directory
            .register("temp_decrypt", Arc::new(Decryptor { key: 1 }))
            .await;
        assert!(directory.remove("temp_decrypt").await);
        assert!(!directory.remove("temp_decrypt").await);
        assert!(directory.lookup("temp_decrypt").await.is_none());
    }
}
