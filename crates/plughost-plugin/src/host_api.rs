//! Host command handlers — lifecycle operations the app invokes directly.
//!
//! Registered under the privileged `"host"` id, so they match before any
//! plugin handler regardless of the `pluginId` a request carries. Failures
//! of the underlying operation are reported as structured results, not as
//! protocol errors: the app asked a valid question and gets a valid answer.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{error, info};

use crate::handlers::{HandlerRegistry, handler_fn};
use crate::identity::HOST_ID;
use crate::registry::{PluginRegistry, UnloadOutcome};

/// Registers the host's lifecycle command handlers.
pub async fn register(registry: &Arc<PluginRegistry>, handlers: &Arc<HandlerRegistry>) {
    let scan_registry = registry.clone();
    handlers
        .register(
            HOST_ID,
            "scan_plugins",
            handler_fn(move |_params| {
                let registry = scan_registry.clone();
                async move {
                    let manifests = registry.scan();
                    serde_json::to_value(manifests).map_err(|e| e.to_string())
                }
            }),
        )
        .await;

    let load_registry = registry.clone();
    handlers
        .register(
            HOST_ID,
            "load_plugin",
            handler_fn(move |params| {
                let registry = load_registry.clone();
                async move {
                    let Some(id) = target_id(&params) else {
                        return Ok(json!({"error": "Missing plugin id"}));
                    };
                    match registry.load(&id).await {
                        Ok(()) => {
                            info!(plugin_id = %id, "Load command completed");
                            Ok(json!({"status": "ok", "id": id}))
                        }
                        Err(e) => {
                            error!(plugin_id = %id, error = %e, "Load command failed");
                            Ok(json!({"error": e.to_string(), "id": id}))
                        }
                    }
                }
            }),
        )
        .await;

    let unload_registry = registry.clone();
    handlers
        .register(
            HOST_ID,
            "unload_plugin",
            handler_fn(move |params| {
                let registry = unload_registry.clone();
                async move {
                    let Some(id) = target_id(&params) else {
                        return Ok(json!({"error": "Missing plugin id"}));
                    };
                    match registry.unload(&id).await {
                        Ok(UnloadOutcome::Unloaded) => Ok(json!({"status": "ok", "id": id})),
                        Ok(UnloadOutcome::NotFound) => {
                            Ok(json!({"status": "not_found", "id": id}))
                        }
                        Err(e) => {
                            error!(plugin_id = %id, error = %e, "Unload command failed");
                            Ok(json!({"error": e.to_string(), "id": id}))
                        }
                    }
                }
            }),
        )
        .await;

    let status_registry = registry.clone();
    handlers
        .register(
            HOST_ID,
            "loaded_plugins",
            handler_fn(move |_params| {
                let registry = status_registry.clone();
                async move { Ok(Value::Array(registry.loaded_info().await)) }
            }),
        )
        .await;
}

/// The plugin id a lifecycle command addresses. Commands name their target
/// in `id`; the transport-level `pluginId` key identifies the caller, not
/// the target, and is ignored here.
fn target_id(params: &Value) -> Option<String> {
    params
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext_service::ExtServiceDirectory;
    use crate::loader::{EntryLoader, PluginEntry};
    use crate::{PluginContext, manifest::MANIFEST_FILE};
    use async_trait::async_trait;
    use plughost_core::HostResult;
    use plughost_core::config::rpc::RpcConfig;
    use plughost_rpc::{CorrelationTable, OutboundSender, RpcClient};
    use std::path::Path;
    use std::time::Duration;

    struct NoopEntry;

    #[async_trait]
    impl PluginEntry for NoopEntry {
        async fn setup(&self, _context: Arc<PluginContext>) -> Result<(), String> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct NoopLoader;

    impl EntryLoader for NoopLoader {
        fn load_entry(&self, _: &str, _: &Path) -> HostResult<Arc<dyn PluginEntry>> {
            Ok(Arc::new(NoopEntry))
        }
    }

    async fn host_setup(root: &Path) -> (Arc<PluginRegistry>, Arc<HandlerRegistry>) {
        let (outbound, _rx) = OutboundSender::pair(16);
        let rpc = Arc::new(RpcClient::new(
            outbound,
            Arc::new(CorrelationTable::new()),
            RpcConfig::default(),
        ));
        let handlers = Arc::new(HandlerRegistry::new());
        let registry = Arc::new(PluginRegistry::new(
            root.to_path_buf(),
            Arc::new(NoopLoader),
            rpc,
            handlers.clone(),
            Arc::new(ExtServiceDirectory::new()),
            Duration::from_millis(100),
        ));
        register(&registry, &handlers).await;
        (registry, handlers)
    }

    fn plugin_dir(root: &Path, folder: &str, id: &str) {
        let dir = root.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), format!(r#"{{"id": "{id}"}}"#)).unwrap();
    }

    #[tokio::test]
    async fn test_scan_command_reports_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        plugin_dir(tmp.path(), "subtitle_exporter", "exporter");
        let (_, handlers) = host_setup(tmp.path()).await;

        let handler = handlers.get(HOST_ID, "scan_plugins").await.unwrap();
        let result = handler.handle(Value::Null).await.unwrap();
        assert_eq!(result[0]["id"], "exporter");
        assert_eq!(result[0]["folderName"], "subtitle_exporter");
    }

    #[tokio::test]
    async fn test_load_command_reports_structured_error_for_ghost() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, handlers) = host_setup(tmp.path()).await;

        let handler = handlers.get(HOST_ID, "load_plugin").await.unwrap();
        let result = handler.handle(json!({"id": "ghost"})).await.unwrap();
        assert!(result["error"].as_str().unwrap().contains("ghost"));

        let result = handler.handle(json!({})).await.unwrap();
        assert_eq!(result["error"], "Missing plugin id");
    }

    #[tokio::test]
    async fn test_load_and_unload_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        plugin_dir(tmp.path(), "subtitle_exporter", "exporter");
        let (registry, handlers) = host_setup(tmp.path()).await;

        let load = handlers.get(HOST_ID, "load_plugin").await.unwrap();
        let result = load.handle(json!({"id": "exporter"})).await.unwrap();
        assert_eq!(result["status"], "ok");
        assert!(registry.is_loaded("exporter").await);

        let unload = handlers.get(HOST_ID, "unload_plugin").await.unwrap();
        let result = unload.handle(json!({"id": "exporter"})).await.unwrap();
        assert_eq!(result["status"], "ok");
        assert!(!registry.is_loaded("exporter").await);

        let result = unload.handle(json!({"id": "exporter"})).await.unwrap();
        assert_eq!(result["status"], "not_found");
    }

    #[tokio::test]
    async fn test_target_id_ignores_caller_plugin_id() {
        assert_eq!(
            target_id(&json!({"id": "exporter", "pluginId": "host"})),
            Some("exporter".to_string())
        );
        assert_eq!(target_id(&json!({"pluginId": "host"})), None);
        assert_eq!(target_id(&json!({"id": ""})), None);
    }
}
