//! Plugin registry — load, hot reload, and unload of plugin code.
//!
//! The registry owns every loaded plugin's record and the module table.
//! Module handles are keyed by derived module name and are reused across
//! hot reloads, so the identity of a plugin's module is stable for the
//! lifetime of the host process; reloading swaps the entry point inside the
//! existing handle and bumps its generation. Unloading a plugin removes its
//! record but leaves the module handle in the table.
//!
//! Load and unload are serialized behind a single lifecycle lock: handler
//! tasks issue them concurrently, and interleaving two lifecycle operations
//! for one id would orphan a running context or double-install a module.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use plughost_core::{HostError, HostResult};
use plughost_rpc::RpcClient;

use crate::context::PluginContext;
use crate::discovery;
use crate::ext_service::ExtServiceDirectory;
use crate::handlers::HandlerRegistry;
use crate::identity;
use crate::loader::{EntryLoader, PluginEntry};
use crate::manifest::Manifest;

/// A loaded plugin module with stable identity across hot reloads.
///
/// The handle itself is created once per module name; reloads replace the
/// entry point behind it and bump the generation counter.
pub struct ModuleHandle {
    module_name: String,
    generation: AtomicU64,
    entry: std::sync::RwLock<Arc<dyn PluginEntry>>,
}

impl ModuleHandle {
    fn new(module_name: String, entry: Arc<dyn PluginEntry>) -> Self {
        Self {
            module_name,
            generation: AtomicU64::new(1),
            entry: std::sync::RwLock::new(entry),
        }
    }

    /// Derived module name, e.g. `plugin_subtitle_exporter`.
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// How many times this module has been (re)loaded.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// The current entry point.
    pub fn entry(&self) -> Arc<dyn PluginEntry> {
        self.entry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn replace_entry(&self, entry: Arc<dyn PluginEntry>) -> u64 {
        let mut slot = self
            .entry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = entry;
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("module_name", &self.module_name)
            .field("generation", &self.generation())
            .finish()
    }
}

/// Bookkeeping for one currently loaded plugin.
struct PluginRecord {
    directory: PathBuf,
    module: Arc<ModuleHandle>,
    context: Arc<PluginContext>,
    loaded_at: DateTime<Utc>,
}

/// Result of an unload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadOutcome {
    /// The plugin was loaded and has been torn down.
    Unloaded,
    /// No plugin with that id was loaded.
    NotFound,
}

/// Registry of loaded plugins and their modules.
pub struct PluginRegistry {
    root: PathBuf,
    loader: Arc<dyn EntryLoader>,
    rpc: Arc<RpcClient>,
    handlers: Arc<HandlerRegistry>,
    services: Arc<ExtServiceDirectory>,
    teardown_wait: Duration,
    /// Serializes load/unload; lifecycle paths are not reentrant.
    lifecycle: Mutex<()>,
    modules: RwLock<HashMap<String, Arc<ModuleHandle>>>,
    plugins: RwLock<HashMap<String, PluginRecord>>,
}

impl PluginRegistry {
    /// Creates a registry rooted at the plugins directory.
    pub fn new(
        root: PathBuf,
        loader: Arc<dyn EntryLoader>,
        rpc: Arc<RpcClient>,
        handlers: Arc<HandlerRegistry>,
        services: Arc<ExtServiceDirectory>,
        teardown_wait: Duration,
    ) -> Self {
        Self {
            root,
            loader,
            rpc,
            handlers,
            services,
            teardown_wait,
            lifecycle: Mutex::new(()),
            modules: RwLock::new(HashMap::new()),
            plugins: RwLock::new(HashMap::new()),
        }
    }

    /// Module name derived from a plugin id. Spaces and hyphens map to
    /// underscores so the name stays a valid identifier.
    pub fn module_name_for(plugin_id: &str) -> String {
        format!("plugin_{}", plugin_id.replace([' ', '-'], "_"))
    }

    /// Scans the plugins root and returns every recognized manifest.
    pub fn scan(&self) -> Vec<Manifest> {
        discovery::scan(&self.root)
    }

    /// Whether a plugin is currently loaded.
    pub async fn is_loaded(&self, plugin_id: &str) -> bool {
        self.plugins.read().await.contains_key(plugin_id)
    }

    /// The module handle for a plugin id, if the module was ever loaded.
    /// Survives unload; reused on reload.
    pub async fn module_handle(&self, plugin_id: &str) -> Option<Arc<ModuleHandle>> {
        let name = Self::module_name_for(plugin_id);
        self.modules.read().await.get(&name).cloned()
    }

    /// Loads a plugin by id, or hot-reloads it when already loaded.
    ///
    /// A reload tears down the old instance first (callbacks, handlers,
    /// extension service, tracked tasks), then runs `setup` on the freshly
    /// loaded entry point against a new context. Waits for any in-flight
    /// lifecycle operation before starting.
    pub async fn load(&self, plugin_id: &str) -> HostResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        identity::scope(plugin_id.to_string(), self.load_inner(plugin_id)).await
    }

    async fn load_inner(&self, plugin_id: &str) -> HostResult<()> {
        let dir = discovery::resolve_dir(&self.root, plugin_id).ok_or_else(|| {
            HostError::not_found(format!(
                "Plugin '{}' not found under {}. Folders present: {:?}",
                plugin_id,
                self.root.display(),
                discovery::list_folder_names(&self.root)
            ))
        })?;

        // Hot reload: retire the previous instance before its replacement
        // touches any shared registry.
        let previous = self.plugins.write().await.remove(plugin_id);
        if let Some(record) = previous {
            info!(plugin_id = %plugin_id, "Reloading plugin, tearing down old instance");
            self.teardown_record(plugin_id, record).await;
        }

        let entry = self.loader.load_entry(plugin_id, &dir)?;
        let module = self.install_module(plugin_id, entry).await;

        let context = Arc::new(PluginContext::new(
            plugin_id,
            self.rpc.clone(),
            self.handlers.clone(),
            self.services.clone(),
        ));

        context.mark_initializing(true);
        let setup = AssertUnwindSafe(module.entry().setup(context.clone()))
            .catch_unwind()
            .await;
        context.mark_initializing(false);

        match setup {
            Ok(Ok(())) => {}
            Ok(Err(message)) => {
                self.cleanup_failed_setup(plugin_id, &context).await;
                return Err(HostError::setup(format!(
                    "Plugin '{plugin_id}' setup failed: {message}"
                )));
            }
            Err(_) => {
                self.cleanup_failed_setup(plugin_id, &context).await;
                return Err(HostError::setup(format!(
                    "Plugin '{plugin_id}' setup panicked"
                )));
            }
        }

        let mut plugins = self.plugins.write().await;
        plugins.insert(
            plugin_id.to_string(),
            PluginRecord {
                directory: dir.clone(),
                module: module.clone(),
                context,
                loaded_at: Utc::now(),
            },
        );
        info!(
            plugin_id = %plugin_id,
            directory = %dir.display(),
            module = %module.module_name(),
            generation = module.generation(),
            "Plugin loaded"
        );
        Ok(())
    }

    /// Unloads a plugin: runs its teardown callbacks, removes its handlers
    /// and extension service, cancels its tasks, and waits a bounded time
    /// for them to finish. Tasks still alive after the wait are reported as
    /// leaks and left running. Waits for any in-flight lifecycle operation
    /// before starting.
    pub async fn unload(&self, plugin_id: &str) -> HostResult<UnloadOutcome> {
        let _lifecycle = self.lifecycle.lock().await;
        let record = self.plugins.write().await.remove(plugin_id);
        let Some(record) = record else {
            warn!(plugin_id = %plugin_id, "Unload requested for plugin that is not loaded");
            return Ok(UnloadOutcome::NotFound);
        };

        identity::scope(plugin_id.to_string(), self.teardown_record(plugin_id, record)).await;
        info!(plugin_id = %plugin_id, "Plugin unloaded");
        Ok(UnloadOutcome::Unloaded)
    }

    /// One entry per loaded plugin, for status listings.
    pub async fn loaded_info(&self) -> Vec<serde_json::Value> {
        let plugins = self.plugins.read().await;
        let mut info: Vec<serde_json::Value> = plugins
            .iter()
            .map(|(id, record)| {
                serde_json::json!({
                    "id": id,
                    "directory": record.directory.display().to_string(),
                    "module": record.module.module_name(),
                    "generation": record.module.generation(),
                    "loadedAt": record.loaded_at.to_rfc3339(),
                })
            })
            .collect();
        info.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));
        info
    }

    async fn install_module(
        &self,
        plugin_id: &str,
        entry: Arc<dyn PluginEntry>,
    ) -> Arc<ModuleHandle> {
        let name = Self::module_name_for(plugin_id);
        let mut modules = self.modules.write().await;
        match modules.get(&name) {
            Some(handle) => {
                let generation = handle.replace_entry(entry);
                info!(module = %name, generation = generation, "Module entry replaced");
                handle.clone()
            }
            None => {
                let handle = Arc::new(ModuleHandle::new(name.clone(), entry));
                modules.insert(name, handle.clone());
                handle
            }
        }
    }

    async fn teardown_record(&self, plugin_id: &str, record: PluginRecord) {
        record.context.begin_teardown();

        for callback in record.context.take_teardown_callbacks() {
            match std::panic::catch_unwind(AssertUnwindSafe(callback)) {
                Ok(Ok(())) => {}
                Ok(Err(message)) => {
                    warn!(plugin_id = %plugin_id, error = %message, "Teardown callback failed")
                }
                Err(_) => {
                    error!(plugin_id = %plugin_id, "Teardown callback panicked")
                }
            }
        }

        self.handlers.unregister_plugin(plugin_id).await;
        self.services.remove(plugin_id).await;
        record.context.cancellation_token().cancel();

        let deadline = tokio::time::Instant::now() + self.teardown_wait;
        let mut leaked = 0usize;
        for handle in record.context.take_tasks() {
            if handle.is_finished() {
                continue;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            // A handle dropped on timeout detaches; the task keeps running.
            if tokio::time::timeout(remaining, handle).await.is_err() {
                leaked += 1;
            }
        }
        if leaked > 0 {
            warn!(
                plugin_id = %plugin_id,
                leaked = leaked,
                "Plugin tasks still running after teardown wait; leaving them to finish"
            );
        }
    }

    async fn cleanup_failed_setup(&self, plugin_id: &str, context: &Arc<PluginContext>) {
        context.begin_teardown();
        self.handlers.unregister_plugin(plugin_id).await;
        self.services.remove(plugin_id).await;
        context.cancellation_token().cancel();
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("root", &self.root)
            .field("loader", &self.loader)
            .finish()
    }
}
