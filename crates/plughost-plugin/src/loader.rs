//! Entry-point loading — the seam between the registry and plugin code.
//!
//! The production loader reads the plugin's shared library with
//! `libloading` (feature-gated). Tests and embedders inject their own
//! [`EntryLoader`] to supply compiled-in entry points.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use plughost_core::HostResult;

use crate::context::PluginContext;

/// Contract every plugin entry point implements.
///
/// `setup` runs once per load (and again on each hot reload) against a
/// fresh context. Handlers, teardown callbacks, and extension services are
/// all registered from here.
#[async_trait]
pub trait PluginEntry: Send + Sync {
    /// Initializes the plugin against its context.
    async fn setup(&self, context: Arc<PluginContext>) -> Result<(), String>;
}

/// Resolves and loads the entry point inside a plugin directory.
pub trait EntryLoader: Send + Sync + std::fmt::Debug {
    /// Loads the entry point for `plugin_id` from `dir`.
    ///
    /// A missing entry-point file is a NotFound error; a file that exists
    /// but exposes no setup hook is a Setup error.
    fn load_entry(&self, plugin_id: &str, dir: &Path) -> HostResult<Arc<dyn PluginEntry>>;
}

/// Dynamic loader backed by `libloading` (feature-gated).
#[cfg(feature = "dynamic")]
pub mod dynamic_loader {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use tracing::info;

    use plughost_core::{HostError, HostResult};

    use super::{EntryLoader, PluginEntry};

    /// Platform file name of a plugin's entry-point library.
    #[cfg(target_os = "windows")]
    pub const ENTRY_FILE: &str = "plugin.dll";
    /// Platform file name of a plugin's entry-point library.
    #[cfg(target_os = "macos")]
    pub const ENTRY_FILE: &str = "libplugin.dylib";
    /// Platform file name of a plugin's entry-point library.
    #[cfg(all(unix, not(target_os = "macos")))]
    pub const ENTRY_FILE: &str = "libplugin.so";

    /// Symbol a plugin library must export:
    /// `extern "C" fn plugin_entry() -> *mut dyn PluginEntry`
    pub type PluginEntryFn = unsafe extern "C" fn() -> *mut dyn PluginEntry;

    /// Loads plugin entry points from shared libraries.
    ///
    /// Loaded libraries are kept alive for the lifetime of the loader;
    /// reloading an id reads the library again so updated code takes effect.
    pub struct DynamicEntryLoader {
        libraries: Mutex<Vec<libloading::Library>>,
    }

    impl DynamicEntryLoader {
        /// Creates a new dynamic loader.
        pub fn new() -> Self {
            Self {
                libraries: Mutex::new(Vec::new()),
            }
        }
    }

    impl Default for DynamicEntryLoader {
        fn default() -> Self {
            Self::new()
        }
    }

    impl EntryLoader for DynamicEntryLoader {
        fn load_entry(&self, plugin_id: &str, dir: &Path) -> HostResult<Arc<dyn PluginEntry>> {
            let path = dir.join(ENTRY_FILE);
            if !path.is_file() {
                let files: Vec<String> = std::fs::read_dir(dir)
                    .map(|entries| {
                        entries
                            .flatten()
                            .map(|e| e.file_name().to_string_lossy().to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                return Err(HostError::not_found(format!(
                    "Plugin entry point '{}' not found in: {}. Files found: {:?}",
                    ENTRY_FILE,
                    dir.display(),
                    files
                )));
            }

            // Safety: plugin libraries are arbitrary code. Only trusted
            // plugin directories may be configured as the plugins root.
            unsafe {
                let library = libloading::Library::new(&path).map_err(|e| {
                    HostError::plugin(format!(
                        "Failed to load plugin library '{}': {}",
                        path.display(),
                        e
                    ))
                })?;

                let entry_fn: libloading::Symbol<PluginEntryFn> =
                    library.get(b"plugin_entry").map_err(|e| {
                        HostError::setup(format!(
                            "Plugin '{}' has no 'plugin_entry' symbol: {}",
                            plugin_id, e
                        ))
                    })?;

                let entry = Arc::from_raw(entry_fn());

                info!(
                    plugin_id = %plugin_id,
                    path = %path.display(),
                    "Dynamic entry point loaded"
                );

                let mut libraries = self
                    .libraries
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                libraries.push(library);

                Ok(entry)
            }
        }
    }

    impl std::fmt::Debug for DynamicEntryLoader {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let count = self
                .libraries
                .lock()
                .map(|libs| libs.len())
                .unwrap_or_default();
            f.debug_struct("DynamicEntryLoader")
                .field("loaded_count", &count)
                .finish()
        }
    }
}

/// Stub loader when the dynamic feature is not enabled.
#[cfg(not(feature = "dynamic"))]
pub mod dynamic_loader {
    use std::path::Path;
    use std::sync::Arc;

    use plughost_core::{HostError, HostResult};

    use super::{EntryLoader, PluginEntry};

    /// Stub dynamic loader; every load fails with a configuration error.
    #[derive(Debug, Default)]
    pub struct DynamicEntryLoader;

    impl DynamicEntryLoader {
        /// Creates a stub loader.
        pub fn new() -> Self {
            Self
        }
    }

    impl EntryLoader for DynamicEntryLoader {
        fn load_entry(&self, plugin_id: &str, _dir: &Path) -> HostResult<Arc<dyn PluginEntry>> {
            Err(HostError::configuration(format!(
                "Cannot load plugin '{}': built without the 'dynamic' feature",
                plugin_id
            )))
        }
    }
}

pub use dynamic_loader::DynamicEntryLoader;
