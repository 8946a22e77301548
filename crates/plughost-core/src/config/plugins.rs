//! Plugin system configuration.

use serde::{Deserialize, Serialize};

/// Plugin discovery and teardown settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Root directory scanned for plugin subdirectories.
    #[serde(default = "default_plugins_directory")]
    pub directory: String,
    /// How long unload waits for a plugin's spawned tasks before warning
    /// about a leak. Tasks are never force-stopped.
    #[serde(default = "default_teardown_wait")]
    pub teardown_wait_seconds: u64,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directory: default_plugins_directory(),
            teardown_wait_seconds: default_teardown_wait(),
        }
    }
}

fn default_plugins_directory() -> String {
    "./plugins".to_string()
}

fn default_teardown_wait() -> u64 {
    5
}
