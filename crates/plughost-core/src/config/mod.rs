//! Host configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section. Every field has a serde default so a partial file (or no file
//! at all) still yields a usable configuration; CLI flags override on top.

pub mod connection;
pub mod logging;
pub mod plugins;
pub mod rpc;

use serde::{Deserialize, Serialize};

use self::connection::ConnectionConfig;
use self::logging::LoggingConfig;
use self::plugins::PluginsConfig;
use self::rpc::RpcConfig;

use crate::error::HostError;

/// Root host configuration.
///
/// Top-level deserialization target for the TOML configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// WebSocket connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Plugin discovery and teardown settings.
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// RPC timeout and queue settings.
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HostConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, HostError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = HostConfig::default();
        assert_eq!(cfg.connection.host, "127.0.0.1");
        assert_eq!(cfg.connection.token, "plugin_host");
        assert_eq!(cfg.connection.connect_timeout_seconds, 15);
        assert_eq!(cfg.rpc.default_timeout_seconds, 10);
        assert_eq!(cfg.rpc.dialog_timeout_seconds, 600);
        assert_eq!(cfg.rpc.form_timeout_seconds, 1200);
        assert_eq!(cfg.plugins.directory, "./plugins");
    }
}
