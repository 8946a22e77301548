//! WebSocket connection configuration.

use serde::{Deserialize, Serialize};

/// Settings for the single WebSocket connection to the controlling app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Host the app's WebSocket server listens on.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the app's WebSocket server listens on.
    #[serde(default)]
    pub port: u16,
    /// Opaque token appended to the connection URL, checked by the app.
    #[serde(default = "default_token")]
    pub token: String,
    /// How long to wait for the connection to open before failing.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Bound of the inbound frame queue between the read loop and dispatcher.
    #[serde(default = "default_queue_size")]
    pub inbound_queue_size: usize,
    /// Bound of the outbound frame queue drained by the single writer task.
    #[serde(default = "default_queue_size")]
    pub outbound_queue_size: usize,
}

impl ConnectionConfig {
    /// The WebSocket URL this configuration connects to.
    pub fn url(&self) -> String {
        format!("ws://{}:{}/?token={}", self.host, self.port, self.token)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            token: default_token(),
            connect_timeout_seconds: default_connect_timeout(),
            inbound_queue_size: default_queue_size(),
            outbound_queue_size: default_queue_size(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_token() -> String {
    "plugin_host".to_string()
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_queue_size() -> usize {
    256
}
