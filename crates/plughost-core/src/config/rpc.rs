//! Outbound RPC configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeouts applied to outbound calls to the controlling app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Default timeout for one-shot status calls.
    #[serde(default = "default_call_timeout")]
    pub default_timeout_seconds: u64,
    /// Timeout for interactive dialogs (alert, confirm, prompt, pickers).
    #[serde(default = "default_dialog_timeout")]
    pub dialog_timeout_seconds: u64,
    /// Timeout for custom form rendering, which can stay open a long time.
    #[serde(default = "default_form_timeout")]
    pub form_timeout_seconds: u64,
}

impl RpcConfig {
    /// Default timeout as a [`Duration`].
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_seconds)
    }

    /// Interactive dialog timeout as a [`Duration`].
    pub fn dialog_timeout(&self) -> Duration {
        Duration::from_secs(self.dialog_timeout_seconds)
    }

    /// Custom form timeout as a [`Duration`].
    pub fn form_timeout(&self) -> Duration {
        Duration::from_secs(self.form_timeout_seconds)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: default_call_timeout(),
            dialog_timeout_seconds: default_dialog_timeout(),
            form_timeout_seconds: default_form_timeout(),
        }
    }
}

fn default_call_timeout() -> u64 {
    10
}

fn default_dialog_timeout() -> u64 {
    600
}

fn default_form_timeout() -> u64 {
    1200
}
