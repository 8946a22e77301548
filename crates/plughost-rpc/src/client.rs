//! Outbound RPC client — issues calls and notifications on behalf of plugins.
//!
//! Every call registers a correlation entry before the frame leaves the
//! host, then awaits the matching response. Awaiting blocks only the
//! calling task; the dispatch loop is never involved in waiting.

use std::time::Duration;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use plughost_core::config::rpc::RpcConfig;
use plughost_core::{HostError, HostResult};

use crate::correlation::CorrelationTable;
use crate::frame::{self, Frame};
use crate::transport::OutboundSender;

use std::sync::Arc;

/// Client for plugin-initiated calls to the controlling app.
#[derive(Debug, Clone)]
pub struct RpcClient {
    outbound: OutboundSender,
    correlation: Arc<CorrelationTable>,
    config: RpcConfig,
}

impl RpcClient {
    /// Creates a client over the given transport and correlation table.
    pub fn new(
        outbound: OutboundSender,
        correlation: Arc<CorrelationTable>,
        config: RpcConfig,
    ) -> Self {
        Self {
            outbound,
            correlation,
            config,
        }
    }

    /// Issues a request attributed to `plugin_id` and awaits the response.
    ///
    /// On timeout the correlation entry is removed, so a late response is
    /// dropped rather than misrouted. An error-shaped response surfaces as
    /// an RPC error carrying the remote message.
    pub async fn call(
        &self,
        plugin_id: &str,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> HostResult<Value> {
        let params = frame::merge_plugin_id(params, plugin_id)?;
        let id = Uuid::new_v4().to_string();
        let text = serde_json::to_string(&Frame::request(&id, method, params))?;

        // Register only once the frame is ready to leave; an entry without a
        // frame on the wire could never be resolved.
        let receiver = self.correlation.register(&id).await;
        if let Err(e) = self.outbound.send(text).await {
            self.correlation.remove(&id).await;
            return Err(e);
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(HostError::connection(
                "request abandoned before a response arrived",
            )),
            Err(_) => {
                self.correlation.remove(&id).await;
                Err(HostError::timeout(format!(
                    "app did not respond to '{}' within {}s",
                    method,
                    timeout.as_secs()
                )))
            }
        }
    }

    /// [`call`](Self::call) with the configured default timeout.
    pub async fn call_default(
        &self,
        plugin_id: &str,
        method: &str,
        params: Option<Value>,
    ) -> HostResult<Value> {
        self.call(plugin_id, method, params, self.config.default_timeout())
            .await
    }

    /// Sends a fire-and-forget notification attributed to `plugin_id`.
    ///
    /// No correlation entry is registered and delivery failures are only
    /// logged; the caller never learns about them.
    pub async fn notify(&self, plugin_id: &str, method: &str, params: Option<Value>) {
        let params = match frame::merge_plugin_id(params, plugin_id) {
            Ok(p) => p,
            Err(e) => {
                warn!(plugin_id = %plugin_id, method = %method, error = %e, "Invalid notification params");
                return;
            }
        };
        let text = match serde_json::to_string(&Frame::notification(method, params)) {
            Ok(t) => t,
            Err(e) => {
                warn!(method = %method, error = %e, "Failed to serialize notification");
                return;
            }
        };
        if let Err(e) = self.outbound.send(text).await {
            warn!(plugin_id = %plugin_id, method = %method, error = %e, "Notification send failed");
        }
    }

    /// The timeout configuration this client was built with.
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client_with_loopback() -> (RpcClient, tokio::sync::mpsc::Receiver<String>) {
        let (outbound, rx) = OutboundSender::pair(16);
        let table = Arc::new(CorrelationTable::new());
        (
            RpcClient::new(outbound, table, RpcConfig::default()),
            rx,
        )
    }

    #[tokio::test]
    async fn test_call_registers_and_sends_request_frame() {
        let (outbound, mut rx) = OutboundSender::pair(16);
        let table = Arc::new(CorrelationTable::new());
        let client = RpcClient::new(outbound, table.clone(), RpcConfig::default());

        let call = tokio::spawn({
            let client = client.clone();
            async move {
                client
                    .call("exporter", "get_clipboard", None, Duration::from_secs(5))
                    .await
            }
        });

        let sent = rx.recv().await.unwrap();
        let frame: Frame = serde_json::from_str(&sent).unwrap();
        assert_eq!(frame.method.as_deref(), Some("get_clipboard"));
        assert_eq!(frame.param_plugin_id(), Some("exporter"));
        let id = frame.id.unwrap();

        assert!(table.resolve(&id, Ok(json!("clipboard text"))).await);
        assert_eq!(call.await.unwrap().unwrap(), json!("clipboard text"));
    }

    #[tokio::test]
    async fn test_call_times_out_and_removes_entry() {
        let (outbound, mut rx) = OutboundSender::pair(16);
        let table = Arc::new(CorrelationTable::new());
        let client = RpcClient::new(outbound, table.clone(), RpcConfig::default());

        let err = client
            .call("exporter", "slow_op", None, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.kind, plughost_core::error::ErrorKind::Timeout);

        // The entry is gone; a late response is dropped silently.
        let sent = rx.recv().await.unwrap();
        let frame: Frame = serde_json::from_str(&sent).unwrap();
        assert!(!table.resolve(&frame.id.unwrap(), Ok(json!(1))).await);
    }

    #[tokio::test]
    async fn test_invalid_params_leave_no_correlation_entry() {
        let (outbound, _rx) = OutboundSender::pair(16);
        let table = Arc::new(CorrelationTable::new());
        let client = RpcClient::new(outbound, table.clone(), RpcConfig::default());

        let err = client
            .call("exporter", "navigate_to", Some(json!([1])), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind, plughost_core::error::ErrorKind::Validation);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_notify_sends_without_correlation_entry() {
        let (client, mut rx) = client_with_loopback();
        client
            .notify("exporter", "show_log_dialog", Some(json!({"clear": true})))
            .await;

        let sent = rx.recv().await.unwrap();
        let frame: Frame = serde_json::from_str(&sent).unwrap();
        assert!(frame.id.is_none());
        assert_eq!(frame.method.as_deref(), Some("show_log_dialog"));
        assert_eq!(frame.param_plugin_id(), Some("exporter"));
    }
}
