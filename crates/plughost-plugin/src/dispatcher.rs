//! Inbound frame dispatcher — the single consumer of the reader channel.
//!
//! Classifies each frame by shape and fans work out: requests and
//! notifications run their handlers in spawned tasks so a slow handler
//! never stalls the loop, responses resolve the correlation table inline.
//! A handler failure or panic becomes an error reply; it never takes the
//! loop down.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use plughost_core::HostError;
use plughost_rpc::{CorrelationTable, Frame, FrameKind, OutboundSender, RpcError};

use crate::handlers::{EventHandler, HandlerRegistry};
use crate::identity;

/// Routes inbound frames to handlers and waiting callers.
#[derive(Clone)]
pub struct Dispatcher {
    handlers: Arc<HandlerRegistry>,
    correlation: Arc<CorrelationTable>,
    outbound: OutboundSender,
}

impl Dispatcher {
    /// Creates a dispatcher over the shared registries and transport.
    pub fn new(
        handlers: Arc<HandlerRegistry>,
        correlation: Arc<CorrelationTable>,
        outbound: OutboundSender,
    ) -> Self {
        Self {
            handlers,
            correlation,
            outbound,
        }
    }

    /// Consumes the inbound channel until the transport closes it.
    pub async fn run(&self, mut inbound: mpsc::Receiver<String>) {
        info!("Dispatch loop started");
        while let Some(text) = inbound.recv().await {
            self.handle_raw(&text).await;
        }
        info!("Inbound channel closed, dispatch loop exiting");
    }

    /// Parses and routes one raw frame. Malformed input is logged and dropped.
    pub async fn handle_raw(&self, text: &str) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping unparseable frame");
                return;
            }
        };
        match frame.kind() {
            FrameKind::Request => self.handle_request(frame).await,
            FrameKind::Response => self.handle_response(frame).await,
            FrameKind::Notification => self.handle_notification(frame).await,
            FrameKind::Malformed => {
                warn!("Dropping frame with neither id nor method");
            }
        }
    }

    /// Requests route through the host handler table first; only methods the
    /// host does not claim fall through to the plugin named in `pluginId`.
    async fn handle_request(&self, frame: Frame) {
        let (Some(id), Some(method)) = (frame.id.clone(), frame.method.clone()) else {
            return;
        };
        let target = frame.param_plugin_id().map(str::to_string);
        let params = frame.params.unwrap_or(Value::Null);

        let lookup = match self.handlers.get(identity::HOST_ID, &method).await {
            Some(handler) => Some((identity::HOST_ID.to_string(), handler)),
            None => match &target {
                Some(plugin_id) => self
                    .handlers
                    .get(plugin_id, &method)
                    .await
                    .map(|handler| (plugin_id.clone(), handler)),
                None => None,
            },
        };

        let Some((owner, handler)) = lookup else {
            warn!(method = %method, target = ?target, "No handler registered for request");
            self.send_frame(Frame::error_response(&id, RpcError::method_not_found(&method)))
                .await;
            return;
        };

        let outbound = self.outbound.clone();
        tokio::spawn(identity::scope(owner.clone(), async move {
            let reply = match AssertUnwindSafe(handler.handle(params)).catch_unwind().await {
                Ok(Ok(result)) => Frame::response(&id, result),
                Ok(Err(message)) => {
                    warn!(
                        plugin_id = %owner,
                        method = %method,
                        error = %message,
                        "Request handler failed"
                    );
                    Frame::error_response(&id, RpcError::internal(message))
                }
                Err(_) => {
                    error!(plugin_id = %owner, method = %method, "Request handler panicked");
                    Frame::error_response(&id, RpcError::internal("handler panicked"))
                }
            };
            send_on(&outbound, reply).await;
        }));
    }

    async fn handle_response(&self, frame: Frame) {
        let Some(id) = frame.id else { return };
        let outcome = match frame.error {
            Some(err) => Err(HostError::rpc(format!("App error: {}", err.message))),
            None => Ok(frame.result.unwrap_or(Value::Null)),
        };
        if !self.correlation.resolve(&id, outcome).await {
            warn!(id = %id, "Response with unknown correlation id dropped");
        }
    }

    /// A notification with a `pluginId` goes to that plugin only; without
    /// one it fans out to every table holding a handler for the event.
    async fn handle_notification(&self, frame: Frame) {
        let Some(method) = frame.method.clone() else { return };
        let target = frame.param_plugin_id().map(str::to_string);
        let params = frame.params.unwrap_or(Value::Null);

        match target {
            Some(plugin_id) => match self.handlers.get(&plugin_id, &method).await {
                Some(handler) => self.spawn_notification(plugin_id, handler, method, params),
                None => {
                    debug!(
                        plugin_id = %plugin_id,
                        event = %method,
                        "Notification for plugin without a handler, dropped"
                    );
                }
            },
            None => {
                let targets = self.handlers.plugins_handling(&method).await;
                if targets.is_empty() {
                    debug!(event = %method, "Broadcast notification with no subscribers");
                }
                for (owner, handler) in targets {
                    self.spawn_notification(owner, handler, method.clone(), params.clone());
                }
            }
        }
    }

    fn spawn_notification(
        &self,
        owner: String,
        handler: Arc<dyn EventHandler>,
        method: String,
        params: Value,
    ) {
        tokio::spawn(identity::scope(owner.clone(), async move {
            match AssertUnwindSafe(handler.handle(params)).catch_unwind().await {
                Ok(Ok(_)) => {}
                Ok(Err(message)) => {
                    warn!(
                        plugin_id = %owner,
                        event = %method,
                        error = %message,
                        "Notification handler failed"
                    );
                }
                Err(_) => {
                    error!(plugin_id = %owner, event = %method, "Notification handler panicked");
                }
            }
        }));
    }

    async fn send_frame(&self, frame: Frame) {
        send_on(&self.outbound, frame).await;
    }
}

async fn send_on(outbound: &OutboundSender, frame: Frame) {
    let text = match serde_json::to_string(&frame) {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "Failed to serialize reply frame");
            return;
        }
    };
    if let Err(e) = outbound.send(text).await {
        warn!(error = %e, "Failed to send reply frame");
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::handler_fn;
    use serde_json::json;

    fn test_dispatcher() -> (
        Dispatcher,
        Arc<HandlerRegistry>,
        Arc<CorrelationTable>,
        mpsc::Receiver<String>,
    ) {
        let handlers = Arc::new(HandlerRegistry::new());
        let correlation = Arc::new(CorrelationTable::new());
        let (outbound, rx) = OutboundSender::pair(16);
        let dispatcher = Dispatcher::new(handlers.clone(), correlation.clone(), outbound);
        (dispatcher, handlers, correlation, rx)
    }

    async fn reply_of(rx: &mut mpsc::Receiver<String>) -> Frame {
        serde_json::from_str(&rx.recv().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_method_yields_method_not_found_and_loop_survives() {
        let (dispatcher, handlers, _, mut rx) = test_dispatcher();

        dispatcher
            .handle_raw(r#"{"jsonrpc":"2.0","id":"1","method":"frobnicate"}"#)
            .await;
        let reply = reply_of(&mut rx).await;
        assert_eq!(reply.id.as_deref(), Some("1"));
        assert_eq!(reply.error.unwrap().code, -32601);

        // The same loop still dispatches once a handler appears.
        handlers
            .register("host", "frobnicate", handler_fn(|_| async { Ok(json!("ok")) }))
            .await;
        dispatcher
            .handle_raw(r#"{"jsonrpc":"2.0","id":"2","method":"frobnicate"}"#)
            .await;
        let reply = reply_of(&mut rx).await;
        assert_eq!(reply.id.as_deref(), Some("2"));
        assert_eq!(reply.result.unwrap(), json!("ok"));
    }

    #[tokio::test]
    async fn test_request_routes_to_plugin_named_in_params() {
        let (dispatcher, handlers, _, mut rx) = test_dispatcher();
        handlers
            .register(
                "exporter",
                "export_now",
                handler_fn(|params| async move { Ok(json!({"got": params["format"]})) }),
            )
            .await;

        dispatcher
            .handle_raw(
                r#"{"jsonrpc":"2.0","id":"9","method":"export_now","params":{"pluginId":"exporter","format":"srt"}}"#,
            )
            .await;
        let reply = reply_of(&mut rx).await;
        assert_eq!(reply.result.unwrap(), json!({"got": "srt"}));
    }

    #[tokio::test]
    async fn test_handler_failure_maps_to_internal_error() {
        let (dispatcher, handlers, _, mut rx) = test_dispatcher();
        handlers
            .register(
                "host",
                "explode",
                handler_fn(|_| async { Err("boom".to_string()) }),
            )
            .await;

        dispatcher
            .handle_raw(r#"{"jsonrpc":"2.0","id":"3","method":"explode"}"#)
            .await;
        let err = reply_of(&mut rx).await.error.unwrap();
        assert_eq!(err.code, -32603);
        assert_eq!(err.message, "boom");
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let (dispatcher, handlers, _, mut rx) = test_dispatcher();
        handlers
            .register(
                "host",
                "panic_now",
                handler_fn(|_| async { panic!("unexpected") }),
            )
            .await;

        dispatcher
            .handle_raw(r#"{"jsonrpc":"2.0","id":"4","method":"panic_now"}"#)
            .await;
        let err = reply_of(&mut rx).await.error.unwrap();
        assert_eq!(err.code, -32603);
        assert!(err.message.contains("panicked"));
    }

    #[tokio::test]
    async fn test_response_resolves_waiting_caller() {
        let (dispatcher, _, correlation, _rx) = test_dispatcher();
        let receiver = correlation.register("req-1").await;

        dispatcher
            .handle_raw(r#"{"jsonrpc":"2.0","id":"req-1","result":{"ok":true}}"#)
            .await;
        assert_eq!(receiver.await.unwrap().unwrap(), json!({"ok": true}));

        // Unknown ids are dropped without touching anything.
        dispatcher
            .handle_raw(r#"{"jsonrpc":"2.0","id":"stale","result":1}"#)
            .await;
        assert!(correlation.is_empty().await);
    }

    #[tokio::test]
    async fn test_error_response_surfaces_app_message() {
        let (dispatcher, _, correlation, _rx) = test_dispatcher();
        let receiver = correlation.register("req-2").await;

        dispatcher
            .handle_raw(
                r#"{"jsonrpc":"2.0","id":"req-2","error":{"code":-32000,"message":"dialog dismissed"}}"#,
            )
            .await;
        let err = receiver.await.unwrap().unwrap_err();
        assert!(err.message.contains("dialog dismissed"));
    }

    #[tokio::test]
    async fn test_broadcast_notification_reaches_every_subscriber() {
        let (dispatcher, handlers, _, _rx) = test_dispatcher();
        let (seen_tx, mut seen_rx) = mpsc::channel::<String>(4);

        for plugin in ["exporter", "blocker"] {
            let seen_tx = seen_tx.clone();
            handlers
                .register(
                    plugin,
                    "draft_changed",
                    handler_fn(move |_| {
                        let seen_tx = seen_tx.clone();
                        async move {
                            let _ = seen_tx.send(identity::current()).await;
                            Ok(Value::Null)
                        }
                    }),
                )
                .await;
        }

        dispatcher
            .handle_raw(r#"{"jsonrpc":"2.0","method":"draft_changed","params":{}}"#)
            .await;
        let mut seen = vec![seen_rx.recv().await.unwrap(), seen_rx.recv().await.unwrap()];
        seen.sort();
        assert_eq!(seen, vec!["blocker", "exporter"]);
    }

    #[tokio::test]
    async fn test_targeted_notification_without_handler_is_dropped() {
        let (dispatcher, _, _, mut rx) = test_dispatcher();
        dispatcher
            .handle_raw(
                r#"{"jsonrpc":"2.0","method":"draft_changed","params":{"pluginId":"unloaded"}}"#,
            )
            .await;
        // No reply and no error frame goes out for notifications.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let (dispatcher, _, _, mut rx) = test_dispatcher();
        dispatcher.handle_raw("not json at all").await;
        dispatcher.handle_raw(r#"{"jsonrpc":"2.0"}"#).await;
        assert!(rx.try_recv().is_err());
    }
}
