//! WebSocket transport — owns the single connection to the controlling app.
//!
//! One task owns the socket read half and feeds raw text frames into a
//! bounded inbound channel; a second task owns the write half and drains a
//! bounded outbound queue, so concurrent callers never interleave writes.
//! When the connection closes (either side), every outstanding request in
//! the correlation table is force-completed so no caller blocks forever.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use plughost_core::config::connection::ConnectionConfig;
use plughost_core::error::ErrorKind;
use plughost_core::{HostError, HostResult};

use crate::correlation::CorrelationTable;

/// Clonable handle for queueing outbound frames onto the single writer.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    tx: mpsc::Sender<String>,
    connected: Arc<AtomicBool>,
}

impl OutboundSender {
    /// Queues a serialized frame for sending.
    ///
    /// Fails with a connection error when the transport is not running.
    pub async fn send(&self, text: String) -> HostResult<()> {
        if !self.is_connected() {
            return Err(HostError::connection("transport is not connected"));
        }
        self.tx
            .send(text)
            .await
            .map_err(|_| HostError::connection("transport writer is gone"))
    }

    /// Whether the connection is currently believed to be up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Builds a detached sender/receiver pair backed by a plain channel.
    ///
    /// Used by tests (and any in-process loopback) to stand in for a live
    /// socket: frames queued on the sender arrive on the receiver.
    pub fn pair(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                connected: Arc::new(AtomicBool::new(true)),
            },
            rx,
        )
    }

    /// Marks the transport as no longer connected.
    pub fn mark_closed(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// The WebSocket connection to the app.
#[derive(Debug)]
pub struct Transport;

impl Transport {
    /// Opens the connection described by `config`.
    ///
    /// Blocks until the handshake completes or `connect_timeout_seconds`
    /// elapses. Returns the outbound sender and the bounded inbound channel
    /// of raw text frames consumed by the dispatcher; the channel closing
    /// means the connection is gone (the host does not reconnect).
    pub async fn connect(
        config: &ConnectionConfig,
        correlation: Arc<CorrelationTable>,
    ) -> HostResult<(OutboundSender, mpsc::Receiver<String>)> {
        let url = config.url();
        let timeout = Duration::from_secs(config.connect_timeout_seconds);

        let (ws, _response) = tokio::time::timeout(timeout, connect_async(&url))
            .await
            .map_err(|_| {
                HostError::connection(format!(
                    "failed to connect to {} within {}s",
                    url, config.connect_timeout_seconds
                ))
            })?
            .map_err(|e| {
                HostError::with_source(
                    ErrorKind::Connection,
                    format!("failed to connect to {url}: {e}"),
                    e,
                )
            })?;

        info!(host = %config.host, port = config.port, "WebSocket connection opened");

        let (mut sink, mut stream) = ws.split();
        let connected = Arc::new(AtomicBool::new(true));
        let (out_tx, mut out_rx) = mpsc::channel::<String>(config.outbound_queue_size);
        let (in_tx, in_rx) = mpsc::channel::<String>(config.inbound_queue_size);

        // Writer task — the only place the sink is touched.
        let writer_connected = connected.clone();
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::text(text)).await {
                    warn!(error = %e, "WebSocket send failed");
                    writer_connected.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        // Reader task — feeds the dispatcher and handles close.
        let reader_connected = connected.clone();
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text.to_string()).await.is_err() {
                            // Dispatcher is gone; stop reading.
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "WebSocket read error");
                        break;
                    }
                }
            }

            reader_connected.store(false, Ordering::SeqCst);
            let failed = correlation.fail_all("connection closed").await;
            if failed > 0 {
                warn!(
                    count = failed,
                    "Force-completed outstanding requests on disconnect"
                );
            }
            info!("WebSocket connection closed");
        });

        Ok((
            OutboundSender {
                tx: out_tx,
                connected,
            },
            in_rx,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_fails_when_not_connected() {
        let (sender, _rx) = OutboundSender::pair(4);
        sender.mark_closed();
        let err = sender.send("{}".to_string()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_pair_delivers_queued_frames() {
        let (sender, mut rx) = OutboundSender::pair(4);
        sender.send("hello".to_string()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }
}
