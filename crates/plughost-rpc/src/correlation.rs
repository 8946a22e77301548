//! Correlation table — pairs outbound requests with their eventual responses.
//!
//! Each in-flight call owns exactly one entry. An entry is consumed exactly
//! once: by its matching response, by timeout cleanup, or by forced
//! completion when the connection closes. Responses for unknown ids are not
//! an error; correlation is purely by id, never by issue order.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use tracing::debug;

use plughost_core::{HostError, HostResult};

/// Completion signal delivered to a waiting caller.
pub type CallOutcome = HostResult<Value>;

/// Table of outstanding outbound requests, guarded by a single lock.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: Mutex<HashMap<String, oneshot::Sender<CallOutcome>>>,
}

impl CorrelationTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh in-flight request and returns the completion side.
    pub async fn register(&self, id: &str) -> oneshot::Receiver<CallOutcome> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().await;
        pending.insert(id.to_string(), tx);
        rx
    }

    /// Delivers an outcome to the caller waiting on `id`.
    ///
    /// Returns `false` when no entry exists — a stale or unknown correlation
    /// id, which the dispatcher logs as a warning and otherwise ignores.
    pub async fn resolve(&self, id: &str, outcome: CallOutcome) -> bool {
        let sender = {
            let mut pending = self.pending.lock().await;
            pending.remove(id)
        };
        match sender {
            Some(tx) => {
                // The receiver may have been dropped by a racing timeout;
                // that is equivalent to a late response and just as benign.
                if tx.send(outcome).is_err() {
                    debug!(id = %id, "Caller gone before response delivery");
                }
                true
            }
            None => false,
        }
    }

    /// Removes a stale entry after its caller timed out.
    pub async fn remove(&self, id: &str) -> bool {
        let mut pending = self.pending.lock().await;
        pending.remove(id).is_some()
    }

    /// Force-completes every outstanding request with a connection error.
    ///
    /// Called on connection close so no caller blocks forever. Returns how
    /// many requests were completed.
    pub async fn fail_all(&self, message: &str) -> usize {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock().await;
            pending.drain().collect()
        };
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(HostError::connection(message)));
        }
        count
    }

    /// Number of outstanding requests.
    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Whether no requests are outstanding.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_resolve_unblocks_matching_caller_only() {
        let table = CorrelationTable::new();
        let rx_a = table.register("a").await;
        let rx_b = table.register("b").await;

        assert!(table.resolve("a", Ok(json!("for a"))).await);
        assert_eq!(rx_a.await.unwrap().unwrap(), json!("for a"));

        // b is still pending and unaffected
        assert_eq!(table.len().await, 1);
        assert!(table.resolve("b", Ok(json!("for b"))).await);
        assert_eq!(rx_b.await.unwrap().unwrap(), json!("for b"));
    }

    #[tokio::test]
    async fn test_unknown_id_is_a_no_op() {
        let table = CorrelationTable::new();
        assert!(!table.resolve("ghost", Ok(json!(null))).await);
    }

    #[tokio::test]
    async fn test_removed_entry_drops_late_response() {
        let table = CorrelationTable::new();
        let _rx = table.register("slow").await;
        assert!(table.remove("slow").await);
        // The late response finds nothing to resolve.
        assert!(!table.resolve("slow", Ok(json!(1))).await);
    }

    #[tokio::test]
    async fn test_fail_all_completes_every_pending_call() {
        let table = CorrelationTable::new();
        let rx1 = table.register("1").await;
        let rx2 = table.register("2").await;

        assert_eq!(table.fail_all("connection closed").await, 2);
        assert!(table.is_empty().await);
        assert!(rx1.await.unwrap().is_err());
        assert!(rx2.await.unwrap().is_err());
    }
}
