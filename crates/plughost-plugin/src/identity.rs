//! Identity context — attributes executing code to the plugin it runs for.
//!
//! Every unit of execution that runs on behalf of a plugin (handler
//! invocation, setup, teardown) is wrapped in [`scope`], which sets a
//! task-local plugin id for the extent of the future and restores the
//! previous value on exit, including on error and panic unwinding. Code
//! running outside any scope is attributed to the host.

use std::future::Future;

/// Identity of host-owned (privileged) execution.
pub const HOST_ID: &str = "host";

tokio::task_local! {
    static CURRENT_PLUGIN: String;
}

/// Runs `future` with the current plugin id set to `plugin_id`.
///
/// Scopes nest; the inner id shadows the outer one and the outer id is
/// restored when the inner future completes, so concurrent or nested calls
/// never leak attribution across plugins.
pub async fn scope<F>(plugin_id: impl Into<String>, future: F) -> F::Output
where
    F: Future,
{
    CURRENT_PLUGIN.scope(plugin_id.into(), future).await
}

/// The plugin id attributed to the current task, or `"host"` outside any scope.
pub fn current() -> String {
    CURRENT_PLUGIN
        .try_with(Clone::clone)
        .unwrap_or_else(|_| HOST_ID.to_string())
}

/// Prefixes a log message with a plugin id bracket tag.
///
/// Host-attributed lines and lines already carrying a bracket prefix pass
/// through untouched so nothing is double-tagged.
pub fn tag_for(plugin_id: &str, message: &str) -> String {
    if plugin_id == HOST_ID || message.starts_with('[') {
        message.to_string()
    } else {
        format!("[{plugin_id}] {message}")
    }
}
