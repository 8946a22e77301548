//! Per-plugin context — the capability object handed to plugin code.
//!
//! Created immediately before `setup` runs and owned by the registry for
//! the plugin's lifetime. Exposes the outbound RPC surface of the app,
//! event subscription, teardown registration, tracked task spawning, and
//! the extension service directory. Long-running plugin tasks are expected
//! to poll [`running`](PluginContext::running) or select on their
//! cancellation token; the host never force-stops them.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use plughost_core::{HostError, HostResult};
use plughost_rpc::RpcClient;

use crate::ext_service::{ExtService, ExtServiceDirectory};
use crate::handlers::{EventHandler, HandlerRegistry, handler_fn};
use crate::identity;

/// Cleanup callback registered via [`PluginContext::on_teardown`].
pub type TeardownFn = Box<dyn FnOnce() -> Result<(), String> + Send>;

/// Options for the [`prompt`](PluginContext::prompt) input dialog.
#[derive(Debug, Clone, Default)]
pub struct PromptOptions {
    /// Prompt message shown to the user.
    pub content: String,
    /// Dialog title.
    pub title: String,
    /// Pre-filled value.
    pub default_value: String,
    /// Placeholder hint text.
    pub hint_text: String,
    /// Whether the input accepts multiple lines.
    pub multi_line: bool,
    /// Minimum visible lines for multi-line input.
    pub min_lines: Option<u32>,
    /// Maximum visible lines for multi-line input.
    pub max_lines: Option<u32>,
}

/// The capability object exposed to one loaded plugin.
pub struct PluginContext {
    plugin_id: String,
    running: AtomicBool,
    initializing: AtomicBool,
    teardown: Mutex<Vec<TeardownFn>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    rpc: Arc<RpcClient>,
    handlers: Arc<HandlerRegistry>,
    services: Arc<ExtServiceDirectory>,
}

impl PluginContext {
    /// Creates a context for `plugin_id`. The registry flips
    /// `initializing` on around the setup call.
    pub fn new(
        plugin_id: &str,
        rpc: Arc<RpcClient>,
        handlers: Arc<HandlerRegistry>,
        services: Arc<ExtServiceDirectory>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            running: AtomicBool::new(true),
            initializing: AtomicBool::new(false),
            teardown: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            rpc,
            handlers,
            services,
        }
    }

    /// This plugin's id.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Whether the plugin is still loaded. Long-running tasks poll this.
    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the plugin is inside its setup phase.
    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::SeqCst)
    }

    /// Token cancelled at unload; spawned tasks may select on child tokens.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Emits a log line attributed to this plugin.
    pub fn log(&self, message: &str) {
        info!("{}", identity::tag_for(&self.plugin_id, message));
    }

    // ── Lifecycle (registry-internal) ────────────────────────────

    pub(crate) fn mark_initializing(&self, value: bool) {
        self.initializing.store(value, Ordering::SeqCst);
    }

    /// Flips `running` to false; returns whether this call did the flip.
    pub(crate) fn begin_teardown(&self) -> bool {
        self.running.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_teardown_callbacks(&self) -> Vec<TeardownFn> {
        let mut teardown = lock(&self.teardown);
        std::mem::take(&mut *teardown)
    }

    pub(crate) fn take_tasks(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = lock(&self.tasks);
        std::mem::take(&mut *tasks)
    }

    // ── Registration surface ─────────────────────────────────────

    /// Subscribes a handler to `event` under this plugin's id.
    pub async fn on(&self, event: &str, handler: Arc<dyn EventHandler>) {
        self.handlers.register(&self.plugin_id, event, handler).await;
    }

    /// Subscribes an async closure to `event`.
    pub async fn on_fn<F, Fut>(&self, event: &str, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        self.on(event, handler_fn(f)).await;
    }

    /// Registers a callback run when the plugin unloads.
    pub fn on_teardown(&self, callback: TeardownFn) {
        lock(&self.teardown).push(callback);
    }

    /// Spawns a tracked task attributed to this plugin.
    ///
    /// The closure receives a child of the context's cancellation token;
    /// cooperative tasks select on it (or poll `running`) and finish
    /// promptly at unload. Tasks still alive after the teardown wait are
    /// reported as leaks, never killed.
    pub fn spawn<F, Fut>(&self, f: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.cancel.child_token();
        let handle = tokio::spawn(identity::scope(self.plugin_id.clone(), f(token)));
        let mut tasks = lock(&self.tasks);
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Registers this plugin's extension service for other plugins to use.
    pub async fn register_ext_service(&self, instance: ExtService) {
        self.services.register(&self.plugin_id, instance).await;
    }

    /// Looks up another plugin's extension service.
    ///
    /// Not allowed during this plugin's own setup phase: setup ordering
    /// between plugins is unspecified, so init-time lookups would race.
    pub async fn get_ext_service(&self, plugin_id: &str) -> HostResult<Option<ExtService>> {
        if self.is_initializing() {
            return Err(HostError::illegal_state(format!(
                "[{}] cannot call get_ext_service during the setup phase; \
                 access other services from event handlers or spawned tasks",
                self.plugin_id
            )));
        }
        Ok(self.services.lookup(plugin_id).await)
    }

    /// Typed variant of [`get_ext_service`](Self::get_ext_service).
    pub async fn get_ext_service_as<T: std::any::Any + Send + Sync>(
        &self,
        plugin_id: &str,
    ) -> HostResult<Option<Arc<T>>> {
        Ok(self
            .get_ext_service(plugin_id)
            .await?
            .and_then(|service| service.downcast::<T>().ok()))
    }

    // ── Outbound RPC surface ─────────────────────────────────────

    /// Raw call to an app method with the default timeout.
    pub async fn call(&self, method: &str, params: Option<Value>) -> HostResult<Value> {
        self.rpc.call_default(&self.plugin_id, method, params).await
    }

    /// Raw fire-and-forget notification to the app.
    pub async fn notify(&self, method: &str, params: Option<Value>) {
        self.rpc.notify(&self.plugin_id, method, params).await;
    }

    async fn call_dialog(&self, method: &str, params: Value) -> HostResult<Value> {
        self.rpc
            .call(
                &self.plugin_id,
                method,
                Some(params),
                self.rpc.config().dialog_timeout(),
            )
            .await
    }

    /// Shows a toast-style notification. `kind` is "info", "warning", or "error".
    pub async fn show_notification(
        &self,
        content: &str,
        title: &str,
        kind: &str,
    ) -> HostResult<Value> {
        non_empty("content", content)?;
        self.call(
            "show_notification",
            Some(json!({"content": content, "title": title, "type": kind})),
        )
        .await
    }

    /// Shows a modal alert and waits for dismissal.
    pub async fn alert(&self, content: &str, title: &str) -> HostResult<Value> {
        non_empty("content", content)?;
        self.call_dialog("alert", json!({"content": content, "title": title}))
            .await
    }

    /// Shows a confirmation dialog; resolves to the user's choice.
    pub async fn confirm(&self, content: &str, title: &str) -> HostResult<bool> {
        non_empty("content", content)?;
        let result = self
            .call_dialog("confirm", json!({"content": content, "title": title}))
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// Shows an input dialog; `None` when the user cancels.
    pub async fn prompt(&self, options: PromptOptions) -> HostResult<Option<String>> {
        non_empty("content", &options.content)?;
        if let (Some(min), Some(max)) = (options.min_lines, options.max_lines)
            && min > max
        {
            return Err(HostError::validation(format!(
                "min_lines ({min}) exceeds max_lines ({max})"
            )));
        }
        let result = self
            .call_dialog(
                "prompt",
                json!({
                    "content": options.content,
                    "title": options.title,
                    "defaultValue": options.default_value,
                    "hintText": options.hint_text,
                    "multiLine": options.multi_line,
                    "minLines": options.min_lines,
                    "maxLines": options.max_lines,
                }),
            )
            .await?;
        Ok(result.as_str().map(str::to_string))
    }

    /// Opens a file picker; `None` when the user cancels.
    pub async fn select_file(
        &self,
        title: &str,
        allowed_extensions: Option<Vec<String>>,
    ) -> HostResult<Option<String>> {
        let result = self
            .call_dialog(
                "select_file",
                json!({"title": title, "allowedExtensions": allowed_extensions}),
            )
            .await?;
        Ok(result.as_str().map(str::to_string))
    }

    /// Opens a directory picker; `None` when the user cancels.
    pub async fn select_directory(&self, title: &str) -> HostResult<Option<String>> {
        let result = self
            .call_dialog("select_directory", json!({"title": title}))
            .await?;
        Ok(result.as_str().map(str::to_string))
    }

    /// Reads the app clipboard.
    pub async fn get_clipboard(&self) -> HostResult<String> {
        let result = self.call("get_clipboard", None).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    /// Writes the app clipboard.
    pub async fn set_clipboard(&self, content: &str) -> HostResult<Value> {
        self.call("set_clipboard", Some(json!({"content": content})))
            .await
    }

    /// Fetches the app configuration object.
    pub async fn get_app_config(&self) -> HostResult<Value> {
        self.call("get_app_config", None).await
    }

    /// Navigates the app UI to a named target.
    pub async fn navigate_to(&self, target: &str) -> HostResult<Value> {
        non_empty("target", target)?;
        self.call("navigate_to", Some(json!({"target": target}))).await
    }

    /// Reads a value from this plugin's key-value storage.
    pub async fn get_plugin_storage(&self, key: &str) -> HostResult<Value> {
        non_empty("key", key)?;
        self.call("get_plugin_storage", Some(json!({"key": key}))).await
    }

    /// Writes a value to this plugin's key-value storage.
    pub async fn set_plugin_storage(&self, key: &str, value: Value) -> HostResult<Value> {
        non_empty("key", key)?;
        self.call("set_plugin_storage", Some(json!({"key": key, "value": value})))
            .await
    }

    /// Lists all known plugins with their status and manifests.
    pub async fn get_plugins_info(&self) -> HostResult<Value> {
        self.call("get_plugins_info", None).await
    }

    /// Fetches info for one plugin.
    pub async fn get_plugin_info(&self, plugin_id: &str) -> HostResult<Value> {
        non_empty("plugin_id", plugin_id)?;
        self.call("get_plugins_info", Some(json!({"id": plugin_id})))
            .await
    }

    /// Opens this plugin's log dialog; does not wait for a result.
    pub async fn show_log_dialog(&self, clear: bool) {
        self.notify("show_log_dialog", Some(json!({"clear": clear})))
            .await;
    }

    /// Renders a custom form described by `config`.
    ///
    /// Resolves to the submitted field values, or `None` when the user
    /// cancels. Forms may stay open much longer than dialogs.
    pub async fn show_custom_form(&self, config: Value) -> HostResult<Option<Value>> {
        if !config.is_object() {
            return Err(HostError::validation("form config must be a JSON object"));
        }
        let result = self
            .rpc
            .call(
                &self.plugin_id,
                "show_custom_form",
                Some(json!({"config": config})),
                self.rpc.config().form_timeout(),
            )
            .await?;
        Ok(if result.is_null() { None } else { Some(result) })
    }

    /// Whether the draft editor process is currently running.
    pub async fn is_editor_running(&self) -> HostResult<bool> {
        let result = self.call("is_editor_running", None).await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// The directory of the draft currently open in the editor.
    pub async fn get_current_draft_dir(&self) -> HostResult<String> {
        let result = self.call("get_current_draft_dir", None).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    /// Reads a draft file through the app (decrypted if needed).
    pub async fn read_draft_file(&self, path: &str) -> HostResult<String> {
        non_empty("path", path)?;
        let result = self.call("read_draft_file", Some(json!({"path": path}))).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    /// Writes a draft file through the app.
    pub async fn write_draft_file(
        &self,
        path: &str,
        content: &str,
        encrypt: bool,
    ) -> HostResult<Value> {
        non_empty("path", path)?;
        self.call(
            "write_draft_file",
            Some(json!({"path": path, "content": content, "encrypt": encrypt})),
        )
        .await
    }

    /// Fetches editor install/version information.
    pub async fn get_editor_info(&self) -> HostResult<Value> {
        self.call("get_editor_info", None).await
    }

    /// Registers a UI action button owned by this plugin.
    pub async fn register_ui_action(
        &self,
        action_id: &str,
        label: &str,
        icon: Option<&str>,
        location: &str,
    ) -> HostResult<Value> {
        non_empty("action_id", action_id)?;
        non_empty("label", label)?;
        self.call(
            "register_ui_action",
            Some(json!({
                "actionId": action_id,
                "label": label,
                "icon": icon,
                "location": location,
            })),
        )
        .await
    }

    /// Updates a previously registered UI action.
    pub async fn update_ui_action(
        &self,
        action_id: &str,
        label: Option<&str>,
        icon: Option<&str>,
    ) -> HostResult<Value> {
        non_empty("action_id", action_id)?;
        self.call(
            "update_ui_action",
            Some(json!({"actionId": action_id, "label": label, "icon": icon})),
        )
        .await
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .field("running", &self.running())
            .field("initializing", &self.is_initializing())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Rejects empty string parameters before a frame is built.
fn non_empty(field: &str, value: &str) -> HostResult<()> {
    if value.is_empty() {
        Err(HostError::validation(format!("'{field}' must not be empty")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plughost_core::config::rpc::RpcConfig;
    use plughost_core::error::ErrorKind;
    use plughost_rpc::{CorrelationTable, Frame, OutboundSender};

    fn test_context() -> (Arc<PluginContext>, tokio::sync::mpsc::Receiver<String>) {
        let (outbound, rx) = OutboundSender::pair(16);
        let rpc = Arc::new(RpcClient::new(
            outbound,
            Arc::new(CorrelationTable::new()),
            RpcConfig::default(),
        ));
        let context = Arc::new(PluginContext::new(
            "exporter",
            rpc,
            Arc::new(HandlerRegistry::new()),
            Arc::new(ExtServiceDirectory::new()),
        ));
        (context, rx)
    }

    #[tokio::test]
    async fn test_validation_rejects_empty_params_without_sending() {
        let (context, mut rx) = test_context();

        let err = context.navigate_to("").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        let err = context
            .prompt(PromptOptions {
                content: "lines".into(),
                min_lines: Some(5),
                max_lines: Some(2),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        // Nothing reached the wire.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_show_log_dialog_is_a_notification() {
        let (context, mut rx) = test_context();
        context.show_log_dialog(true).await;

        let frame: Frame = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert!(frame.id.is_none());
        assert_eq!(frame.method.as_deref(), Some("show_log_dialog"));
        assert_eq!(frame.param_plugin_id(), Some("exporter"));
    }

    #[tokio::test]
    async fn test_ext_service_lookup_blocked_during_setup() {
        let (context, _rx) = test_context();
        context.mark_initializing(true);

        let err = context.get_ext_service("temp_decrypt").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalState);

        context.mark_initializing(false);
        assert!(context.get_ext_service("temp_decrypt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_begin_teardown_flips_running_once() {
        let (context, _rx) = test_context();
        assert!(context.running());
        assert!(context.begin_teardown());
        assert!(!context.running());
        // Second flip reports it was already down.
        assert!(!context.begin_teardown());
    }

    #[tokio::test]
    async fn test_teardown_callbacks_are_collected_in_order() {
        let (context, _rx) = test_context();
        context.on_teardown(Box::new(|| Ok(())));
        context.on_teardown(Box::new(|| Err("cleanup failed".to_string())));

        let callbacks = context.take_teardown_callbacks();
        assert_eq!(callbacks.len(), 2);
        assert!(context.take_teardown_callbacks().is_empty());
    }
}
