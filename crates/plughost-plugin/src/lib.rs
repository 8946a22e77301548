//! # plughost-plugin
//!
//! Plugin runtime for the host: discovery and manifests, the handler
//! registry, the inbound frame dispatcher, the plugin registry with
//! hot-reload semantics, per-plugin contexts, the extension service
//! directory, and the identity attribution that tags every log line with
//! the plugin it ran for.

pub mod context;
pub mod discovery;
pub mod dispatcher;
pub mod ext_service;
pub mod handlers;
pub mod host_api;
pub mod identity;
pub mod loader;
pub mod manifest;
pub mod registry;

pub use context::PluginContext;
pub use dispatcher::Dispatcher;
pub use ext_service::ExtServiceDirectory;
pub use handlers::{EventHandler, HandlerRegistry};
pub use loader::{EntryLoader, PluginEntry};
pub use manifest::Manifest;
pub use registry::{PluginRegistry, UnloadOutcome};
