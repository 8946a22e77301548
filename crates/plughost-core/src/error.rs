//! Unified error types for the plugin host.
//!
//! All crates map their internal errors into [`HostError`] for consistent
//! propagation through the ? operator. Failures on the inbound path are
//! converted into protocol error replies by the dispatcher; load/unload
//! failures are caught at the registry boundary and surfaced as structured
//! result values. Neither ever terminates the host.

use std::fmt;
use thiserror::Error;

/// JSON-RPC error code for an unregistered method.
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC error code for a handler that failed while executing.
pub const CODE_INTERNAL_ERROR: i64 = -32603;

/// Top-level error kind categorization used across the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The transport is not established or was lost.
    Connection,
    /// No response arrived within the deadline.
    Timeout,
    /// No handler is registered for the requested method.
    MethodNotFound,
    /// A registered handler failed while executing.
    Handler,
    /// A plugin, its directory, or its entry point was not found.
    NotFound,
    /// The plugin entry point is present but its setup hook is missing or failed.
    Setup,
    /// Input validation failed.
    Validation,
    /// An operation was invoked in a phase where it is not allowed.
    IllegalState,
    /// The remote application returned an error-shaped response.
    Rpc,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// A configuration error occurred.
    Configuration,
    /// A general plugin-system error occurred.
    Plugin,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "CONNECTION"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::MethodNotFound => write!(f, "METHOD_NOT_FOUND"),
            Self::Handler => write!(f, "HANDLER"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Setup => write!(f, "SETUP"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::IllegalState => write!(f, "ILLEGAL_STATE"),
            Self::Rpc => write!(f, "RPC"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Plugin => write!(f, "PLUGIN"),
        }
    }
}

/// The unified error used throughout the plugin host.
///
/// Crate-specific failures are mapped into `HostError` using `From` impls or
/// explicit `.map_err()` calls, giving the whole host a single error type at
/// its boundaries.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct HostError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HostError {
    /// Create a new host error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new host error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Create a method-not-found error.
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MethodNotFound, message)
    }

    /// Create a handler-failure error.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Handler, message)
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a setup error.
    pub fn setup(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Setup, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create an illegal-state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IllegalState, message)
    }

    /// Create an error from a remote error-shaped response.
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Rpc, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a plugin-system error.
    pub fn plugin(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Plugin, message)
    }

    /// The JSON-RPC error code to use when this error is converted into a
    /// protocol-level error reply.
    pub fn rpc_code(&self) -> i64 {
        match self.kind {
            ErrorKind::MethodNotFound => CODE_METHOD_NOT_FOUND,
            _ => CODE_INTERNAL_ERROR,
        }
    }
}

impl Clone for HostError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for HostError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Plugin, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for HostError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
