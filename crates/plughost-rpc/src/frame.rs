//! JSON-RPC frame model — one JSON object per message, classified by shape.
//!
//! A frame with an id and a method is a request; an id alone marks a
//! response; a method alone marks a notification. Anything else is
//! malformed and dropped by the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use plughost_core::error::{CODE_INTERNAL_ERROR, CODE_METHOD_NOT_FOUND};
use plughost_core::{HostError, HostResult};

/// Params key carrying the target plugin id on requests and notifications.
pub const PLUGIN_ID_KEY: &str = "pluginId";

/// A single protocol message in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Protocol tag, always "2.0" on output.
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Correlation id; present on requests and responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Method name; present on requests and notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Request/notification parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Success payload of a response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload of a response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

/// Error object carried by an error-shaped response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

impl RpcError {
    /// Error object for a method with no registered handler.
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: CODE_METHOD_NOT_FOUND,
            message: format!("Method not found: {method}"),
        }
    }

    /// Error object for a handler that failed while executing.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: CODE_INTERNAL_ERROR,
            message: message.into(),
        }
    }
}

/// The shape of an inbound frame, decided by which fields are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Expects a reply carrying the same id.
    Request,
    /// Completes a previously issued outbound request.
    Response,
    /// One-way event; never replied to.
    Notification,
    /// Neither id nor method present.
    Malformed,
}

impl Frame {
    /// Builds an outbound request frame.
    pub fn request(id: &str, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: Some(id.to_string()),
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    /// Builds a success response frame. A null result is emitted explicitly.
    pub fn response(id: &str, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: Some(id.to_string()),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response frame.
    pub fn error_response(id: &str, error: RpcError) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: Some(id.to_string()),
            method: None,
            params: None,
            result: None,
            error: Some(error),
        }
    }

    /// Builds an outbound notification frame.
    pub fn notification(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: None,
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    /// Classifies this frame by the presence of its id and method fields.
    pub fn kind(&self) -> FrameKind {
        match (&self.id, &self.method) {
            (Some(_), Some(_)) => FrameKind::Request,
            (Some(_), None) => FrameKind::Response,
            (None, Some(_)) => FrameKind::Notification,
            (None, None) => FrameKind::Malformed,
        }
    }

    /// The `pluginId` carried in this frame's params, if any.
    pub fn param_plugin_id(&self) -> Option<&str> {
        self.params
            .as_ref()
            .and_then(|p| p.get(PLUGIN_ID_KEY))
            .and_then(Value::as_str)
    }
}

/// Merges the caller's plugin id into a params object.
///
/// `None` becomes `{"pluginId": id}`; an object gains the key; any other
/// params shape is rejected since the wire contract requires an object.
pub fn merge_plugin_id(params: Option<Value>, plugin_id: &str) -> HostResult<Value> {
    let mut map = match params {
        None | Some(Value::Null) => serde_json::Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(HostError::validation(format!(
                "params must be a JSON object, got {other}"
            )));
        }
    };
    map.insert(PLUGIN_ID_KEY.to_string(), Value::String(plugin_id.to_string()));
    Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classification() {
        let req: Frame =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"1","method":"ping"}"#).unwrap();
        assert_eq!(req.kind(), FrameKind::Request);

        let resp: Frame =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"1","result":42}"#).unwrap();
        assert_eq!(resp.kind(), FrameKind::Response);

        let note: Frame =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"tick","params":{}}"#).unwrap();
        assert_eq!(note.kind(), FrameKind::Notification);

        let junk: Frame = serde_json::from_str(r#"{"jsonrpc":"2.0"}"#).unwrap();
        assert_eq!(junk.kind(), FrameKind::Malformed);
    }

    #[test]
    fn test_response_with_null_result_still_emits_result() {
        let text = serde_json::to_string(&Frame::response("7", Value::Null)).unwrap();
        assert!(text.contains(r#""result":null"#));
    }

    #[test]
    fn test_error_codes() {
        let err = RpcError::method_not_found("frobnicate");
        assert_eq!(err.code, -32601);
        assert!(err.message.contains("frobnicate"));
        assert_eq!(RpcError::internal("boom").code, -32603);
    }

    #[test]
    fn test_merge_plugin_id() {
        let merged = merge_plugin_id(Some(json!({"key": "v"})), "exporter").unwrap();
        assert_eq!(merged["key"], "v");
        assert_eq!(merged["pluginId"], "exporter");

        let bare = merge_plugin_id(None, "exporter").unwrap();
        assert_eq!(bare, json!({"pluginId": "exporter"}));

        assert!(merge_plugin_id(Some(json!([1, 2])), "exporter").is_err());
    }

    #[test]
    fn test_param_plugin_id_extraction() {
        let frame = Frame::notification("draft_changed", json!({"pluginId": "exporter"}));
        assert_eq!(frame.param_plugin_id(), Some("exporter"));

        let untargeted = Frame::notification("draft_changed", json!({}));
        assert_eq!(untargeted.param_plugin_id(), None);
    }
}
