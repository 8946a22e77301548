//! Plugin manifest — static descriptor read from each plugin directory.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use plughost_core::HostResult;

/// File name looked up inside every plugin directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Static plugin descriptor declared by the plugin author.
///
/// `id` is the canonical plugin identity. `folderName` is injected by the
/// registry at discovery time, never written by the author. Any fields the
/// host does not model are preserved verbatim so the app can read them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Unique plugin identifier.
    pub id: String,
    /// Human-readable plugin name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Directory name under the plugins root, filled in during discovery.
    #[serde(rename = "folderName", default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,
    /// Free-form fields carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Manifest {
    /// Reads and parses a manifest file.
    pub fn from_file(path: &Path) -> HostResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// The name to show in logs and listings: declared name, else the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_minimal_manifest() {
        let manifest: Manifest = serde_json::from_str(r#"{"id": "exporter"}"#).unwrap();
        assert_eq!(manifest.id, "exporter");
        assert!(manifest.name.is_none());
        assert!(manifest.folder_name.is_none());
        assert_eq!(manifest.display_name(), "exporter");
    }

    #[test]
    fn test_preserves_free_form_fields() {
        let manifest: Manifest = serde_json::from_str(
            r#"{"id": "exporter", "name": "Subtitle Exporter", "version": "1.2.0", "author": "someone"}"#,
        )
        .unwrap();
        assert_eq!(manifest.display_name(), "Subtitle Exporter");
        assert_eq!(manifest.extra["version"], "1.2.0");

        // folderName round-trips once injected.
        let mut manifest = manifest;
        manifest.folder_name = Some("subtitle_exporter".to_string());
        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["folderName"], "subtitle_exporter");
        assert_eq!(value["version"], "1.2.0");
    }

    #[test]
    fn test_rejects_manifest_without_id() {
        assert!(serde_json::from_str::<Manifest>(r#"{"name": "nameless"}"#).is_err());
    }
}
