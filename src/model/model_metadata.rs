//! Model metadata
//!
//! Stored next to the graph inside a model bundle so the label table travels
//! with the model whose class columns it describes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ml::{OutputLayout, TensorLayout};

/// Model metadata
///
/// Saved as `metadata.json` inside the `.tar.gz` bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Class column index -> motif name.
    /// e.g. ["Mega Mendung", "Parang", "Truntum", "Kawung"]
    pub labels: Vec<String>,

    /// Square input resolution the graph was exported with (usually 640)
    pub input_size: u32,

    #[serde(default)]
    pub tensor_layout: TensorLayout,

    #[serde(default)]
    pub output_layout: OutputLayout,

    /// Bundle creation time (RFC 3339)
    pub exported_at: String,
}

impl ModelMetadata {
    pub fn new(
        labels: Vec<String>,
        input_size: u32,
        tensor_layout: TensorLayout,
        output_layout: OutputLayout,
    ) -> Self {
        let exported_at = chrono::Local::now().to_rfc3339();

        Self {
            labels,
            input_size,
            tensor_layout,
            output_layout,
            exported_at,
        }
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_default_when_absent() {
        let json = r#"{
            "labels": ["Parang", "Kawung"],
            "input_size": 320,
            "exported_at": "2024-05-01T10:00:00+07:00"
        }"#;

        let metadata = ModelMetadata::from_json_string(json).unwrap();
        assert_eq!(metadata.labels, vec!["Parang", "Kawung"]);
        assert_eq!(metadata.input_size, 320);
        assert_eq!(metadata.tensor_layout, TensorLayout::Nchw);
        assert_eq!(metadata.output_layout, OutputLayout::CandidateMajor);
    }

    #[test]
    fn test_new_stamps_export_time() {
        let metadata = ModelMetadata::new(
            vec!["A".into()],
            640,
            TensorLayout::Nhwc,
            OutputLayout::AttributeMajor,
        );
        assert!(chrono::DateTime::parse_from_rfc3339(&metadata.exported_at).is_ok());

        let json = metadata.to_json_string().unwrap();
        assert!(json.contains("\"attribute_major\""));
        assert!(json.contains("\"nhwc\""));
    }
}
