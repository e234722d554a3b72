//! Application settings
//!
//! Model location, preprocessing and decision parameters, stored as JSON.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ml::{OutputLayout, TensorLayout};

/// Motif names in class-column order of the shipped model.
pub const DEFAULT_LABELS: [&str; 4] = ["Mega Mendung", "Parang", "Truntum", "Kawung"];

/// Label shown when no class clears the threshold.
pub const DEFAULT_NEGATIVE_LABEL: &str = "Bukan Batik";

/// Label shown when a prediction fails.
pub const DEFAULT_FAILURE_LABEL: &str = "Error saat prediksi";

pub const DEFAULT_THRESHOLD: f32 = 0.3;
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// ONNX graph or `.tar.gz` bundle, relative paths resolved against the working or resource dir
    pub model_path: String,
    /// Square side the image is resized to before inference
    pub input_size: u32,
    /// A class is accepted only when its score is strictly greater than this
    pub threshold: f32,
    pub tensor_layout: TensorLayout,
    pub output_layout: OutputLayout,
    /// Class column index -> motif name
    pub labels: Vec<String>,
    pub negative_label: String,
    pub failure_label: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_path: "model/model.onnx".to_string(),
            input_size: DEFAULT_INPUT_SIZE,
            threshold: DEFAULT_THRESHOLD,
            tensor_layout: TensorLayout::default(),
            output_layout: OutputLayout::default(),
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
            negative_label: DEFAULT_NEGATIVE_LABEL.to_string(),
            failure_label: DEFAULT_FAILURE_LABEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Default location of the settings file
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Reads the default path, falling back to built-in settings when it is missing or malformed.
    pub fn load_or_default() -> Self {
        Self::load_or_default_from(Self::default_path())
    }

    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    info!("loaded settings from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!(
                        "failed to read settings from {} ({}); using defaults",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            info!("no settings file at {}; using defaults", path.display());
            Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.input_size, 640);
        assert_eq!(config.threshold, 0.3);
        assert_eq!(config.labels, vec!["Mega Mendung", "Parang", "Truntum", "Kawung"]);
        assert_eq!(config.negative_label, "Bukan Batik");
        assert_eq!(config.tensor_layout, TensorLayout::Nchw);
        assert_eq!(config.output_layout, OutputLayout::CandidateMajor);
    }

    #[test]
    fn test_written_file_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.threshold = 0.5;
        config.labels = vec!["A".into(), "B".into()];
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.threshold, 0.5);
        assert_eq!(loaded.labels, vec!["A", "B"]);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "threshold": 0.45, "tensor_layout": "nhwc" }"#).unwrap();

        let loaded = AppConfig::load_or_default_from(&path);
        assert_eq!(loaded.threshold, 0.45);
        assert_eq!(loaded.tensor_layout, TensorLayout::Nhwc);
        assert_eq!(loaded.input_size, 640);
        assert_eq!(loaded.labels.len(), 4);
    }

    #[test]
    fn test_malformed_or_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(AppConfig::load_or_default_from(&path).threshold, 0.3);

        let missing = dir.path().join("missing.json");
        assert_eq!(AppConfig::load_or_default_from(&missing).input_size, 640);
    }
}
