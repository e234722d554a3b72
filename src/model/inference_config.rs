//! Resolved runtime view of the settings, merged with bundle metadata.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::ml::{OutputLayout, TensorLayout};
use crate::model::config::AppConfig;
use crate::model::model_metadata::ModelMetadata;

/// Everything the inference engine needs, independent of where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    pub model_path: PathBuf,
    pub input_size: u32,
    pub threshold: f32,
    pub tensor_layout: TensorLayout,
    pub output_layout: OutputLayout,
    pub labels: Vec<String>,
    pub negative_label: String,
    pub failure_label: String,
}

impl InferenceConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            model_path: PathBuf::from(&config.model_path),
            input_size: config.input_size,
            threshold: config.threshold,
            tensor_layout: config.tensor_layout,
            output_layout: config.output_layout,
            labels: config.labels.clone(),
            negative_label: config.negative_label.clone(),
            failure_label: config.failure_label.clone(),
        }
    }

    /// Bundle metadata wins over settings for anything tied to the graph itself.
    pub fn with_metadata(mut self, metadata: &ModelMetadata) -> Self {
        if !metadata.labels.is_empty() && metadata.labels != self.labels {
            info!(
                "using label table from model bundle: {}",
                metadata.labels.join(", ")
            );
            self.labels = metadata.labels.clone();
        }
        if metadata.input_size > 0 && metadata.input_size != self.input_size {
            warn!(
                "settings input size {} overridden by bundle ({})",
                self.input_size, metadata.input_size
            );
            self.input_size = metadata.input_size;
        }
        self.tensor_layout = metadata.tensor_layout;
        self.output_layout = metadata.output_layout;
        self
    }

    /// Replaces a relative model path with `base.join(path)` when that file exists.
    pub fn resolve_model_path(&mut self, base: &Path) {
        if self.model_path.is_relative() && !self.model_path.exists() {
            let candidate = base.join(&self.model_path);
            if candidate.exists() {
                self.model_path = candidate;
            }
        }
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}
