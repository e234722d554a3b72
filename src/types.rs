use serde::{Deserialize, Serialize};

/// Where an acquired image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    Camera,
    Gallery,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSource::Camera => write!(f, "camera"),
            ImageSource::Gallery => write!(f, "gallery"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionOutcome {
    /// A class cleared the acceptance threshold.
    Match,
    /// Nothing cleared the threshold; the label is the negative sentinel.
    NoMatch,
    /// Preprocessing, the forward pass or decoding failed.
    Failed,
}

/// Result of one classification, rendered as-is by the frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub outcome: PredictionOutcome,
    /// Highest class score seen in the output, if any score was seen.
    pub confidence: Option<f32>,
    /// Winning class column (after the box/objectness columns are dropped).
    pub class_index: Option<usize>,
    /// Winning candidate row.
    pub candidate_row: Option<usize>,
}

impl Prediction {
    pub fn failed(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            outcome: PredictionOutcome::Failed,
            confidence: None,
            class_index: None,
            candidate_row: None,
        }
    }
}

// Lifecycle of the cached model handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    NotLoaded,
    Loading,
    Ready,
    Failed,
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelStatus::NotLoaded => write!(f, "not loaded"),
            ModelStatus::Loading => write!(f, "loading"),
            ModelStatus::Ready => write!(f, "ready"),
            ModelStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Snapshot of the session sent to the frontend after every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub has_image: bool,
    pub source: Option<ImageSource>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// `data:image/png;base64,...` preview of the current image.
    pub preview: Option<String>,
    pub prediction: Option<Prediction>,
    pub predicting: bool,
    /// Camera and gallery controls are enabled only while no image is held.
    pub can_acquire: bool,
}

/// Payload of the `model-status` event and command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatusPayload {
    pub status: ModelStatus,
    pub error: Option<String>,
}
