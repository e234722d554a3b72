//! Failure kinds surfaced to callers.
//!
//! I/O and model plumbing use `anyhow` with context; the variants here are the
//! ones the shell and the CLI need to tell apart.

use std::path::PathBuf;

use thiserror::Error;

/// Session rule violations. The session is left unchanged when one is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("an image is already loaded; reset before acquiring another")]
    ImagePresent,
    #[error("no image to classify")]
    NoImage,
    #[error("a prediction is already running")]
    Busy,
}

/// Model loading failures. A failed load is remembered for the rest of the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("model file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("model failed to load earlier in this session: {0}")]
    Failed(String),
    #[error("model is not ready")]
    NotReady,
}

/// Failures during a single prediction. These are never retried.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("failed to prepare input tensor: {0}")]
    Preprocess(String),
    #[error("forward pass failed: {0}")]
    Inference(String),
    #[error("unexpected output shape {shape:?}: {reason}")]
    Shape { shape: Vec<usize>, reason: String },
    #[error("class index {index} has no entry in the label table ({len} labels)")]
    ClassOutOfRange { index: usize, len: usize },
}
