pub mod model_metadata;
pub mod model_storage;
pub mod inference_config;
pub mod config;

pub use model_metadata::ModelMetadata;
pub use model_storage::{save_model_bundle, load_metadata, load_model_bundle, is_bundle_path, format_metadata_info};
pub use inference_config::InferenceConfig;
pub use config::{AppConfig, DEFAULT_LABELS, DEFAULT_NEGATIVE_LABEL, DEFAULT_FAILURE_LABEL, DEFAULT_THRESHOLD, DEFAULT_INPUT_SIZE};
