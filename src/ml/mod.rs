pub mod preprocess;
pub mod interpret;
pub mod inference;
pub mod loader;

pub use preprocess::{image_to_tensor, TensorLayout};
pub use interpret::{best_score, decide, interpret, score_block, BestScore, OutputLayout, BOX_ATTRIBUTES};
pub use inference::{ForwardPass, InferenceEngine, OnnxGraph};
pub use loader::ModelCache;
