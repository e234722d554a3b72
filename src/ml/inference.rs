//! Graph loading and a single forward pass per prediction.

use std::fmt::Write as _;
use std::io::Cursor;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use image::DynamicImage;
use log::{debug, error, info, warn};
use tract_onnx::prelude::{
    tvec, Datum, Framework, Graph, InferenceFact, InferenceModel, InferenceModelExt, IntoTensor,
    SimplePlan, Tensor, TypedFact, TypedModel, TypedOp,
};

use crate::error::PredictError;
use crate::ml::interpret::{interpret, score_block};
use crate::ml::preprocess::{image_to_tensor, TensorLayout};
use crate::model::{is_bundle_path, load_model_bundle, InferenceConfig};
use crate::types::Prediction;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// One forward pass through a loaded graph.
pub trait ForwardPass: Send + Sync {
    fn forward(&self, input: Tensor) -> Result<Tensor>;
}

/// ONNX graph executed with tract.
#[derive(Debug)]
pub struct OnnxGraph {
    runnable: RunnableModel,
}

impl OnnxGraph {
    pub fn load_from_path(path: &Path, input_size: u32, layout: TensorLayout) -> Result<Self> {
        anyhow::ensure!(path.exists(), "model file not found: {}", path.display());
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?;
        Self::from_inference_model(model, &path.display().to_string(), input_size, layout)
    }

    pub fn load_from_bytes(bytes: &[u8], input_size: u32, layout: TensorLayout) -> Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut Cursor::new(bytes))
            .context("failed to parse ONNX graph from bundle")?;
        Self::from_inference_model(model, "bundle", input_size, layout)
    }

    fn from_inference_model(
        model: InferenceModel,
        name: &str,
        input_size: u32,
        layout: TensorLayout,
    ) -> Result<Self> {
        let shape = layout.shape(input_size as usize);
        let model = model
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(shape[0], shape[1], shape[2], shape[3])),
            )
            .map_err(|e| anyhow::anyhow!("unable to set input shape {:?}: {e}", shape))?
            .into_typed()
            .map_err(|e| anyhow::anyhow!("unable to type-check graph: {e}"))?;

        let runnable = match make_runnable(model.clone(), true) {
            Ok(runnable) => {
                debug!("graph {} optimized for input {:?}", name, shape);
                runnable
            }
            Err(opt_err) => {
                let mut chain_msg = String::new();
                for cause in opt_err.chain() {
                    let _ = writeln!(&mut chain_msg, "  - {cause}");
                }
                warn!(
                    "graph {} failed optimized load; falling back to decluttered graph.\n{}",
                    name,
                    chain_msg.trim_end()
                );
                make_runnable(model, false).with_context(|| {
                    format!("fallback to decluttered graph failed after optimize error: {opt_err}")
                })?
            }
        };

        Ok(Self { runnable })
    }
}

fn make_runnable(model: TypedModel, optimized: bool) -> Result<RunnableModel> {
    let model = if optimized {
        model
            .into_optimized()
            .map_err(|e| anyhow::anyhow!("unable to optimize graph: {e}"))?
    } else {
        model
            .into_decluttered()
            .map_err(|e| anyhow::anyhow!("unable to declutter graph: {e}"))?
    };
    model
        .into_runnable()
        .map_err(|e| anyhow::anyhow!("unable to make graph runnable: {e}"))
}

impl ForwardPass for OnnxGraph {
    fn forward(&self, input: Tensor) -> Result<Tensor> {
        let outputs = self
            .runnable
            .run(tvec![input.into()])
            .map_err(|e| anyhow::anyhow!("graph execution failed: {e}"))?;

        outputs
            .into_iter()
            .next()
            .map(|value| value.into_tensor())
            .ok_or_else(|| anyhow::anyhow!("graph produced no outputs"))
    }
}

/// Loaded graph plus the settings it is interpreted with.
pub struct InferenceEngine {
    graph: Box<dyn ForwardPass>,
    config: InferenceConfig,
}

impl InferenceEngine {
    /// Load a bare `.onnx` graph or a `.tar.gz` bundle named by `config.model_path`.
    pub fn load(config: &InferenceConfig) -> Result<Self> {
        let path = config.model_path.as_path();
        let started = Instant::now();

        let engine = if is_bundle_path(path) {
            let (metadata, graph_bytes) = load_model_bundle(path)
                .with_context(|| format!("failed to read model bundle {}", path.display()))?;
            let config = config.clone().with_metadata(&metadata);
            let graph = OnnxGraph::load_from_bytes(&graph_bytes, config.input_size, config.tensor_layout)?;
            Self::with_graph(graph, config)
        } else {
            let graph = OnnxGraph::load_from_path(path, config.input_size, config.tensor_layout)?;
            Self::with_graph(graph, config.clone())
        };

        info!(
            "model {} loaded in {:.2?} ({} labels, input {}x{})",
            path.display(),
            started.elapsed(),
            engine.config.num_classes(),
            engine.config.input_size,
            engine.config.input_size
        );
        Ok(engine)
    }

    pub fn with_graph(graph: impl ForwardPass + 'static, config: InferenceConfig) -> Self {
        Self {
            graph: Box::new(graph),
            config,
        }
    }

    /// Preprocess, run the graph once, and interpret the output.
    ///
    /// Input and output tensors are owned by this call and freed on every return path.
    pub fn predict(&self, image: &DynamicImage) -> Result<Prediction, PredictError> {
        let started = Instant::now();
        let input = image_to_tensor(image, self.config.input_size, self.config.tensor_layout)
            .map_err(|e| PredictError::Preprocess(format!("{e:#}")))?;
        debug!("input tensor {:?}", input.shape());

        let output = self
            .graph
            .forward(input)
            .map_err(|e| PredictError::Inference(format!("{e:#}")))?;
        debug!("output tensor {:?}", output.shape());

        let scores = score_block(&output, self.config.output_layout)?;
        if scores.ncols() != self.config.num_classes() {
            warn!(
                "model reports {} classes but the label table has {}",
                scores.ncols(),
                self.config.num_classes()
            );
        }

        let prediction = interpret(
            scores,
            self.config.threshold,
            &self.config.labels,
            &self.config.negative_label,
        )?;
        debug!(
            "prediction {:?} ({:?}) in {:.2?}",
            prediction.label,
            prediction.confidence,
            started.elapsed()
        );
        Ok(prediction)
    }

    /// Like [`predict`](Self::predict), but any failure becomes the generic failure label.
    pub fn classify(&self, image: &DynamicImage) -> Prediction {
        match self.predict(image) {
            Ok(prediction) => prediction,
            Err(e) => {
                error!("prediction failed: {e}");
                Prediction::failed(&self.config.failure_label)
            }
        }
    }
}
