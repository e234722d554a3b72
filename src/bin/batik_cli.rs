//! Headless batik motif detection: classify image files, build and inspect model bundles.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;

use batik_detector_lib::acquisition::acquire_from_path;
use batik_detector_lib::init_logging;
use batik_detector_lib::ml::{InferenceEngine, OutputLayout, TensorLayout};
use batik_detector_lib::model::{
    format_metadata_info, load_metadata, save_model_bundle, AppConfig, InferenceConfig,
    ModelMetadata, DEFAULT_INPUT_SIZE, DEFAULT_LABELS,
};
use batik_detector_lib::session::Session;
use batik_detector_lib::types::{ImageSource, Prediction};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify one or more image files.
    Detect {
        /// Image files to classify.
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// ONNX graph or `.tar.gz` bundle (overrides the settings file).
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Settings JSON. Defaults to `config.json` when present, otherwise built-in parameters.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the acceptance threshold.
        #[arg(long)]
        threshold: Option<f32>,

        /// Write predictions to a JSON file instead of stdout.
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Package an ONNX graph and its label table into a `.tar.gz` bundle.
    Bundle {
        /// Exported ONNX graph.
        #[arg(long)]
        onnx: PathBuf,

        /// Class labels in output column order (comma separated).
        #[arg(long, value_delimiter = ',')]
        labels: Option<Vec<String>>,

        /// Square input resolution of the graph.
        #[arg(long, default_value_t = DEFAULT_INPUT_SIZE)]
        input_size: u32,

        #[arg(long, value_enum, default_value_t = TensorLayout::Nchw)]
        tensor_layout: TensorLayout,

        #[arg(long, value_enum, default_value_t = OutputLayout::CandidateMajor)]
        output_layout: OutputLayout,

        /// Output path (`.tar.gz` is appended when missing).
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the metadata stored in a bundle.
    Info {
        bundle: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct ImagePrediction {
    image: String,
    #[serde(flatten)]
    prediction: Prediction,
}

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let cli = Cli::parse();

    match cli.command {
        Command::Detect {
            images,
            model,
            config,
            threshold,
            json,
        } => detect(images, model, config, threshold, json),
        Command::Bundle {
            onnx,
            labels,
            input_size,
            tensor_layout,
            output_layout,
            output,
        } => {
            let labels = labels.unwrap_or_else(|| DEFAULT_LABELS.iter().map(|s| s.to_string()).collect());
            let graph = fs::read(&onnx)
                .with_context(|| format!("failed to read {}", onnx.display()))?;
            let metadata = ModelMetadata::new(labels, input_size, tensor_layout, output_layout);
            let written = save_model_bundle(&output, &metadata, &graph)?;
            println!("wrote {}", written.display());
            Ok(())
        }
        Command::Info { bundle } => {
            let metadata = load_metadata(&bundle)?;
            println!("{}", format_metadata_info(&metadata));
            Ok(())
        }
    }
}

fn detect(
    images: Vec<PathBuf>,
    model: Option<PathBuf>,
    config: Option<PathBuf>,
    threshold: Option<f32>,
    json: Option<PathBuf>,
) -> Result<()> {
    let settings = match config {
        Some(path) => AppConfig::load(&path)
            .with_context(|| format!("failed to read settings {}", path.display()))?,
        None => AppConfig::load_or_default(),
    };
    let mut inference = InferenceConfig::from_app_config(&settings);
    if let Some(model) = model {
        inference.model_path = model;
    }
    if let Some(threshold) = threshold {
        inference.threshold = threshold;
    }

    let engine = InferenceEngine::load(&inference)?;
    let mut session = Session::new();
    let mut results = Vec::with_capacity(images.len());

    for path in images {
        session.reset();
        let acquired = match acquire_from_path(&path, ImageSource::Gallery) {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!("skipping {}: {e:#}", path.display());
                continue;
            }
        };
        session.acquire(acquired)?;

        let ticket = session.begin_prediction()?;
        let prediction = engine.classify(ticket.image());
        session.finish_prediction(ticket, prediction);

        if let Some(prediction) = session.prediction() {
            info!("{}: {}", path.display(), prediction.label);
            results.push(ImagePrediction {
                image: path.display().to_string(),
                prediction: prediction.clone(),
            });
        }
    }

    match json {
        Some(out) => {
            let text = serde_json::to_string_pretty(&results)?;
            fs::write(&out, text).with_context(|| format!("failed to write {}", out.display()))?;
            println!("wrote {} predictions to {}", results.len(), out.display());
        }
        None => {
            for result in &results {
                match result.prediction.confidence {
                    Some(confidence) => println!(
                        "{}\t{}\t{:.3}",
                        result.image, result.prediction.label, confidence
                    ),
                    None => println!("{}\t{}", result.image, result.prediction.label),
                }
            }
        }
    }

    Ok(())
}
