//! Acquire → predict → reset against a stub graph, the way the shell drives it.

use std::io::Cursor;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use batik_detector_lib::acquisition::{acquire_from_bytes, acquire_from_data_url};
use batik_detector_lib::error::SessionError;
use batik_detector_lib::ml::{ForwardPass, InferenceEngine, ModelCache, OutputLayout, TensorLayout};
use batik_detector_lib::model::{save_model_bundle, InferenceConfig, ModelMetadata};
use batik_detector_lib::session::Session;
use batik_detector_lib::types::{ImageSource, ModelStatus, PredictionOutcome};
use image::{DynamicImage, Rgb, RgbImage};
use tract_onnx::prelude::{tract_ndarray::Array3, Tensor};

/// Scores depend on the mean red level of the input so different photos
/// produce different labels.
struct RednessDetector;

impl ForwardPass for RednessDetector {
    fn forward(&self, input: Tensor) -> anyhow::Result<Tensor> {
        let view = input.to_array_view::<f32>()?;
        assert_eq!(view.shape(), &[1, 3, 16, 16]);
        let red = view.iter().take(16 * 16).sum::<f32>() / (16.0 * 16.0);

        // two candidates, 5 box columns + 4 classes
        let rows = vec![
            0.0, 0.0, 1.0, 1.0, 0.9, red, 0.1, 0.1, 0.1, //
            0.0, 0.0, 1.0, 1.0, 0.9, 0.1, 0.1, 0.1, 0.2,
        ];
        Ok(Array3::from_shape_vec((1, 2, 9), rows)?.into())
    }
}

fn engine() -> Arc<InferenceEngine> {
    let config = InferenceConfig {
        input_size: 16,
        ..InferenceConfig::default()
    };
    Arc::new(InferenceEngine::with_graph(RednessDetector, config))
}

fn photo(color: [u8; 3]) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb(color)));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
        .unwrap();
    bytes
}

#[test]
fn red_photo_is_classified_then_reset() {
    let engine = engine();
    let mut session = Session::new();

    session
        .acquire(acquire_from_bytes(&photo([250, 10, 10]), ImageSource::Gallery).unwrap())
        .unwrap();
    let ticket = session.begin_prediction().unwrap();
    let prediction = engine.classify(ticket.image());
    assert!(session.finish_prediction(ticket, prediction));

    let view = session.view();
    let prediction = view.prediction.expect("prediction stored");
    assert_eq!(prediction.label, "Mega Mendung");
    assert_eq!(prediction.outcome, PredictionOutcome::Match);
    assert!(!view.can_acquire);

    session.reset();
    let view = session.view();
    assert!(!view.has_image && view.prediction.is_none() && view.can_acquire);
}

#[test]
fn dark_camera_capture_is_not_batik() {
    let engine = engine();
    let mut session = Session::new();

    let url = format!(
        "data:image/jpeg;base64,{}",
        general_purpose::STANDARD.encode(photo([5, 5, 5]))
    );
    session
        .acquire(acquire_from_data_url(&url, ImageSource::Camera).unwrap())
        .unwrap();

    let ticket = session.begin_prediction().unwrap();
    let prediction = engine.classify(ticket.image());
    session.finish_prediction(ticket, prediction);

    let prediction = session.prediction().unwrap();
    assert_eq!(prediction.label, "Bukan Batik");
    assert_eq!(prediction.outcome, PredictionOutcome::NoMatch);
}

#[test]
fn second_image_needs_reset_and_never_shows_old_result() {
    let engine = engine();
    let mut session = Session::new();

    session
        .acquire(acquire_from_bytes(&photo([250, 10, 10]), ImageSource::Gallery).unwrap())
        .unwrap();
    let ticket = session.begin_prediction().unwrap();
    let prediction = engine.classify(ticket.image());
    session.finish_prediction(ticket, prediction);

    let next = acquire_from_bytes(&photo([5, 5, 5]), ImageSource::Camera).unwrap();
    assert_eq!(session.acquire(next.clone()), Err(SessionError::ImagePresent));

    session.reset();
    session.acquire(next).unwrap();
    assert!(session.prediction().is_none());
}

#[test]
fn cache_keeps_first_engine_for_the_session() {
    let cache = ModelCache::new();
    let first = cache
        .load_with(|| Ok(InferenceEngine::with_graph(RednessDetector, InferenceConfig::default())))
        .unwrap();
    let again = cache
        .load_with(|| panic!("loader must not run twice"))
        .unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(cache.status(), ModelStatus::Ready);
}

#[test]
fn corrupt_bundle_leaves_cache_failed() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = ModelMetadata::new(
        vec!["Parang".into()],
        32,
        TensorLayout::Nchw,
        OutputLayout::CandidateMajor,
    );
    let path = save_model_bundle(&dir.path().join("broken.tar.gz"), &metadata, b"garbage").unwrap();

    let config = InferenceConfig {
        model_path: path,
        ..InferenceConfig::default()
    };
    let cache = ModelCache::new();
    assert!(cache.load(&config).is_err());
    assert_eq!(cache.status(), ModelStatus::Failed);
    assert!(cache.ready().is_err());
    assert!(cache.payload().error.is_some());
}
