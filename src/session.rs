//! Current image / current prediction pair for one user session.
//!
//! A prediction only ever describes the image that produced it: acquiring or
//! resetting bumps a generation counter, and results for an older generation
//! are dropped when they arrive.

use std::sync::Arc;

use image::DynamicImage;
use log::{debug, info};

use crate::acquisition::AcquiredImage;
use crate::error::SessionError;
use crate::types::{Prediction, SessionView};

/// Handed out by [`Session::begin_prediction`]; returned with the result.
#[derive(Debug, Clone)]
pub struct PredictionTicket {
    generation: u64,
    image: Arc<DynamicImage>,
}

impl PredictionTicket {
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

#[derive(Debug, Default)]
pub struct Session {
    image: Option<AcquiredImage>,
    prediction: Option<Prediction>,
    predicting: bool,
    generation: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new image. Rejected while another image is held.
    pub fn acquire(&mut self, image: AcquiredImage) -> Result<(), SessionError> {
        if self.image.is_some() {
            return Err(SessionError::ImagePresent);
        }
        self.prediction = None;
        self.generation += 1;
        info!(
            "image acquired from {} ({}x{})",
            image.source(),
            image.width(),
            image.height()
        );
        self.image = Some(image);
        Ok(())
    }

    /// Clear image and prediction together.
    ///
    /// A prediction already running keeps the in-flight flag until it
    /// returns, so a new image cannot be classified before then.
    pub fn reset(&mut self) {
        self.image = None;
        self.prediction = None;
        self.generation += 1;
        debug!("session reset (generation {})", self.generation);
    }

    pub fn begin_prediction(&mut self) -> Result<PredictionTicket, SessionError> {
        let image = self.image.as_ref().ok_or(SessionError::NoImage)?;
        if self.predicting {
            return Err(SessionError::Busy);
        }
        let ticket = PredictionTicket {
            generation: self.generation,
            image: image.image().clone(),
        };
        self.prediction = None;
        self.predicting = true;
        Ok(ticket)
    }

    /// Store `prediction` if its image is still current. Returns whether it was kept.
    pub fn finish_prediction(&mut self, ticket: PredictionTicket, prediction: Prediction) -> bool {
        self.predicting = false;
        if ticket.generation != self.generation || self.image.is_none() {
            debug!(
                "dropping prediction {:?} for stale image (generation {} != {})",
                prediction.label, ticket.generation, self.generation
            );
            return false;
        }
        self.prediction = Some(prediction);
        true
    }

    /// Record a failed prediction as `failure_label`, under the same
    /// generation rule as [`finish_prediction`](Self::finish_prediction).
    pub fn fail_prediction(&mut self, ticket: PredictionTicket, failure_label: &str) -> bool {
        self.finish_prediction(ticket, Prediction::failed(failure_label))
    }

    pub fn image(&self) -> Option<&AcquiredImage> {
        self.image.as_ref()
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        self.prediction.as_ref()
    }

    pub fn is_predicting(&self) -> bool {
        self.predicting
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            has_image: self.image.is_some(),
            source: self.image.as_ref().map(|i| i.source()),
            width: self.image.as_ref().map(|i| i.width()),
            height: self.image.as_ref().map(|i| i.height()),
            preview: self.image.as_ref().map(|i| i.preview_data_url().to_string()),
            prediction: self.prediction.clone(),
            predicting: self.predicting,
            can_acquire: self.image.is_none(),
        }
    }
}
