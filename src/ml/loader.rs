//! Process-wide model handle, loaded at most once.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use log::{error, info};

use crate::error::ModelError;
use crate::ml::inference::InferenceEngine;
use crate::model::InferenceConfig;
use crate::types::{ModelStatus, ModelStatusPayload};

#[derive(Debug)]
struct LoadState {
    status: ModelStatus,
    error: Option<String>,
}

/// Initialise-once cell for the inference engine.
///
/// A failed load is final for the session: later calls return the recorded
/// error instead of trying again.
pub struct ModelCache {
    engine: OnceLock<Arc<InferenceEngine>>,
    state: Mutex<LoadState>,
    load_lock: Mutex<()>,
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelCache {
    pub fn new() -> Self {
        Self {
            engine: OnceLock::new(),
            state: Mutex::new(LoadState {
                status: ModelStatus::NotLoaded,
                error: None,
            }),
            load_lock: Mutex::new(()),
        }
    }

    pub fn load(&self, config: &InferenceConfig) -> Result<Arc<InferenceEngine>, ModelError> {
        self.load_with(|| {
            if !config.model_path.exists() {
                return Err(ModelError::NotFound(config.model_path.clone()));
            }
            InferenceEngine::load(config).map_err(|e| ModelError::Load(format!("{e:#}")))
        })
    }

    /// Run `loader` unless a handle exists or an earlier attempt failed.
    ///
    /// A panicking loader is recorded as a failed load.
    pub fn load_with<F>(&self, loader: F) -> Result<Arc<InferenceEngine>, ModelError>
    where
        F: FnOnce() -> Result<InferenceEngine, ModelError>,
    {
        if let Some(engine) = self.engine.get() {
            return Ok(engine.clone());
        }

        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        // another caller may have finished while we waited
        if let Some(engine) = self.engine.get() {
            return Ok(engine.clone());
        }
        if let Some(message) = self.failure() {
            return Err(ModelError::Failed(message));
        }

        self.set_state(ModelStatus::Loading, None);
        let result = panic::catch_unwind(AssertUnwindSafe(loader))
            .unwrap_or_else(|payload| Err(ModelError::Load(panic_message(payload))));
        match result {
            Ok(engine) => {
                let engine = self.engine.get_or_init(|| Arc::new(engine)).clone();
                self.set_state(ModelStatus::Ready, None);
                info!("model ready");
                Ok(engine)
            }
            Err(e) => {
                error!("model loading error: {e}");
                self.set_state(ModelStatus::Failed, Some(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn get(&self) -> Option<Arc<InferenceEngine>> {
        self.engine.get().cloned()
    }

    /// Engine handle for a prediction, or `NotReady` while loading/failed.
    pub fn ready(&self) -> Result<Arc<InferenceEngine>, ModelError> {
        self.get().ok_or(ModelError::NotReady)
    }

    pub fn status(&self) -> ModelStatus {
        self.lock_state().status
    }

    pub fn payload(&self) -> ModelStatusPayload {
        let state = self.lock_state();
        ModelStatusPayload {
            status: state.status,
            error: state.error.clone(),
        }
    }

    fn failure(&self) -> Option<String> {
        let state = self.lock_state();
        match state.status {
            ModelStatus::Failed => Some(state.error.clone().unwrap_or_default()),
            _ => None,
        }
    }

    fn set_state(&self, status: ModelStatus, error: Option<String>) {
        let mut state = self.lock_state();
        state.status = status;
        state.error = error;
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("model loader panicked: {detail}")
}
