//! Model loading and prediction commands

use log::{error, info};
use tauri::{AppHandle, Emitter, Manager, State};

use crate::types::{ModelStatus, ModelStatusPayload, SessionView};
use crate::{emit_session, AppState};

const MODEL_STATUS_EVENT: &str = "model-status";

fn emit_model_status(app: &AppHandle, payload: &ModelStatusPayload) {
    if let Err(e) = app.emit(MODEL_STATUS_EVENT, payload) {
        log::warn!("failed to emit {}: {}", MODEL_STATUS_EVENT, e);
    }
}

/// Load the model on a blocking worker and publish the outcome.
async fn load_in_background(app: &AppHandle) -> ModelStatusPayload {
    let state = app.state::<AppState>();
    let models = state.models.clone();
    let config = state.config.clone();

    if models.status() == ModelStatus::NotLoaded {
        emit_model_status(
            app,
            &ModelStatusPayload {
                status: ModelStatus::Loading,
                error: None,
            },
        );
    }

    let join = tauri::async_runtime::spawn_blocking(move || models.load(&config).map(|_| ())).await;
    match join {
        Ok(Ok(())) => info!("model loaded"),
        Ok(Err(e)) => error!("model loading error: {e}"),
        Err(e) => error!("model loading task panicked: {e}"),
    }

    let payload = state.models.payload();
    emit_model_status(app, &payload);
    payload
}

pub fn spawn_model_load(app: AppHandle) {
    tauri::async_runtime::spawn(async move {
        load_in_background(&app).await;
    });
}

/// Idempotent: returns the cached status once the model is ready or has failed.
#[tauri::command]
pub async fn load_model(app: AppHandle) -> Result<ModelStatusPayload, String> {
    Ok(load_in_background(&app).await)
}

#[tauri::command]
pub fn model_status(state: State<AppState>) -> ModelStatusPayload {
    state.models.payload()
}

/// Classify the current image. Rejected when no image is held, the model is
/// not ready, or a prediction is already running.
#[tauri::command]
pub async fn predict(app: AppHandle, state: State<'_, AppState>) -> Result<SessionView, String> {
    let engine = state.models.ready().map_err(|e| e.to_string())?;

    let (ticket, view) = {
        let mut session = state.session.lock().map_err(|e| e.to_string())?;
        let ticket = session.begin_prediction().map_err(|e| e.to_string())?;
        (ticket, session.view())
    };
    emit_session(&app, &view);

    let job = ticket.clone();
    let outcome = tauri::async_runtime::spawn_blocking(move || engine.predict(job.image())).await;

    let view = {
        let mut session = state.session.lock().map_err(|e| e.to_string())?;
        match outcome {
            Ok(Ok(prediction)) => {
                info!("prediction: {} ({:?})", prediction.label, prediction.outcome);
                session.finish_prediction(ticket, prediction);
            }
            Ok(Err(e)) => {
                error!("prediction failed: {e}");
                session.fail_prediction(ticket, &state.config.failure_label);
            }
            Err(e) => {
                error!("prediction task panicked: {e}");
                session.fail_prediction(ticket, &state.config.failure_label);
            }
        }
        session.view()
    };
    emit_session(&app, &view);
    Ok(view)
}
