pub mod acquisition;
pub mod error;
pub mod ml;
pub mod model;
pub mod session;
pub mod types;

#[cfg(feature = "app")]
mod ml_commands;

#[cfg(feature = "app")]
use std::path::Path;
#[cfg(feature = "app")]
use std::sync::{Arc, Mutex};
#[cfg(feature = "app")]
use tauri::{AppHandle, Emitter, Manager, State};

#[cfg(feature = "app")]
use acquisition::{acquire_from_data_url, acquire_from_path, AcquiredImage};
#[cfg(feature = "app")]
use ml::ModelCache;
#[cfg(feature = "app")]
use model::{AppConfig, InferenceConfig};
#[cfg(feature = "app")]
use session::Session;
#[cfg(feature = "app")]
use types::{ImageSource, SessionView};

/// Install the env_logger backend. `RUST_LOG` wins over `default_filter` when set.
pub fn init_logging(default_filter: log::LevelFilter) -> anyhow::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    )
    .try_init()
    .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

#[cfg(feature = "app")]
pub struct AppState {
    session: Arc<Mutex<Session>>,
    models: Arc<ModelCache>,
    config: Arc<InferenceConfig>,
}

#[cfg(feature = "app")]
impl AppState {
    fn new(config: InferenceConfig) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new())),
            models: Arc::new(ModelCache::new()),
            config: Arc::new(config),
        }
    }
}

#[cfg(feature = "app")]
const SESSION_EVENT: &str = "session-changed";

#[cfg(feature = "app")]
fn emit_session(app: &AppHandle, view: &SessionView) {
    if let Err(e) = app.emit(SESSION_EVENT, view) {
        log::warn!("failed to emit {}: {}", SESSION_EVENT, e);
    }
}

#[cfg(feature = "app")]
fn ensure_can_acquire(state: &AppState) -> Result<(), String> {
    let session = state.session.lock().map_err(|e| e.to_string())?;
    if session.image().is_some() {
        return Err(error::SessionError::ImagePresent.to_string());
    }
    Ok(())
}

#[cfg(feature = "app")]
fn store_image(app: &AppHandle, state: &AppState, image: AcquiredImage) -> Result<SessionView, String> {
    let view = {
        let mut session = state.session.lock().map_err(|e| e.to_string())?;
        session.acquire(image).map_err(|e| e.to_string())?;
        session.view()
    };
    emit_session(app, &view);
    Ok(view)
}

// Tauri commands

/// Gallery / file picker: the frontend passes the picked path.
#[cfg(feature = "app")]
#[tauri::command]
async fn acquire_image_path(
    path: String,
    source: Option<ImageSource>,
    app: AppHandle,
    state: State<'_, AppState>,
) -> Result<SessionView, String> {
    ensure_can_acquire(&state)?;
    let source = source.unwrap_or(ImageSource::Gallery);

    let image = tauri::async_runtime::spawn_blocking(move || acquire_from_path(Path::new(&path), source))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| format!("{e:#}"))?;

    store_image(&app, &state, image)
}

/// Camera capture (or webview file input) delivered as a base64 data URL.
#[cfg(feature = "app")]
#[tauri::command]
async fn acquire_image_data_url(
    data_url: String,
    source: Option<ImageSource>,
    app: AppHandle,
    state: State<'_, AppState>,
) -> Result<SessionView, String> {
    ensure_can_acquire(&state)?;
    let source = source.unwrap_or(ImageSource::Camera);

    let image = tauri::async_runtime::spawn_blocking(move || acquire_from_data_url(&data_url, source))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| format!("{e:#}"))?;

    store_image(&app, &state, image)
}

#[cfg(feature = "app")]
#[tauri::command]
fn reset_session(app: AppHandle, state: State<AppState>) -> Result<SessionView, String> {
    let view = {
        let mut session = state.session.lock().map_err(|e| e.to_string())?;
        session.reset();
        session.view()
    };
    emit_session(&app, &view);
    Ok(view)
}

#[cfg(feature = "app")]
#[tauri::command]
fn session_view(state: State<AppState>) -> Result<SessionView, String> {
    let session = state.session.lock().map_err(|e| e.to_string())?;
    Ok(session.view())
}

#[cfg(feature = "app")]
fn resolve_inference_config(app: &tauri::App) -> InferenceConfig {
    let settings_path = app
        .path()
        .app_config_dir()
        .map(|dir| dir.join("config.json"))
        .ok()
        .filter(|path| path.exists())
        .unwrap_or_else(AppConfig::default_path);
    let mut config = InferenceConfig::from_app_config(&AppConfig::load_or_default_from(settings_path));

    // bundled model shipped as an app resource
    if let Ok(resource_dir) = app.path().resource_dir() {
        config.resolve_model_path(&resource_dir);
    }
    config
}

#[cfg(feature = "app")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    init_logging(log::LevelFilter::Info).expect("failed to initialize logging");

    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            let config = resolve_inference_config(app);
            log::info!("model path: {}", config.model_path.display());
            app.manage(AppState::new(config));

            // load once; failures leave the app unready until restart
            ml_commands::spawn_model_load(app.handle().clone());
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            acquire_image_path,
            acquire_image_data_url,
            reset_session,
            session_view,
            // inference
            ml_commands::load_model,
            ml_commands::model_status,
            ml_commands::predict,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
