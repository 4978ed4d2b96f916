//! REST API handlers

use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use gpusched_core::{ApiConfig, Device, GpuschedError, JobId, JobSpec, JobView};
use gpusched_scheduler::{QueueSummary, Scheduler};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across handlers
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Create the API router
pub fn create_router(scheduler: Arc<Scheduler>, config: &ApiConfig) -> Router {
    let state = Arc::new(AppState { scheduler });

    let api_routes = Router::new()
        .route("/devices", get(list_devices))
        .route("/devices/free", get(list_free_devices))
        .route("/jobs", post(submit_job))
        .route("/jobs/pending", get(list_pending))
        .route("/jobs/running", get(list_running))
        .route("/jobs/succeeded", get(list_succeeded))
        .route("/jobs/failed", get(list_failed))
        .route("/jobs/:id", get(get_job))
        .route("/status", get(get_status))
        .route("/settings", put(update_settings));

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = match cors_layer(config) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.with_state(state)
}

fn cors_layer(config: &ApiConfig) -> Option<CorsLayer> {
    if !config.cors_enabled {
        return None;
    }

    let origin = if config.cors_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

fn error_status(e: &GpuschedError) -> StatusCode {
    match e {
        GpuschedError::JobNotFound(_) => StatusCode::NOT_FOUND,
        GpuschedError::InvalidJob(_) | GpuschedError::Config(_) => StatusCode::BAD_REQUEST,
        GpuschedError::QueueFull { .. } | GpuschedError::DaemonNotRunning => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(e: GpuschedError) -> (StatusCode, String) {
    (error_status(&e), e.to_string())
}

async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<Device>> {
    Json(state.scheduler.devices())
}

async fn list_free_devices(State(state): State<Arc<AppState>>) -> Json<Vec<Device>> {
    Json(state.scheduler.free_devices().await)
}

/// Request to submit a job
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub name: String,
    /// Program followed by its arguments
    pub command: Vec<String>,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}

impl SubmitJobRequest {
    fn into_spec(self) -> Result<JobSpec, GpuschedError> {
        if self.name.trim().is_empty() {
            return Err(GpuschedError::InvalidJob("job name must not be empty".to_string()));
        }
        if self.command.first().map_or(true, |p| p.is_empty()) {
            return Err(GpuschedError::InvalidJob("job command must not be empty".to_string()));
        }

        let spec = JobSpec::new(self.name, self.command);
        match self.output_path {
            Some(path) if path.as_os_str().is_empty() => Ok(spec),
            Some(path) if path.exists() => Err(GpuschedError::InvalidJob(format!(
                "output file {} already exists",
                path.display()
            ))),
            Some(path) => Ok(spec.with_output(path)),
            None => Ok(spec),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub id: JobId,
}

/// Validate and queue a job
async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitJobRequest>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    info!(name = %req.name, command = ?req.command, "Submitting job");

    let spec = req.into_spec().map_err(|e| {
        warn!(error = %e, "Rejected job submission");
        api_error(e)
    })?;
    let id = state.scheduler.submit(spec).await.map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(SubmitJobResponse { id })))
}

async fn list_pending(State(state): State<Arc<AppState>>) -> Json<Vec<JobView>> {
    Json(state.scheduler.pending_jobs().await)
}

async fn list_running(State(state): State<Arc<AppState>>) -> Json<Vec<JobView>> {
    Json(state.scheduler.running_jobs().await)
}

async fn list_succeeded(State(state): State<Arc<AppState>>) -> Json<Vec<JobView>> {
    Json(state.scheduler.succeeded_jobs().await)
}

async fn list_failed(State(state): State<Arc<AppState>>) -> Json<Vec<JobView>> {
    Json(state.scheduler.failed_jobs().await)
}

/// Get a job from whichever queue holds it
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<JobView>> {
    let id = JobId(id);
    state
        .scheduler
        .find_job(id)
        .await
        .map(Json)
        .ok_or_else(|| api_error(GpuschedError::JobNotFound(id)))
}

/// System status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    #[serde(flatten)]
    pub queues: QueueSummary,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        queues: state.scheduler.summary().await,
    })
}

/// Request to change daemon settings. Omitted fields are left alone.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub wake_interval_secs: Option<i64>,
    #[serde(default)]
    pub pending_capacity: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub wake_interval_secs: u64,
    pub pending_capacity: usize,
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<SettingsResponse>> {
    let scheduler = &state.scheduler;
    if let Some(secs) = req.wake_interval_secs {
        scheduler.set_wake_interval_secs(secs).map_err(api_error)?;
    }
    if let Some(capacity) = req.pending_capacity {
        scheduler.set_pending_capacity(capacity).map_err(api_error)?;
    }

    Ok(Json(SettingsResponse {
        wake_interval_secs: scheduler.wake_interval_secs(),
        pending_capacity: scheduler.pending_capacity(),
    }))
}
