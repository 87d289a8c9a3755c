//! HTTP surface: task creation, status polling, health.
//!
//! Handlers translate requests into store and queue calls. Responses are
//! plain text; failures carry the error message as the body.

use crate::error::Error;
use crate::model::Task;
use crate::queue::TaskQueue;
use crate::store::TaskStore;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Upper bound on handling a single request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// State shared across routes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TaskStore>,
    pub queue: Arc<dyn TaskQueue>,
}

/// Body of `POST /tasks`. Any `id` or `status` sent by the caller is ignored.
/// A missing or null payload is stored as the empty string.
#[derive(Debug, Deserialize)]
struct CreateTaskRequest {
    #[serde(default)]
    payload: Option<String>,
}

impl CreateTaskRequest {
    /// Decode a request body. Only a JSON object is accepted; the derived
    /// impl alone would also bind a JSON array to the fields by position.
    fn from_body(body: &[u8]) -> serde_json::Result<Self> {
        let object: Map<String, Value> = serde_json::from_slice(body)?;
        serde_json::from_value(Value::Object(object))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(create_task))
        .route("/tasks/:id", get(get_task))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(TraceLayer::new_for_http())
}

/// POST /tasks: store a pending task, publish it, return its id.
async fn create_task(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let req = CreateTaskRequest::from_body(&body).map_err(|e| {
        error!(error = %e, "error parsing payload");
        ApiError::BadRequest(e.to_string())
    })?;

    let task = Task::new(req.payload.unwrap_or_default());
    state.store.create_task(&task).await.inspect_err(|e| {
        error!(error = %e, "error creating task");
    })?;

    let data = task.to_bytes()?;
    state.queue.push(&data).await.inspect_err(|e| {
        error!(task.id = %task.id, error = %e, "error pushing task");
    })?;

    info!(task.id = %task.id, "task created");
    Ok((StatusCode::CREATED, task.id.to_string()).into_response())
}

/// GET /tasks/:id: current status name.
async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let task = state.store.get_task(&id).await.inspect_err(|e| {
        error!(task.id = %id, error = %e, "error getting task");
    })?;
    Ok((StatusCode::OK, task.status.to_string()).into_response())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Handler failure, rendered as a status code with the error text as body.
#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Core(Error),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Core(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Core(e @ Error::TaskNotFound(_)) => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Core(e @ Error::InvalidTaskData(_)) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ApiError::Core(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, message).into_response()
    }
}
