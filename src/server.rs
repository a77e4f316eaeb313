use crate::backend::HighsBackend;
use crate::config::{ServerConfig, SolveConfig};
use crate::data::{Assignment, SchoolId, SchoolSnapshot, SolveResult};
use crate::error::TimetableError;
use crate::repository::{InMemoryRepository, RepositoryError};
use crate::solver;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{post, put};
use axum::{Json, Router};
use log::{error, info};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct AppState {
    pub repository: Arc<InMemoryRepository>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveRequest {
    pub snapshot: SchoolSnapshot,
    #[serde(default)]
    pub config: SolveConfig,
}

/// Error body returned by every route.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<Value>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.message });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<TimetableError> for ApiError {
    fn from(e: TimetableError) -> Self {
        if e.is_internal() {
            error!("Timetabling failed internally: {e}");
        }
        let details = match &e {
            TimetableError::InvalidInput(problems) => serde_json::to_value(problems).ok(),
            TimetableError::SolverContractViolation(violations) => {
                serde_json::to_value(violations).ok()
            }
            _ => None,
        };
        let status = match &e {
            TimetableError::InvalidInput(_)
            | TimetableError::StructureConflict { .. }
            | TimetableError::FixedSlotConflict { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            TimetableError::Repository(RepositoryError::SchoolNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            TimetableError::Repository(RepositoryError::Stale { .. }) => StatusCode::CONFLICT,
            TimetableError::SolverContractViolation(_)
            | TimetableError::Backend(_)
            | TimetableError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
            details,
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        TimetableError::from(e).into()
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        error!("Solver task failed: {e}");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "solver task failed")
    }
}

async fn solve_handler(Json(request): Json<SolveRequest>) -> Result<Json<SolveResult>, ApiError> {
    let result = tokio::task::spawn_blocking(move || {
        solver::generate_timetable(&request.snapshot, &request.config)
    })
    .await??;
    Ok(Json(result))
}

async fn put_snapshot_handler(
    State(state): State<AppState>,
    Path(school_id): Path<SchoolId>,
    Json(snapshot): Json<SchoolSnapshot>,
) -> Result<StatusCode, ApiError> {
    state.repository.put_snapshot(school_id, snapshot)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn solve_school_handler(
    State(state): State<AppState>,
    Path(school_id): Path<SchoolId>,
    config: Option<Json<SolveConfig>>,
) -> Result<Json<SolveResult>, ApiError> {
    let config = config.map(|Json(c)| c).unwrap_or_default();
    let repository = state.repository.clone();
    let result = tokio::task::spawn_blocking(move || {
        let backend = HighsBackend::from_config(&config);
        solver::generate_for_school(repository.as_ref(), school_id, &config, &backend)
    })
    .await??;
    Ok(Json(result))
}

async fn get_timetable_handler(
    State(state): State<AppState>,
    Path(school_id): Path<SchoolId>,
) -> Result<Json<Assignment>, ApiError> {
    match state.repository.assignment(school_id)? {
        Some(assignment) => Ok(Json(assignment)),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("school {school_id} has no timetable yet"),
        )),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/timetable/solve", post(solve_handler))
        .route("/v1/schools/:school_id/snapshot", put(put_snapshot_handler))
        .route(
            "/v1/schools/:school_id/timetable",
            post(solve_school_handler).get(get_timetable_handler),
        )
        .with_state(state)
}

pub async fn run_server(config: ServerConfig) -> std::io::Result<()> {
    let app = router(AppState::default());
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Server running at http://{}", listener.local_addr()?);
    axum::serve(listener, app).await
}
