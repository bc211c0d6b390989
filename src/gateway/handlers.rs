#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::catalog::model::script_source;
use crate::catalog::{Command, CommandStore, ScheduledCommand};
use crate::error::{GatewayError, StoreError};
use crate::gateway::AppState;
use crate::gateway::request::RequestVars;
use crate::scheduler::TrackedJob;

type Params = Path<HashMap<String, String>>;

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Store(_) | Self::Scheduler(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Decodes the path and checks the secret before anything touches the
/// catalog or the scheduler.
fn authorize(
    state: &AppState,
    params: &HashMap<String, String>,
) -> Result<RequestVars, GatewayError> {
    let vars = RequestVars::decode(params)?;
    if !state.secret.verify(&vars.secret) {
        return Err(GatewayError::Unauthorized);
    }
    Ok(vars)
}

/// Runs a catalog operation on the blocking pool; the store does file I/O
/// under a blocking lock.
async fn with_store<T, F>(state: &AppState, op: F) -> Result<T, GatewayError>
where
    T: Send + 'static,
    F: FnOnce(&CommandStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| GatewayError::Internal(format!("catalog task failed: {e}")))?
        .map_err(GatewayError::from)
}

async fn lookup(state: &AppState, hash: &str) -> Result<Command, GatewayError> {
    let prefix = hash.to_owned();
    with_store(state, move |store| store.select_by_hash_prefix(&prefix))
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("no command matches hash {hash}")))
}

pub async fn add(
    State(state): State<AppState>,
    Path(params): Params,
) -> Result<Json<bool>, GatewayError> {
    let vars = authorize(&state, &params)?;
    let text = vars.require_command()?;
    if !vars.working_directory.is_empty() && !FsPath::new(&vars.working_directory).is_dir() {
        return Err(GatewayError::BadRequest(format!(
            "invalid working directory: {}",
            vars.working_directory
        )));
    }

    let cmd = Command::new(text, &vars.description, &vars.working_directory);
    with_store(&state, move |store| store.insert(cmd)).await?;
    Ok(Json(true))
}

pub async fn list(
    State(state): State<AppState>,
    Path(params): Params,
) -> Result<Json<Vec<Command>>, GatewayError> {
    authorize(&state, &params)?;
    tracing::debug!("listing commands");
    Ok(Json(with_store(&state, CommandStore::list).await?))
}

pub async fn search(
    State(state): State<AppState>,
    Path(params): Params,
) -> Result<Json<Vec<Command>>, GatewayError> {
    let vars = authorize(&state, &params)?;
    tracing::debug!(description = %vars.description, "searching commands");
    let needle = vars.description;
    let found = with_store(&state, move |store| store.search_by_description(&needle)).await?;
    Ok(Json(found))
}

pub async fn select(
    State(state): State<AppState>,
    Path(params): Params,
) -> Result<Json<Command>, GatewayError> {
    let vars = authorize(&state, &params)?;
    Ok(Json(lookup(&state, vars.require_hash()?).await?))
}

pub async fn show(
    State(state): State<AppState>,
    Path(params): Params,
) -> Result<Json<String>, GatewayError> {
    let vars = authorize(&state, &params)?;
    let cmd = lookup(&state, vars.require_hash()?).await?;
    let source = tokio::task::spawn_blocking(move || script_source(&cmd))
        .await
        .map_err(|e| GatewayError::Internal(format!("show task failed: {e}")))?;
    Ok(Json(source))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(params): Params,
) -> Result<Json<Vec<Command>>, GatewayError> {
    let vars = authorize(&state, &params)?;
    let prefix = vars.require_hash()?.to_owned();
    let removed = with_store(&state, move |store| store.delete_by_hash_prefix(&prefix)).await?;
    Ok(Json(removed))
}

/// Runs a stored command and waits for it. The worker records the duration
/// and schedules the vacuum, so both happen even if the client goes away.
pub async fn run(
    State(state): State<AppState>,
    Path(params): Params,
) -> Result<Json<ScheduledCommand>, GatewayError> {
    let vars = authorize(&state, &params)?;
    let cmd = lookup(&state, vars.require_hash()?).await?;
    let (_job_id, finished) = state.scheduler.run(cmd).await?;
    Ok(Json(finished))
}

pub async fn status(
    State(state): State<AppState>,
    Path(params): Params,
) -> Result<Json<Vec<TrackedJob>>, GatewayError> {
    authorize(&state, &params)?;
    Ok(Json(state.scheduler.status()))
}
