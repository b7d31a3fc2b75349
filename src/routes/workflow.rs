use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::response::AppError;
use crate::routes::ok;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/steps", get(steps))
        .route("/steps/:order", get(step))
        .route("/progress", post(start_progress))
        .route("/progress/:id", get(get_progress))
        .route("/progress/:id/steps/:order", put(update_step))
        .route("/progress/:id/steps/:order/complete", post(complete_step))
        .route("/progress/:id/steps/:order/validate", post(validate_step))
        .route("/progress/:id/goto/:order", post(go_to_step))
        .route("/progress/:id/previous", post(previous_step))
        .route("/progress/:id/summary", get(summary))
        .route("/progress/:id/finalize", post(finalize))
        .route("/progress/:id/abandon", post(abandon))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    user_id: String,
}

async fn steps(State(state): State<AppState>) -> Response {
    let steps = state.workflow().get_workflow_steps().to_vec();
    ok(steps).into_response()
}

async fn step(State(state): State<AppState>, Path(order): Path<u32>) -> Result<Response, AppError> {
    let step = state
        .workflow()
        .get_step(order)
        .cloned()
        .ok_or_else(|| AppError::not_found(format!("workflow step not found: {order}")))?;
    Ok(ok(step).into_response())
}

async fn start_progress(
    State(state): State<AppState>,
    Json(body): Json<StartRequest>,
) -> Result<Response, AppError> {
    let user_id = body.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::validation("userId is required"));
    }
    let progress = state.workflow().get_or_create_progress(user_id).await?;
    Ok(ok(progress).into_response())
}

async fn get_progress(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let progress = state.workflow().get_progress(&id).await?;
    Ok(ok(progress).into_response())
}

async fn update_step(
    State(state): State<AppState>,
    Path((id, order)): Path<(String, u32)>,
    Json(data): Json<Map<String, Value>>,
) -> Result<Response, AppError> {
    let progress = state.workflow().update_step_data(&id, order, data).await?;
    Ok(ok(progress).into_response())
}

async fn complete_step(
    State(state): State<AppState>,
    Path((id, order)): Path<(String, u32)>,
) -> Result<Response, AppError> {
    let progress = state.workflow().complete_step(&id, order).await?;
    Ok(ok(progress).into_response())
}

/// Field errors come back as data, never as an error response.
async fn validate_step(
    State(state): State<AppState>,
    Path((_id, order)): Path<(String, u32)>,
    Json(data): Json<Map<String, Value>>,
) -> Result<Response, AppError> {
    let result = state.workflow().validate_step_data(order, &data)?;
    Ok(ok(result).into_response())
}

async fn go_to_step(
    State(state): State<AppState>,
    Path((id, order)): Path<(String, u32)>,
) -> Result<Response, AppError> {
    let progress = state.workflow().go_to_step(&id, order).await?;
    Ok(ok(progress).into_response())
}

async fn previous_step(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let progress = state.workflow().go_to_previous_step(&id).await?;
    Ok(ok(progress).into_response())
}

async fn summary(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let summary = state.workflow().get_workflow_summary(&id).await?;
    Ok(ok(summary).into_response())
}

async fn finalize(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let profile = state.workflow().finalize_workflow(&id).await?;
    Ok(ok(profile).into_response())
}

async fn abandon(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let progress = state.workflow().abandon_workflow(&id).await?;
    Ok(ok(progress).into_response())
}
