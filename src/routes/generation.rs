use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::response::AppError;
use crate::routes::ok;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate))
        .route("/jobs/:id", get(job_status))
        .route("/jobs/:id/cancel", post(cancel))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    profile_id: String,
}

async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequest>,
) -> Result<Response, AppError> {
    let profile_id = body.profile_id.trim();
    if profile_id.is_empty() {
        return Err(AppError::validation("profileId is required"));
    }
    let job = state.generator().request_generation(profile_id).await?;
    Ok((StatusCode::ACCEPTED, ok(job)).into_response())
}

async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let job = state.generator().get_generation_status(&id).await?;
    Ok(ok(job).into_response())
}

async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let job = state.generator().cancel_generation(&id).await?;
    Ok(ok(job).into_response())
}
