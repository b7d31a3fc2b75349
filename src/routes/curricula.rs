use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::response::AppError;
use crate::routes::ok;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_curriculum))
        .route("/:id/stats", get(stats))
        .route("/:id/courses/bulk-approve", post(bulk_approve))
        .route("/:id/courses/bulk-reject", post(bulk_reject))
        .route("/:id/courses/:course_id/approve", post(approve))
        .route("/:id/courses/:course_id/reject", post(reject))
        .route("/:id/courses/:course_id/notes", put(notes))
        .route("/:id/publish", post(publish))
        .route("/:id/active", put(set_active))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkRequest {
    course_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct NotesRequest {
    notes: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveRequest {
    is_active: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CourseDecision {
    curriculum_id: String,
    course_id: i64,
    user_approved: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActiveResponse {
    curriculum_id: String,
    is_active: bool,
}

async fn get_curriculum(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let detail = state.approval().get_curriculum(&id).await?;
    Ok(ok(detail).into_response())
}

async fn stats(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let stats = state.approval().get_curriculum_stats(&id).await?;
    Ok(ok(stats).into_response())
}

async fn approve(
    State(state): State<AppState>,
    Path((id, course_id)): Path<(String, i64)>,
) -> Result<Response, AppError> {
    state.approval().approve_course(&id, course_id).await?;
    Ok(ok(CourseDecision {
        curriculum_id: id,
        course_id,
        user_approved: Some(true),
    })
    .into_response())
}

async fn reject(
    State(state): State<AppState>,
    Path((id, course_id)): Path<(String, i64)>,
) -> Result<Response, AppError> {
    state.approval().reject_course(&id, course_id).await?;
    Ok(ok(CourseDecision {
        curriculum_id: id,
        course_id,
        user_approved: Some(false),
    })
    .into_response())
}

async fn bulk_approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<BulkRequest>,
) -> Result<Response, AppError> {
    let result = state.approval().bulk_approve(&id, &body.course_ids).await?;
    Ok(ok(result).into_response())
}

async fn bulk_reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<BulkRequest>,
) -> Result<Response, AppError> {
    let result = state.approval().bulk_reject(&id, &body.course_ids).await?;
    Ok(ok(result).into_response())
}

async fn notes(
    State(state): State<AppState>,
    Path((id, course_id)): Path<(String, i64)>,
    Json(body): Json<NotesRequest>,
) -> Result<Response, AppError> {
    state.approval().add_course_notes(&id, course_id, body.notes).await?;
    let detail = state.approval().get_curriculum(&id).await?;
    let link = detail.courses.into_iter().find(|c| c.course_id == course_id);
    Ok(ok(link).into_response())
}

async fn publish(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let published = state.approval().publish_curriculum(&id).await?;
    Ok(ok(published).into_response())
}

async fn set_active(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ActiveRequest>,
) -> Result<Response, AppError> {
    state.approval().set_curriculum_active(&id, body.is_active).await?;
    Ok(ok(ActiveResponse {
        curriculum_id: id,
        is_active: body.is_active,
    })
    .into_response())
}
