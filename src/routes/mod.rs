mod curricula;
mod generation;
mod health;
mod recommendations;
mod workflow;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;

use crate::response::json_error;
use crate::state::AppState;

#[derive(Serialize)]
pub(crate) struct SuccessResponse<T> {
    success: bool,
    data: T,
}

pub(crate) fn ok<T: Serialize>(data: T) -> Json<SuccessResponse<T>> {
    Json(SuccessResponse {
        success: true,
        data,
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/api/curriculum", generation::router())
        .nest("/api/curricula", curricula::router())
        .nest("/api/workflow", workflow::router())
        .nest("/api/recommendations", recommendations::router())
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "route not found").into_response()
}
