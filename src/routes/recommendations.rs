use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::response::AppError;
use crate::routes::ok;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/learning-paths", get(learning_paths))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LearningPathQuery {
    user_id: String,
    #[serde(default)]
    assessment_id: Option<String>,
}

async fn learning_paths(
    State(state): State<AppState>,
    Query(query): Query<LearningPathQuery>,
) -> Result<Response, AppError> {
    let user_id = query.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::validation("userId is required"));
    }
    let assessment_id = query.assessment_id.as_deref().filter(|id| !id.trim().is_empty());
    let paths = state
        .learning_paths()
        .generate_recommendations(user_id, assessment_id)
        .await;
    Ok(ok(paths).into_response())
}
