mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use curriculum_backend::services::profile::ExperienceLevel;

use common::{harness, profile, seed_catalog, Harness};

fn app(h: &Harness) -> Router {
    curriculum_backend::create_app(h.state.clone())
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_store_backend() {
    let h = harness();
    let (status, body) = send(app(&h), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "recording");
    assert_eq!(body["database"], "connected");
    assert!(body["startTime"].is_string());

    let (status, body) = send(app(&h), "GET", "/health/live", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let h = harness();
    let (status, body) = send(app(&h), "GET", "/api/nowhere", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn generate_then_poll_job() {
    let h = harness();
    h.store.inner.insert_profile(profile("p1", "u1", ExperienceLevel::Beginner, 6));
    seed_catalog(&h.store.inner);

    let (status, body) = send(
        app(&h),
        "POST",
        "/api/curriculum/generate",
        Some(json!({ "profileId": "p1" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "pending");
    let job_id = body["data"]["id"].as_str().unwrap().to_string();

    let done = common::wait_for_terminal(&h.generator(), &job_id).await;
    let curriculum_id = done.generated_curriculum_id.unwrap();

    let (status, body) = send(app(&h), "GET", &format!("/api/curriculum/jobs/{job_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["generatedCurriculumId"], curriculum_id.as_str());

    let (status, body) = send(app(&h), "GET", &format!("/api/curricula/{curriculum_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["courses"].as_array().unwrap().len(), 4);
    assert_eq!(body["data"]["isPublished"], false);
}

#[tokio::test]
async fn blank_profile_id_is_rejected() {
    let h = harness();
    let (status, body) = send(
        app(&h),
        "POST",
        "/api/curriculum/generate",
        Some(json!({ "profileId": "  " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unknown_job_is_404() {
    let h = harness();
    let (status, body) = send(app(&h), "GET", "/api/curriculum/jobs/missing", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn publish_without_approvals_is_bad_request() {
    let h = harness();
    h.store.inner.insert_profile(profile("p1", "u1", ExperienceLevel::Beginner, 6));
    seed_catalog(&h.store.inner);

    let job = h.generator().request_generation("p1").await.unwrap();
    let done = common::wait_for_terminal(&h.generator(), &job.id).await;
    let curriculum_id = done.generated_curriculum_id.unwrap();

    let (status, _) = send(
        app(&h),
        "POST",
        &format!("/api/curricula/{curriculum_id}/publish"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        app(&h),
        "POST",
        &format!("/api/curricula/{curriculum_id}/courses/1/approve"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        app(&h),
        "POST",
        &format!("/api/curricula/{curriculum_id}/publish"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isPublished"], true);
    assert_eq!(body["data"]["excludedCourses"], 0);
}

#[tokio::test]
async fn workflow_round_trip_over_http() {
    let h = harness();

    let (status, body) = send(app(&h), "GET", "/api/workflow/steps", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 6);

    let (status, body) = send(
        app(&h),
        "POST",
        "/api/workflow/progress",
        Some(json!({ "userId": "u1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let progress_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        app(&h),
        "POST",
        &format!("/api/workflow/progress/{progress_id}/steps/1/validate"),
        Some(json!({ "profile_name": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isValid"], false);
    assert!(body["data"]["errors"]["profile_name"].is_string());

    let (status, body) = send(
        app(&h),
        "PUT",
        &format!("/api/workflow/progress/{progress_id}/steps/1"),
        Some(json!({ "profile_name": "Data Upskilling" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "in_progress");

    let (status, body) = send(
        app(&h),
        "POST",
        &format!("/api/workflow/progress/{progress_id}/goto/9"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        app(&h),
        "POST",
        &format!("/api/workflow/progress/{progress_id}/finalize"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["profileName"], "Data Upskilling");
}

#[tokio::test]
async fn learning_paths_for_catalog() {
    let h = harness();
    seed_catalog(&h.store.inner);

    let (status, body) = send(
        app(&h),
        "GET",
        "/api/recommendations/learning-paths?userId=u1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let paths = body["data"].as_array().unwrap();
    assert!(paths.iter().any(|p| p["kind"] == "career"));
}
