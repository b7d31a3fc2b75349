use std::sync::Arc;

use serde_json::{json, Map, Value};

use curriculum_backend::db::{CurriculumStore, InMemoryStore};
use curriculum_backend::services::lifecycle::WorkflowStatus;
use curriculum_backend::services::profile::{Assessment, ExperienceLevel, LearningStyle};
use curriculum_backend::services::workflow::{ProfileWorkflowService, WorkflowError};

fn service() -> (Arc<InMemoryStore>, ProfileWorkflowService) {
    let store = Arc::new(InMemoryStore::new());
    let service = ProfileWorkflowService::new(store.clone());
    (store, service)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

async fn fill_steps(service: &ProfileWorkflowService, progress_id: &str, assessment_id: Option<&str>) {
    let steps = [
        (1, json!({ "profile_name": "Data Upskilling", "description": "Evenings only" })),
        (
            2,
            json!({
                "target_audience": "professional",
                "experience_level": "intermediate",
                "industry": "finance",
                "years_experience": 4
            }),
        ),
        (3, json!({ "learning_goals": [{ "id": "g1", "label": "python" }] })),
        (
            4,
            json!({ "preferred_learning_style": "hands-on", "available_hours_per_week": 6 }),
        ),
        (5, json!({ "latest_assessment_id": assessment_id })),
    ];
    for (order, data) in steps {
        service
            .update_step_data(progress_id, order, object(data))
            .await
            .unwrap();
        service.complete_step(progress_id, order).await.unwrap();
    }
}

#[tokio::test]
async fn completing_steps_never_moves_backwards_or_duplicates() {
    let (_, service) = service();
    let progress = service.get_or_create_progress("u1").await.unwrap();
    assert_eq!(progress.current_step_order, 1);
    assert_eq!(progress.status, WorkflowStatus::NotStarted);

    let mut last = progress.current_step_order;
    for order in [1, 2, 2, 1, 3, 3, 2] {
        let updated = service.complete_step(&progress.id, order).await.unwrap();
        assert!(updated.current_step_order >= last);
        last = updated.current_step_order;

        let mut seen = updated.completed_steps.clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), updated.completed_steps.len());
    }

    let progress = service.get_progress(&progress.id).await.unwrap();
    assert_eq!(progress.current_step_order, 4);
    assert_eq!(progress.completed_steps, vec![1, 2, 3]);
    assert_eq!(progress.status, WorkflowStatus::InProgress);
}

#[tokio::test]
async fn completing_last_step_stays_on_it() {
    let (_, service) = service();
    let progress = service.get_or_create_progress("u1").await.unwrap();
    let updated = service.complete_step(&progress.id, 6).await.unwrap();
    assert_eq!(updated.current_step_order, 6);
}

#[tokio::test]
async fn previous_step_clamps_at_first() {
    let (_, service) = service();
    let progress = service.get_or_create_progress("u1").await.unwrap();

    let updated = service.go_to_previous_step(&progress.id).await.unwrap();
    assert_eq!(updated.current_step_order, 1);

    service.go_to_step(&progress.id, 3).await.unwrap();
    let updated = service.go_to_previous_step(&progress.id).await.unwrap();
    assert_eq!(updated.current_step_order, 2);
}

#[tokio::test]
async fn out_of_range_steps_are_rejected() {
    let (_, service) = service();
    let progress = service.get_or_create_progress("u1").await.unwrap();

    let err = service.go_to_step(&progress.id, 7).await.unwrap_err();
    assert!(matches!(err, WorkflowError::StepOutOfRange { order: 7, count: 6 }));
    let err = service.go_to_step(&progress.id, 0).await.unwrap_err();
    assert!(matches!(err, WorkflowError::StepOutOfRange { .. }));
}

#[tokio::test]
async fn unknown_progress_is_not_found() {
    let (_, service) = service();
    let err = service.get_progress("missing").await.unwrap_err();
    match err {
        WorkflowError::Store(e) => assert!(e.is_not_found()),
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn step_data_is_stored_per_step() {
    let (_, service) = service();
    let progress = service.get_or_create_progress("u1").await.unwrap();

    let updated = service
        .update_step_data(&progress.id, 1, object(json!({ "profile_name": "First" })))
        .await
        .unwrap();
    assert_eq!(updated.status, WorkflowStatus::InProgress);
    assert_eq!(updated.step_data["step_1"]["profile_name"], "First");

    let updated = service
        .update_step_data(&progress.id, 1, object(json!({ "profile_name": "Second" })))
        .await
        .unwrap();
    assert_eq!(updated.step_data["step_1"]["profile_name"], "Second");
}

#[tokio::test]
async fn finalize_creates_primary_profile_with_linked_assessment() {
    let (store, service) = service();
    let mut assessment = Assessment::new("a1", "u1");
    assessment.ability_estimate = Some(0.4);
    assessment
        .category_scores
        .insert("python".to_string(), json!(0.3));
    store.insert_assessment(assessment);

    let progress = service.get_or_create_progress("u1").await.unwrap();
    fill_steps(&service, &progress.id, Some("a1")).await;

    let summary = service.get_workflow_summary(&progress.id).await.unwrap();
    assert_eq!(summary.profile_name, "Data Upskilling");
    assert_eq!(summary.preferences.learning_style, LearningStyle::HandsOn);
    assert!(summary.assessment_linked);

    let profile = service.finalize_workflow(&progress.id).await.unwrap();
    assert!(profile.is_primary);
    assert_eq!(profile.experience_level, ExperienceLevel::Intermediate);
    assert_eq!(profile.available_hours_per_week, 6);
    assert_eq!(profile.years_experience, Some(4));
    assert_eq!(profile.irt_ability_score, Some(0.4));
    let areas = profile.proficiency_areas.clone().unwrap();
    assert_eq!(areas[0].category, "python");
    assert_eq!(areas[0].level, ExperienceLevel::Beginner);

    let stored = store.fetch_profile(&profile.id).await.unwrap();
    assert_eq!(stored.latest_assessment_id.as_deref(), Some("a1"));
    assert_eq!(stored.irt_ability_score, Some(0.4));

    let progress = service.get_progress(&progress.id).await.unwrap();
    assert_eq!(progress.status, WorkflowStatus::Completed);
    assert_eq!(progress.profile_id.as_deref(), Some(profile.id.as_str()));
    assert!(progress.completed_at.is_some());
}

#[tokio::test]
async fn finalize_survives_missing_assessment() {
    let (_, service) = service();
    let progress = service.get_or_create_progress("u1").await.unwrap();
    fill_steps(&service, &progress.id, Some("does-not-exist")).await;

    let profile = service.finalize_workflow(&progress.id).await.unwrap();
    assert_eq!(profile.profile_name, "Data Upskilling");
    assert!(profile.irt_ability_score.is_none());

    let progress = service.get_progress(&progress.id).await.unwrap();
    assert_eq!(progress.status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn only_first_profile_is_primary() {
    let (store, service) = service();

    let first = service.get_or_create_progress("u1").await.unwrap();
    fill_steps(&service, &first.id, None).await;
    service.finalize_workflow(&first.id).await.unwrap();

    let second = service.get_or_create_progress("u1").await.unwrap();
    assert_ne!(second.id, first.id);
    fill_steps(&service, &second.id, None).await;
    let profile = service.finalize_workflow(&second.id).await.unwrap();
    assert!(!profile.is_primary);

    let primaries = store
        .profiles_for_user("u1")
        .into_iter()
        .filter(|p| p.is_primary)
        .count();
    assert_eq!(primaries, 1);
}

#[tokio::test]
async fn closed_workflow_rejects_changes() {
    let (_, service) = service();
    let progress = service.get_or_create_progress("u1").await.unwrap();
    let abandoned = service.abandon_workflow(&progress.id).await.unwrap();
    assert_eq!(abandoned.status, WorkflowStatus::Abandoned);

    let err = service.complete_step(&progress.id, 1).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Transition(_)));
    let err = service.finalize_workflow(&progress.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Transition(_)));

    let fresh = service.get_or_create_progress("u1").await.unwrap();
    assert_ne!(fresh.id, progress.id);
}

#[tokio::test]
async fn empty_workflow_finalizes_with_defaults() {
    let (_, service) = service();
    let progress = service.get_or_create_progress("u1").await.unwrap();

    let profile = service.finalize_workflow(&progress.id).await.unwrap();
    assert_eq!(profile.profile_name, "Untitled Profile");
    assert_eq!(profile.experience_level, ExperienceLevel::Beginner);
    assert_eq!(profile.preferred_learning_style, LearningStyle::Mixed);
    assert_eq!(profile.available_hours_per_week, 5);
}

#[tokio::test]
async fn mistyped_number_keeps_the_rest_of_its_step() {
    let (_, service) = service();
    let progress = service.get_or_create_progress("u1").await.unwrap();

    let background = object(json!({
        "target_audience": "professional",
        "experience_level": "advanced",
        "years_experience": "5"
    }));
    let preferences = object(json!({
        "preferred_learning_style": "visual",
        "available_hours_per_week": "12"
    }));

    let check = service.validate_step_data(2, &background).unwrap();
    assert!(!check.is_valid);
    assert!(check.errors.contains_key("years_experience"));
    let check = service.validate_step_data(4, &preferences).unwrap();
    assert!(!check.is_valid);
    assert!(check.errors.contains_key("available_hours_per_week"));

    service.update_step_data(&progress.id, 2, background).await.unwrap();
    service.update_step_data(&progress.id, 4, preferences).await.unwrap();

    let profile = service.finalize_workflow(&progress.id).await.unwrap();
    assert_eq!(profile.experience_level, ExperienceLevel::Advanced);
    assert_eq!(profile.target_audience, "professional");
    assert_eq!(profile.preferred_learning_style, LearningStyle::Visual);
    assert_eq!(profile.years_experience, None);
    assert_eq!(profile.available_hours_per_week, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_step_writes_all_survive() {
    let store = Arc::new(InMemoryStore::new());
    let service = Arc::new(ProfileWorkflowService::new(store.clone()));
    let progress = service.get_or_create_progress("u1").await.unwrap();

    let writers: Vec<_> = (1..=5u32)
        .map(|order| {
            let service = Arc::clone(&service);
            let id = progress.id.clone();
            tokio::spawn(async move {
                service
                    .update_step_data(&id, order, object(json!({ "written_by": order })))
                    .await
                    .unwrap();
                service.complete_step(&id, order).await.unwrap();
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }

    let progress = service.get_progress(&progress.id).await.unwrap();
    for order in 1..=5u32 {
        assert_eq!(progress.step_data[&format!("step_{order}")]["written_by"], order);
    }
    let mut completed = progress.completed_steps.clone();
    completed.sort_unstable();
    assert_eq!(completed, vec![1, 2, 3, 4, 5]);
    assert_eq!(progress.current_step_order, 6);
}
