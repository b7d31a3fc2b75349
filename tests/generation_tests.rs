mod common;

use std::time::Duration;

use curriculum_backend::db::CurriculumStore;
use curriculum_backend::services::curriculum::{GenerationError, GenerationSettings};
use curriculum_backend::services::lifecycle::JobStatus;
use curriculum_backend::services::profile::ExperienceLevel;

use common::{harness, harness_with, profile, seed_catalog, wait_for_terminal};

#[tokio::test]
async fn successful_job_passes_through_processing() {
    let h = harness();
    h.store.inner.insert_profile(profile("p1", "u1", ExperienceLevel::Beginner, 6));
    seed_catalog(&h.store.inner);

    let job = h.generator().request_generation("p1").await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.input_parameters["algorithm_version"], "v1.0.0");

    let done = wait_for_terminal(&h.generator(), &job.id).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(
        h.store.statuses_for(&job.id),
        vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Completed]
    );
    assert_eq!(done.courses_recommended, Some(4));
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());

    let curriculum_id = done.generated_curriculum_id.unwrap();
    let curriculum = h.store.get_curriculum(&curriculum_id).await.unwrap();
    assert_eq!(curriculum.curriculum_name, "Automation Skills Learning Path");
    assert_eq!(curriculum.total_courses, 4);
    assert!(!curriculum.is_published);

    let modules = h.store.list_curriculum_modules(&curriculum_id).await.unwrap();
    let names: Vec<_> = modules.iter().map(|m| m.module_name.as_str()).collect();
    assert_eq!(names, vec!["Foundation", "Application", "Mastery"]);

    let links = h.store.list_curriculum_courses(&curriculum_id).await.unwrap();
    let orders: Vec<_> = links.iter().map(|l| l.sequence_order).collect();
    assert_eq!(orders, vec![1, 2, 3, 4]);
    assert!(links.iter().all(|l| l.user_approved.is_none()));
}

#[tokio::test]
async fn store_failure_marks_job_failed() {
    let h = harness();
    h.store.inner.insert_profile(profile("p1", "u1", ExperienceLevel::Beginner, 6));
    seed_catalog(&h.store.inner);
    h.store.fail_curriculum_saves();

    let job = h.generator().request_generation("p1").await.unwrap();
    let done = wait_for_terminal(&h.generator(), &job.id).await;

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(
        h.store.statuses_for(&job.id),
        vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Failed]
    );
    assert!(done
        .error_message
        .unwrap()
        .contains("injected save failure"));
    assert!(done.generated_curriculum_id.is_none());
    assert_eq!(h.store.inner.curriculum_count(), 0);
}

#[tokio::test]
async fn empty_catalog_still_completes() {
    let h = harness();
    h.store.inner.insert_profile(profile("p1", "u1", ExperienceLevel::Beginner, 6));

    let job = h.generator().request_generation("p1").await.unwrap();
    let done = wait_for_terminal(&h.generator(), &job.id).await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.courses_recommended, Some(0));
    let curriculum_id = done.generated_curriculum_id.unwrap();
    let curriculum = h.store.get_curriculum(&curriculum_id).await.unwrap();
    assert_eq!(curriculum.total_courses, 0);
    assert!(h
        .store
        .list_curriculum_modules(&curriculum_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn missing_profile_fails_the_job() {
    let h = harness();

    let job = h.generator().request_generation("nope").await.unwrap();
    let done = wait_for_terminal(&h.generator(), &job.id).await;

    assert_eq!(done.status, JobStatus::Failed);
    assert!(done.error_message.unwrap().contains("not found"));
}

#[tokio::test]
async fn slow_run_times_out() {
    let h = harness_with(GenerationSettings {
        timeout: Some(Duration::from_millis(50)),
        serialize_per_profile: true,
    });
    h.store.inner.insert_profile(profile("p1", "u1", ExperienceLevel::Beginner, 6));
    h.store.delay_catalog(Duration::from_millis(500));

    let job = h.generator().request_generation("p1").await.unwrap();
    let done = wait_for_terminal(&h.generator(), &job.id).await;

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.error_message.as_deref(), Some("generation timed out after 50ms"));
}

#[tokio::test]
async fn cancelled_job_fails_with_reason() {
    let h = harness();
    h.store.inner.insert_profile(profile("p1", "u1", ExperienceLevel::Beginner, 6));
    h.store.delay_catalog(Duration::from_millis(1000));

    let job = h.generator().request_generation("p1").await.unwrap();
    h.generator().cancel_generation(&job.id).await.unwrap();
    let done = wait_for_terminal(&h.generator(), &job.id).await;

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.error_message.as_deref(), Some("generation cancelled"));
    assert_eq!(
        h.store.statuses_for(&job.id),
        vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Failed]
    );
    assert!(done.started_at.is_some());
}

#[tokio::test]
async fn job_cancelled_while_waiting_for_profile_still_passes_through_processing() {
    let h = harness();
    h.store.inner.insert_profile(profile("p1", "u1", ExperienceLevel::Beginner, 6));
    seed_catalog(&h.store.inner);
    h.store.delay_catalog(Duration::from_millis(300));

    let running = h.generator().request_generation("p1").await.unwrap();
    let waiting = h.generator().request_generation("p1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.generator().cancel_generation(&waiting.id).await.unwrap();

    let cancelled = wait_for_terminal(&h.generator(), &waiting.id).await;
    assert_eq!(cancelled.status, JobStatus::Failed);
    assert_eq!(cancelled.error_message.as_deref(), Some("generation cancelled"));
    assert_eq!(
        h.store.statuses_for(&waiting.id),
        vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Failed]
    );

    let finished = wait_for_terminal(&h.generator(), &running.id).await;
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(h.store.inner.curriculum_count(), 1);
}

#[tokio::test]
async fn timeout_while_waiting_for_profile_passes_through_processing() {
    let h = harness_with(GenerationSettings {
        timeout: Some(Duration::from_millis(200)),
        serialize_per_profile: true,
    });
    h.store.inner.insert_profile(profile("p1", "u1", ExperienceLevel::Beginner, 6));
    h.store.delay_catalog(Duration::from_millis(150));

    let first = h.generator().request_generation("p1").await.unwrap();
    let second = h.generator().request_generation("p1").await.unwrap();

    let first = wait_for_terminal(&h.generator(), &first.id).await;
    let second = wait_for_terminal(&h.generator(), &second.id).await;
    assert_eq!(first.status, JobStatus::Completed);
    assert_eq!(second.status, JobStatus::Failed);
    assert_eq!(
        h.store.statuses_for(&second.id),
        vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Failed]
    );
}

#[tokio::test]
async fn cancel_during_save_leaves_a_complete_curriculum() {
    let h = harness();
    h.store.inner.insert_profile(profile("p1", "u1", ExperienceLevel::Beginner, 6));
    seed_catalog(&h.store.inner);
    h.store.delay_saves(Duration::from_millis(300));

    let job = h.generator().request_generation("p1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.generator().cancel_generation(&job.id).await.unwrap();

    let done = wait_for_terminal(&h.generator(), &job.id).await;
    assert_eq!(done.status, JobStatus::Completed);
    let curriculum_id = done.generated_curriculum_id.unwrap();
    assert_eq!(h.store.inner.curriculum_count(), 1);
    assert_eq!(h.store.list_curriculum_modules(&curriculum_id).await.unwrap().len(), 3);
    assert_eq!(h.store.list_curriculum_courses(&curriculum_id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn timeout_does_not_interrupt_a_save() {
    let h = harness_with(GenerationSettings {
        timeout: Some(Duration::from_millis(50)),
        serialize_per_profile: true,
    });
    h.store.inner.insert_profile(profile("p1", "u1", ExperienceLevel::Beginner, 6));
    seed_catalog(&h.store.inner);
    h.store.delay_saves(Duration::from_millis(200));

    let job = h.generator().request_generation("p1").await.unwrap();
    let done = wait_for_terminal(&h.generator(), &job.id).await;

    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.generated_curriculum_id.is_some());
    assert_eq!(h.store.inner.curriculum_count(), 1);
}

#[tokio::test]
async fn finished_job_cannot_be_cancelled() {
    let h = harness();
    h.store.inner.insert_profile(profile("p1", "u1", ExperienceLevel::Beginner, 6));

    let job = h.generator().request_generation("p1").await.unwrap();
    wait_for_terminal(&h.generator(), &job.id).await;

    let err = h.generator().cancel_generation(&job.id).await.unwrap_err();
    assert!(matches!(err, GenerationError::Transition(_)));
}

#[tokio::test]
async fn runs_for_one_profile_do_not_overlap() {
    let h = harness();
    h.store.inner.insert_profile(profile("p1", "u1", ExperienceLevel::Beginner, 6));
    seed_catalog(&h.store.inner);
    h.store.delay_catalog(Duration::from_millis(100));

    let first = h.generator().request_generation("p1").await.unwrap();
    let second = h.generator().request_generation("p1").await.unwrap();
    let a = wait_for_terminal(&h.generator(), &first.id).await;
    let b = wait_for_terminal(&h.generator(), &second.id).await;

    assert_eq!(a.status, JobStatus::Completed);
    assert_eq!(b.status, JobStatus::Completed);
    assert_ne!(a.generated_curriculum_id, b.generated_curriculum_id);

    // Whichever run planned first must finish reading before the other starts.
    assert_eq!(h.store.catalog_reads(), vec!["start", "end", "start", "end"]);
    for job in [&a, &b] {
        assert_eq!(
            h.store.statuses_for(&job.id),
            vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Completed]
        );
    }
}

#[tokio::test]
async fn stale_jobs_are_failed_on_recovery() {
    let h = harness();
    let stale = h
        .store
        .create_generation_job("p1", serde_json::json!({}))
        .await
        .unwrap();

    let recovered = h.generator().recover_stale_jobs().await.unwrap();
    assert_eq!(recovered, 1);

    let job = h.generator().get_generation_status(&stale.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("orchestrator restart"));
    assert_eq!(
        h.store.statuses_for(&stale.id),
        vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Failed]
    );
}

#[tokio::test]
async fn requests_after_shutdown_are_rejected() {
    let h = harness();
    h.workers.shutdown().await;

    let err = h.generator().request_generation("p1").await.unwrap_err();
    assert!(matches!(err, GenerationError::QueueClosed));

    let unfinished = h.store.list_unfinished_jobs().await.unwrap();
    assert!(unfinished.is_empty());
}
