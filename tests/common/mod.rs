#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use curriculum_backend::db::models::{
    AssessmentLink, CurriculumCourse, CurriculumCourseUpdate, CurriculumDraft,
    CurriculumModuleRecord, CurriculumRecord, GenerationJob, JobUpdate, ProgressUpdate,
    WorkflowProgress,
};
use curriculum_backend::db::{CurriculumStore, InMemoryStore, StoreError};
use curriculum_backend::services::course::Course;
use curriculum_backend::services::curriculum::{CurriculumGenerator, GenerationSettings};
use curriculum_backend::services::lifecycle::JobStatus;
use curriculum_backend::services::profile::{
    Assessment, ExperienceLevel, LearnerProfile, LearningGoal, LearningStyle, NewLearnerProfile,
};
use curriculum_backend::state::AppState;
use curriculum_backend::workers::WorkerManager;

/// In-memory store that records every job status it is asked to write and
/// can be told to stall or fail at chosen points.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: InMemoryStore,
    events: Mutex<Vec<(String, JobStatus)>>,
    catalog_reads: Mutex<Vec<&'static str>>,
    fail_save: AtomicBool,
    catalog_delay: Mutex<Option<Duration>>,
    save_delay: Mutex<Option<Duration>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(job_id, status)` write in order.
    pub fn events(&self) -> Vec<(String, JobStatus)> {
        self.events.lock().clone()
    }

    pub fn statuses_for(&self, job_id: &str) -> Vec<JobStatus> {
        self.events
            .lock()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn fail_curriculum_saves(&self) {
        self.fail_save.store(true, Ordering::SeqCst);
    }

    /// Stalls catalog reads, which happen while a job is `processing`.
    pub fn delay_catalog(&self, delay: Duration) {
        *self.catalog_delay.lock() = Some(delay);
    }

    /// Stalls curriculum saves, which happen after planning.
    pub fn delay_saves(&self, delay: Duration) {
        *self.save_delay.lock() = Some(delay);
    }

    /// `"start"`/`"end"` markers around every catalog read, in order.
    pub fn catalog_reads(&self) -> Vec<&'static str> {
        self.catalog_reads.lock().clone()
    }

    fn record(&self, job_id: &str, status: JobStatus) {
        self.events.lock().push((job_id.to_string(), status));
    }
}

#[async_trait]
impl CurriculumStore for RecordingStore {
    fn backend(&self) -> &'static str {
        "recording"
    }

    async fn fetch_profile(&self, profile_id: &str) -> Result<LearnerProfile, StoreError> {
        self.inner.fetch_profile(profile_id).await
    }

    async fn fetch_assessment(&self, assessment_id: &str) -> Result<Option<Assessment>, StoreError> {
        self.inner.fetch_assessment(assessment_id).await
    }

    async fn fetch_latest_assessment_for_user(&self, user_id: &str) -> Result<Option<Assessment>, StoreError> {
        self.inner.fetch_latest_assessment_for_user(user_id).await
    }

    async fn fetch_eligible_courses(&self, user_id: &str) -> Result<Vec<Course>, StoreError> {
        self.catalog_reads.lock().push("start");
        let delay = *self.catalog_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let courses = self.inner.fetch_eligible_courses(user_id).await;
        self.catalog_reads.lock().push("end");
        courses
    }

    async fn fetch_published_courses(&self) -> Result<Vec<Course>, StoreError> {
        self.inner.fetch_published_courses().await
    }

    async fn fetch_enrolled_course_ids(&self, user_id: &str) -> Result<Vec<i64>, StoreError> {
        self.inner.fetch_enrolled_course_ids(user_id).await
    }

    async fn fetch_completed_course_ids(&self, user_id: &str) -> Result<Vec<i64>, StoreError> {
        self.inner.fetch_completed_course_ids(user_id).await
    }

    async fn create_generation_job(
        &self,
        profile_id: &str,
        input_parameters: Value,
    ) -> Result<GenerationJob, StoreError> {
        let job = self.inner.create_generation_job(profile_id, input_parameters).await?;
        self.record(&job.id, job.status);
        Ok(job)
    }

    async fn update_generation_job(&self, job_id: &str, update: JobUpdate) -> Result<GenerationJob, StoreError> {
        let status = update.status;
        let job = self.inner.update_generation_job(job_id, update).await?;
        if let Some(status) = status {
            self.record(job_id, status);
        }
        Ok(job)
    }

    async fn get_generation_job(&self, job_id: &str) -> Result<GenerationJob, StoreError> {
        self.inner.get_generation_job(job_id).await
    }

    async fn list_unfinished_jobs(&self) -> Result<Vec<GenerationJob>, StoreError> {
        self.inner.list_unfinished_jobs().await
    }

    async fn save_generated_curriculum(&self, draft: CurriculumDraft) -> Result<String, StoreError> {
        let delay = *self.save_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(StoreError::Serialization(serde_json::Error::io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected save failure",
            ))));
        }
        self.inner.save_generated_curriculum(draft).await
    }

    async fn get_curriculum(&self, curriculum_id: &str) -> Result<CurriculumRecord, StoreError> {
        self.inner.get_curriculum(curriculum_id).await
    }

    async fn list_curriculum_modules(&self, curriculum_id: &str) -> Result<Vec<CurriculumModuleRecord>, StoreError> {
        self.inner.list_curriculum_modules(curriculum_id).await
    }

    async fn list_curriculum_courses(&self, curriculum_id: &str) -> Result<Vec<CurriculumCourse>, StoreError> {
        self.inner.list_curriculum_courses(curriculum_id).await
    }

    async fn update_curriculum_course(
        &self,
        curriculum_id: &str,
        course_id: i64,
        update: CurriculumCourseUpdate,
    ) -> Result<(), StoreError> {
        self.inner.update_curriculum_course(curriculum_id, course_id, update).await
    }

    async fn publish_curriculum(&self, curriculum_id: &str) -> Result<CurriculumRecord, StoreError> {
        self.inner.publish_curriculum(curriculum_id).await
    }

    async fn set_curriculum_active(&self, curriculum_id: &str, is_active: bool) -> Result<(), StoreError> {
        self.inner.set_curriculum_active(curriculum_id, is_active).await
    }

    async fn get_or_create_workflow_progress(&self, user_id: &str) -> Result<WorkflowProgress, StoreError> {
        self.inner.get_or_create_workflow_progress(user_id).await
    }

    async fn get_workflow_progress(&self, progress_id: &str) -> Result<WorkflowProgress, StoreError> {
        self.inner.get_workflow_progress(progress_id).await
    }

    async fn update_workflow_progress(
        &self,
        progress_id: &str,
        update: ProgressUpdate,
    ) -> Result<WorkflowProgress, StoreError> {
        self.inner.update_workflow_progress(progress_id, update).await
    }

    async fn create_learner_profile(&self, profile: NewLearnerProfile) -> Result<LearnerProfile, StoreError> {
        self.inner.create_learner_profile(profile).await
    }

    async fn user_has_primary_profile(&self, user_id: &str) -> Result<bool, StoreError> {
        self.inner.user_has_primary_profile(user_id).await
    }

    async fn update_learner_profile_assessment(
        &self,
        profile_id: &str,
        link: AssessmentLink,
    ) -> Result<(), StoreError> {
        self.inner.update_learner_profile_assessment(profile_id, link).await
    }
}

pub struct Harness {
    pub store: Arc<RecordingStore>,
    pub workers: WorkerManager,
    pub state: AppState,
}

impl Harness {
    pub fn generator(&self) -> Arc<CurriculumGenerator> {
        self.state.generator()
    }
}

/// Must be called inside a tokio runtime; starts the generation dispatcher.
pub fn harness() -> Harness {
    harness_with(GenerationSettings::default())
}

pub fn harness_with(settings: GenerationSettings) -> Harness {
    let store = Arc::new(RecordingStore::new());
    let workers = WorkerManager::new();
    let state = AppState::start(store.clone(), settings, &workers);
    Harness {
        store,
        workers,
        state,
    }
}

pub async fn wait_for_terminal(generator: &CurriculumGenerator, job_id: &str) -> GenerationJob {
    for _ in 0..500 {
        let job = generator.get_generation_status(job_id).await.unwrap();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish in time");
}

pub fn profile(id: &str, user_id: &str, level: ExperienceLevel, hours: u32) -> LearnerProfile {
    NewLearnerProfile {
        user_id: user_id.to_string(),
        profile_name: "Automation Skills".to_string(),
        description: None,
        learning_goals: vec![LearningGoal {
            id: "g1".to_string(),
            label: "python".to_string(),
            description: None,
        }],
        target_audience: "professional".to_string(),
        experience_level: level,
        industry: None,
        job_role: None,
        company_size: None,
        years_experience: None,
        preferred_learning_style: LearningStyle::Mixed,
        available_hours_per_week: hours,
        preferred_schedule: Value::Null,
        latest_assessment_id: None,
        is_primary: true,
    }
    .into_profile(id.to_string(), "2026-01-01T00:00:00.000Z".to_string())
}

pub fn course(id: i64, title: &str, level: &str, duration: &str, keywords: &[&str]) -> Course {
    let mut course = Course::new(id, title);
    course.level = Some(level.to_string());
    course.duration = Some(duration.to_string());
    course.category = keywords.first().map(|k| k.to_string());
    course.keywords = keywords.iter().map(|k| k.to_string()).collect();
    course
}

/// A small catalog spanning all three module tiers.
pub fn seed_catalog(store: &InMemoryStore) {
    store.insert_course(course(1, "Python Basics", "beginner", "2 weeks", &["python"]));
    store.insert_course(course(2, "Automation in Practice", "intermediate", "3 weeks", &["automation", "python"]));
    store.insert_course(course(3, "Scaling ML Systems", "advanced", "4 weeks", &["ml"]));
    store.insert_course(course(4, "Prompt Writing", "beginner", "10 hours", &["prompting"]));
}
