pub mod memory;
pub mod migrate;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use thiserror::Error;

use crate::db::migrate::MigrationError;
use crate::db::models::{
    AssessmentLink, CurriculumCourse, CurriculumCourseUpdate, CurriculumDraft,
    CurriculumModuleRecord, CurriculumRecord, GenerationJob, JobUpdate, ProgressUpdate,
    WorkflowProgress,
};
use crate::services::course::Course;
use crate::services::profile::{Assessment, LearnerProfile, NewLearnerProfile};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Timestamp format shared by every stored record.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Everything the curriculum services read from or write to persistent
/// storage. Implementations must be safe to share across tasks.
#[async_trait]
pub trait CurriculumStore: Send + Sync {
    /// Short label for health output.
    fn backend(&self) -> &'static str;

    /// Cheap connectivity check.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn fetch_profile(&self, profile_id: &str) -> Result<LearnerProfile, StoreError>;

    async fn fetch_assessment(&self, assessment_id: &str) -> Result<Option<Assessment>, StoreError>;

    /// Most recently completed assessment for the user.
    async fn fetch_latest_assessment_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Assessment>, StoreError>;

    /// Active and displayed catalog minus the user's enrolled courses.
    async fn fetch_eligible_courses(&self, user_id: &str) -> Result<Vec<Course>, StoreError>;

    async fn fetch_published_courses(&self) -> Result<Vec<Course>, StoreError>;

    async fn fetch_enrolled_course_ids(&self, user_id: &str) -> Result<Vec<i64>, StoreError>;

    async fn fetch_completed_course_ids(&self, user_id: &str) -> Result<Vec<i64>, StoreError>;

    async fn create_generation_job(
        &self,
        profile_id: &str,
        input_parameters: serde_json::Value,
    ) -> Result<GenerationJob, StoreError>;

    async fn update_generation_job(
        &self,
        job_id: &str,
        update: JobUpdate,
    ) -> Result<GenerationJob, StoreError>;

    async fn get_generation_job(&self, job_id: &str) -> Result<GenerationJob, StoreError>;

    /// Jobs still `pending` or `processing`.
    async fn list_unfinished_jobs(&self) -> Result<Vec<GenerationJob>, StoreError>;

    /// Writes the curriculum row with its modules and course links in one
    /// atomic step and returns the new curriculum id. On error nothing is kept.
    async fn save_generated_curriculum(&self, draft: CurriculumDraft) -> Result<String, StoreError>;

    async fn get_curriculum(&self, curriculum_id: &str) -> Result<CurriculumRecord, StoreError>;

    async fn list_curriculum_modules(
        &self,
        curriculum_id: &str,
    ) -> Result<Vec<CurriculumModuleRecord>, StoreError>;

    /// Links ordered by `sequence_order`.
    async fn list_curriculum_courses(
        &self,
        curriculum_id: &str,
    ) -> Result<Vec<CurriculumCourse>, StoreError>;

    /// Fails with `NotFound` when the course is not part of the curriculum.
    async fn update_curriculum_course(
        &self,
        curriculum_id: &str,
        course_id: i64,
        update: CurriculumCourseUpdate,
    ) -> Result<(), StoreError>;

    async fn publish_curriculum(&self, curriculum_id: &str) -> Result<CurriculumRecord, StoreError>;

    async fn set_curriculum_active(&self, curriculum_id: &str, is_active: bool) -> Result<(), StoreError>;

    /// Reuses the user's newest `not_started`/`in_progress` record or creates one at step 1.
    async fn get_or_create_workflow_progress(&self, user_id: &str) -> Result<WorkflowProgress, StoreError>;

    async fn get_workflow_progress(&self, progress_id: &str) -> Result<WorkflowProgress, StoreError>;

    /// Applies `update` in a single write. `step_data` keys and
    /// `completed_step` merge with the stored record rather than replacing it.
    /// Status is written as given; callers check the transition beforehand.
    async fn update_workflow_progress(
        &self,
        progress_id: &str,
        update: ProgressUpdate,
    ) -> Result<WorkflowProgress, StoreError>;

    async fn create_learner_profile(&self, profile: NewLearnerProfile) -> Result<LearnerProfile, StoreError>;

    async fn user_has_primary_profile(&self, user_id: &str) -> Result<bool, StoreError>;

    async fn update_learner_profile_assessment(
        &self,
        profile_id: &str,
        link: AssessmentLink,
    ) -> Result<(), StoreError>;
}
