use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::services::lifecycle::{JobStatus, WorkflowStatus};
use crate::services::profile::ProficiencyArea;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    pub id: String,
    pub profile_id: String,
    pub status: JobStatus,
    pub generated_curriculum_id: Option<String>,
    pub error_message: Option<String>,
    pub courses_recommended: Option<u32>,
    pub generation_time_ms: Option<u64>,
    pub input_parameters: Value,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// Fields written on a job transition; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub generated_curriculum_id: Option<String>,
    pub error_message: Option<String>,
    pub courses_recommended: Option<u32>,
    pub generation_time_ms: Option<u64>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(self, job: &mut GenerationJob) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if self.generated_curriculum_id.is_some() {
            job.generated_curriculum_id = self.generated_curriculum_id;
        }
        if self.error_message.is_some() {
            job.error_message = self.error_message;
        }
        if self.courses_recommended.is_some() {
            job.courses_recommended = self.courses_recommended;
        }
        if self.generation_time_ms.is_some() {
            job.generation_time_ms = self.generation_time_ms;
        }
        if self.started_at.is_some() {
            job.started_at = self.started_at;
        }
        if self.completed_at.is_some() {
            job.completed_at = self.completed_at;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumRecord {
    pub id: String,
    pub user_id: String,
    pub profile_id: String,
    pub curriculum_name: String,
    pub description: String,
    pub generated_by_ai: bool,
    pub ai_confidence_score: f64,
    pub generation_metadata: Value,
    pub difficulty_progression: String,
    pub estimated_completion_weeks: u32,
    pub estimated_total_hours: u32,
    pub total_courses: u32,
    pub is_active: bool,
    pub is_published: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCurriculum {
    pub user_id: String,
    pub profile_id: String,
    pub curriculum_name: String,
    pub description: String,
    pub ai_confidence_score: f64,
    pub generation_metadata: Value,
    pub estimated_completion_weeks: u32,
    pub estimated_total_hours: u32,
    pub total_courses: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumModuleRecord {
    pub curriculum_id: String,
    pub module_order: u32,
    pub module_name: String,
    pub module_description: String,
    pub difficulty_level: String,
    pub courses_in_module: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumCourse {
    pub id: String,
    pub curriculum_id: String,
    pub course_id: i64,
    /// Position across the whole curriculum, starting at 1.
    pub sequence_order: u32,
    pub module_name: Option<String>,
    pub ai_recommended: bool,
    pub recommendation_score: f64,
    pub recommendation_reason: String,
    pub skill_gaps_addressed: Vec<String>,
    /// `None` while the learner has not decided.
    pub user_approved: Option<bool>,
    pub user_notes: Option<String>,
    pub is_required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCurriculumModule {
    pub module_order: u32,
    pub module_name: String,
    pub module_description: String,
    pub difficulty_level: String,
    pub courses_in_module: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCurriculumCourse {
    pub course_id: i64,
    pub sequence_order: u32,
    pub module_name: String,
    pub recommendation_score: f64,
    pub recommendation_reason: String,
    pub skill_gaps_addressed: Vec<String>,
}

/// A generated curriculum with its modules and course links. Stores write
/// it as one unit: either every row lands or none do.
#[derive(Debug, Clone, PartialEq)]
pub struct CurriculumDraft {
    pub curriculum: NewCurriculum,
    pub modules: Vec<NewCurriculumModule>,
    pub courses: Vec<NewCurriculumCourse>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurriculumCourseUpdate {
    pub user_approved: Option<bool>,
    pub user_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowProgress {
    pub id: String,
    pub user_id: String,
    pub profile_id: Option<String>,
    pub current_step_order: u32,
    pub completed_steps: Vec<u32>,
    /// Raw form input keyed `step_<n>`.
    pub step_data: Map<String, Value>,
    pub status: WorkflowStatus,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub last_activity_at: String,
}

/// Fields written on a progress update. The store applies the whole update
/// in one write and always refreshes `last_activity_at`. Step data and
/// completed steps merge into what is stored, so concurrent updates to
/// different steps do not overwrite each other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub status: Option<WorkflowStatus>,
    /// Sets the current step outright.
    pub current_step_order: Option<u32>,
    /// Raises the current step to at least this order.
    pub advance_to: Option<u32>,
    /// Appended to `completed_steps` unless already present.
    pub completed_step: Option<u32>,
    /// Keys replace their stored counterparts; other keys are kept.
    pub step_data: Option<Map<String, Value>>,
    pub profile_id: Option<String>,
    pub completed_at: Option<String>,
}

impl ProgressUpdate {
    pub fn apply(self, progress: &mut WorkflowProgress, now: String) {
        if let Some(status) = self.status {
            progress.status = status;
        }
        if let Some(order) = self.current_step_order {
            progress.current_step_order = order;
        }
        if let Some(order) = self.advance_to {
            progress.current_step_order = progress.current_step_order.max(order);
        }
        if let Some(step) = self.completed_step {
            if !progress.completed_steps.contains(&step) {
                progress.completed_steps.push(step);
            }
        }
        if let Some(data) = self.step_data {
            progress.step_data.extend(data);
        }
        if self.profile_id.is_some() {
            progress.profile_id = self.profile_id;
        }
        if self.completed_at.is_some() {
            progress.completed_at = self.completed_at;
        }
        progress.last_activity_at = now;
    }
}

/// Assessment data copied onto a learner profile when the two are linked.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentLink {
    pub assessment_id: String,
    pub irt_ability_score: Option<f64>,
    pub proficiency_areas: Vec<ProficiencyArea>,
}
