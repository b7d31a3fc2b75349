use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Map;
use uuid::Uuid;

use crate::db::models::{
    AssessmentLink, CurriculumCourse, CurriculumCourseUpdate, CurriculumDraft,
    CurriculumModuleRecord, CurriculumRecord, GenerationJob, JobUpdate, ProgressUpdate,
    WorkflowProgress,
};
use crate::db::{now_rfc3339, CurriculumStore, StoreError};
use crate::services::course::Course;
use crate::services::lifecycle::{JobStatus, WorkflowStatus};
use crate::services::profile::{Assessment, LearnerProfile, NewLearnerProfile};

#[derive(Default)]
struct Tables {
    profiles: HashMap<String, LearnerProfile>,
    assessments: HashMap<String, Assessment>,
    courses: Vec<Course>,
    enrollments: HashMap<String, HashSet<i64>>,
    completions: HashMap<String, HashSet<i64>>,
    jobs: HashMap<String, GenerationJob>,
    curricula: HashMap<String, CurriculumRecord>,
    modules: Vec<CurriculumModuleRecord>,
    curriculum_courses: Vec<CurriculumCourse>,
    /// Insertion order doubles as recency when timestamps tie.
    progress: Vec<WorkflowProgress>,
}

/// Map-backed store for tests and for running without a database.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, profile: LearnerProfile) {
        self.tables.write().profiles.insert(profile.id.clone(), profile);
    }

    pub fn insert_assessment(&self, assessment: Assessment) {
        self.tables
            .write()
            .assessments
            .insert(assessment.id.clone(), assessment);
    }

    pub fn insert_course(&self, course: Course) {
        let mut tables = self.tables.write();
        tables.courses.retain(|c| c.id != course.id);
        tables.courses.push(course);
    }

    pub fn enroll(&self, user_id: &str, course_id: i64) {
        self.tables
            .write()
            .enrollments
            .entry(user_id.to_string())
            .or_default()
            .insert(course_id);
    }

    pub fn mark_completed(&self, user_id: &str, course_id: i64) {
        self.tables
            .write()
            .completions
            .entry(user_id.to_string())
            .or_default()
            .insert(course_id);
    }

    /// Stored curricula, including ones with no modules or links.
    pub fn curriculum_count(&self) -> usize {
        self.tables.read().curricula.len()
    }

    pub fn profiles_for_user(&self, user_id: &str) -> Vec<LearnerProfile> {
        let tables = self.tables.read();
        let mut profiles: Vec<_> = tables
            .profiles
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        profiles
    }
}

#[async_trait]
impl CurriculumStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn fetch_profile(&self, profile_id: &str) -> Result<LearnerProfile, StoreError> {
        self.tables
            .read()
            .profiles
            .get(profile_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("learner_profile", profile_id))
    }

    async fn fetch_assessment(&self, assessment_id: &str) -> Result<Option<Assessment>, StoreError> {
        Ok(self.tables.read().assessments.get(assessment_id).cloned())
    }

    async fn fetch_latest_assessment_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Assessment>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .assessments
            .values()
            .filter(|a| a.user_id == user_id && a.is_complete)
            .max_by(|a, b| a.completed_at.cmp(&b.completed_at))
            .cloned())
    }

    async fn fetch_eligible_courses(&self, user_id: &str) -> Result<Vec<Course>, StoreError> {
        let tables = self.tables.read();
        let enrolled = tables.enrollments.get(user_id);
        Ok(tables
            .courses
            .iter()
            .filter(|c| c.is_active && c.display)
            .filter(|c| enrolled.map_or(true, |ids| !ids.contains(&c.id)))
            .cloned()
            .collect())
    }

    async fn fetch_published_courses(&self) -> Result<Vec<Course>, StoreError> {
        Ok(self
            .tables
            .read()
            .courses
            .iter()
            .filter(|c| c.is_active && c.display)
            .cloned()
            .collect())
    }

    async fn fetch_enrolled_course_ids(&self, user_id: &str) -> Result<Vec<i64>, StoreError> {
        let tables = self.tables.read();
        let mut ids: Vec<i64> = tables
            .enrollments
            .get(user_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn fetch_completed_course_ids(&self, user_id: &str) -> Result<Vec<i64>, StoreError> {
        let tables = self.tables.read();
        let mut ids: Vec<i64> = tables
            .completions
            .get(user_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn create_generation_job(
        &self,
        profile_id: &str,
        input_parameters: serde_json::Value,
    ) -> Result<GenerationJob, StoreError> {
        let job = GenerationJob {
            id: Uuid::new_v4().to_string(),
            profile_id: profile_id.to_string(),
            status: JobStatus::Pending,
            generated_curriculum_id: None,
            error_message: None,
            courses_recommended: None,
            generation_time_ms: None,
            input_parameters,
            created_at: now_rfc3339(),
            started_at: None,
            completed_at: None,
        };
        self.tables.write().jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn update_generation_job(
        &self,
        job_id: &str,
        update: JobUpdate,
    ) -> Result<GenerationJob, StoreError> {
        let mut tables = self.tables.write();
        let job = tables
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::not_found("generation_job", job_id))?;
        update.apply(job);
        Ok(job.clone())
    }

    async fn get_generation_job(&self, job_id: &str) -> Result<GenerationJob, StoreError> {
        self.tables
            .read()
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("generation_job", job_id))
    }

    async fn list_unfinished_jobs(&self) -> Result<Vec<GenerationJob>, StoreError> {
        let tables = self.tables.read();
        let mut jobs: Vec<_> = tables
            .jobs
            .values()
            .filter(|j| !j.status.is_terminal())
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn save_generated_curriculum(&self, draft: CurriculumDraft) -> Result<String, StoreError> {
        let CurriculumDraft {
            curriculum,
            modules,
            courses,
        } = draft;
        let now = now_rfc3339();
        let id = Uuid::new_v4().to_string();
        let record = CurriculumRecord {
            id: id.clone(),
            user_id: curriculum.user_id,
            profile_id: curriculum.profile_id,
            curriculum_name: curriculum.curriculum_name,
            description: curriculum.description,
            generated_by_ai: true,
            ai_confidence_score: curriculum.ai_confidence_score,
            generation_metadata: curriculum.generation_metadata,
            difficulty_progression: "linear".to_string(),
            estimated_completion_weeks: curriculum.estimated_completion_weeks,
            estimated_total_hours: curriculum.estimated_total_hours,
            total_courses: curriculum.total_courses,
            is_active: true,
            is_published: false,
            created_at: now.clone(),
            updated_at: now,
        };
        let module_rows = modules.into_iter().map(|module| CurriculumModuleRecord {
            curriculum_id: id.clone(),
            module_order: module.module_order,
            module_name: module.module_name,
            module_description: module.module_description,
            difficulty_level: module.difficulty_level,
            courses_in_module: module.courses_in_module,
        });
        let course_rows = courses.into_iter().map(|link| CurriculumCourse {
            id: Uuid::new_v4().to_string(),
            curriculum_id: id.clone(),
            course_id: link.course_id,
            sequence_order: link.sequence_order,
            module_name: Some(link.module_name),
            ai_recommended: true,
            recommendation_score: link.recommendation_score,
            recommendation_reason: link.recommendation_reason,
            skill_gaps_addressed: link.skill_gaps_addressed,
            user_approved: None,
            user_notes: None,
            is_required: false,
        });

        let mut tables = self.tables.write();
        tables.modules.extend(module_rows);
        tables.curriculum_courses.extend(course_rows);
        tables.curricula.insert(id.clone(), record);
        Ok(id)
    }

    async fn get_curriculum(&self, curriculum_id: &str) -> Result<CurriculumRecord, StoreError> {
        self.tables
            .read()
            .curricula
            .get(curriculum_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("curriculum", curriculum_id))
    }

    async fn list_curriculum_modules(
        &self,
        curriculum_id: &str,
    ) -> Result<Vec<CurriculumModuleRecord>, StoreError> {
        let tables = self.tables.read();
        let mut modules: Vec<_> = tables
            .modules
            .iter()
            .filter(|m| m.curriculum_id == curriculum_id)
            .cloned()
            .collect();
        modules.sort_by_key(|m| m.module_order);
        Ok(modules)
    }

    async fn list_curriculum_courses(
        &self,
        curriculum_id: &str,
    ) -> Result<Vec<CurriculumCourse>, StoreError> {
        let tables = self.tables.read();
        let mut courses: Vec<_> = tables
            .curriculum_courses
            .iter()
            .filter(|c| c.curriculum_id == curriculum_id)
            .cloned()
            .collect();
        courses.sort_by_key(|c| c.sequence_order);
        Ok(courses)
    }

    async fn update_curriculum_course(
        &self,
        curriculum_id: &str,
        course_id: i64,
        update: CurriculumCourseUpdate,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let row = tables
            .curriculum_courses
            .iter_mut()
            .find(|c| c.curriculum_id == curriculum_id && c.course_id == course_id)
            .ok_or_else(|| {
                StoreError::not_found("curriculum_course", format!("{curriculum_id}/{course_id}"))
            })?;
        if update.user_approved.is_some() {
            row.user_approved = update.user_approved;
        }
        if update.user_notes.is_some() {
            row.user_notes = update.user_notes;
        }
        if let Some(curriculum) = tables.curricula.get_mut(curriculum_id) {
            curriculum.updated_at = now_rfc3339();
        }
        Ok(())
    }

    async fn publish_curriculum(&self, curriculum_id: &str) -> Result<CurriculumRecord, StoreError> {
        let mut tables = self.tables.write();
        let curriculum = tables
            .curricula
            .get_mut(curriculum_id)
            .ok_or_else(|| StoreError::not_found("curriculum", curriculum_id))?;
        curriculum.is_published = true;
        curriculum.updated_at = now_rfc3339();
        Ok(curriculum.clone())
    }

    async fn set_curriculum_active(&self, curriculum_id: &str, is_active: bool) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let curriculum = tables
            .curricula
            .get_mut(curriculum_id)
            .ok_or_else(|| StoreError::not_found("curriculum", curriculum_id))?;
        curriculum.is_active = is_active;
        curriculum.updated_at = now_rfc3339();
        Ok(())
    }

    async fn get_or_create_workflow_progress(&self, user_id: &str) -> Result<WorkflowProgress, StoreError> {
        let mut tables = self.tables.write();
        let existing = tables
            .progress
            .iter()
            .enumerate()
            .filter(|(_, p)| p.user_id == user_id && p.status.is_open())
            .max_by(|(ia, a), (ib, b)| {
                a.last_activity_at
                    .cmp(&b.last_activity_at)
                    .then_with(|| ia.cmp(ib))
            })
            .map(|(_, p)| p.clone());
        if let Some(progress) = existing {
            return Ok(progress);
        }

        let now = now_rfc3339();
        let progress = WorkflowProgress {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            profile_id: None,
            current_step_order: 1,
            completed_steps: Vec::new(),
            step_data: Map::new(),
            status: WorkflowStatus::NotStarted,
            started_at: now.clone(),
            completed_at: None,
            last_activity_at: now,
        };
        tables.progress.push(progress.clone());
        Ok(progress)
    }

    async fn get_workflow_progress(&self, progress_id: &str) -> Result<WorkflowProgress, StoreError> {
        self.tables
            .read()
            .progress
            .iter()
            .find(|p| p.id == progress_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("workflow_progress", progress_id))
    }

    async fn update_workflow_progress(
        &self,
        progress_id: &str,
        update: ProgressUpdate,
    ) -> Result<WorkflowProgress, StoreError> {
        let mut tables = self.tables.write();
        let progress = tables
            .progress
            .iter_mut()
            .find(|p| p.id == progress_id)
            .ok_or_else(|| StoreError::not_found("workflow_progress", progress_id))?;
        update.apply(progress, now_rfc3339());
        Ok(progress.clone())
    }

    async fn create_learner_profile(&self, profile: NewLearnerProfile) -> Result<LearnerProfile, StoreError> {
        let profile = profile.into_profile(Uuid::new_v4().to_string(), now_rfc3339());
        self.tables
            .write()
            .profiles
            .insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }

    async fn user_has_primary_profile(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .read()
            .profiles
            .values()
            .any(|p| p.user_id == user_id && p.is_primary && p.is_active))
    }

    async fn update_learner_profile_assessment(
        &self,
        profile_id: &str,
        link: AssessmentLink,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let profile = tables
            .profiles
            .get_mut(profile_id)
            .ok_or_else(|| StoreError::not_found("learner_profile", profile_id))?;
        profile.latest_assessment_id = Some(link.assessment_id);
        profile.irt_ability_score = link.irt_ability_score;
        profile.proficiency_areas = Some(link.proficiency_areas);
        Ok(())
    }
}
