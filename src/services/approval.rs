use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::models::{CurriculumCourse, CurriculumCourseUpdate, CurriculumRecord};
use crate::db::{CurriculumStore, StoreError};
use crate::services::scoring::round2;

const UNGROUPED_MODULE: &str = "Ungrouped";

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cannot publish curriculum with no approved courses")]
    NoApprovedCourses,
    #[error("course {course_id} is not part of curriculum {curriculum_id}")]
    CourseNotInCurriculum { curriculum_id: String, course_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCount {
    pub module_name: String,
    pub course_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumDetail {
    #[serde(flatten)]
    pub curriculum: CurriculumRecord,
    pub courses: Vec<CurriculumCourse>,
    pub modules: Vec<ModuleCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumStats {
    pub total_courses: u32,
    pub approved_courses: u32,
    pub rejected_courses: u32,
    pub pending_courses: u32,
    pub avg_recommendation_score: f64,
}

impl CurriculumStats {
    pub fn from_courses(courses: &[CurriculumCourse]) -> Self {
        let count = |approved: Option<bool>| {
            courses.iter().filter(|c| c.user_approved == approved).count() as u32
        };
        let avg = if courses.is_empty() {
            0.0
        } else {
            courses.iter().map(|c| c.recommendation_score).sum::<f64>() / courses.len() as f64
        };
        Self {
            total_courses: courses.len() as u32,
            approved_courses: count(Some(true)),
            rejected_courses: count(Some(false)),
            pending_courses: count(None),
            avg_recommendation_score: round2(avg),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResult {
    pub updated: u32,
    /// Course ids that are not linked to the curriculum.
    pub missing: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedCurriculum {
    #[serde(flatten)]
    pub curriculum: CurriculumRecord,
    /// The published course set: every link that ended up approved.
    pub courses: Vec<CurriculumCourse>,
    pub excluded_courses: u32,
}

/// Groups links by module name in first-seen order.
pub fn group_by_module(courses: &[CurriculumCourse]) -> Vec<ModuleCount> {
    let mut modules: Vec<ModuleCount> = Vec::new();
    for course in courses {
        let name = course
            .module_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(UNGROUPED_MODULE);
        match modules.iter_mut().find(|m| m.module_name == name) {
            Some(module) => module.course_count += 1,
            None => modules.push(ModuleCount {
                module_name: name.to_string(),
                course_count: 1,
            }),
        }
    }
    modules
}

/// Learner review of a generated curriculum. Only the approval flag and notes
/// on each link change; recommendations themselves stay as generated.
pub struct CurriculumApprovalService {
    store: Arc<dyn CurriculumStore>,
}

impl CurriculumApprovalService {
    pub fn new(store: Arc<dyn CurriculumStore>) -> Self {
        Self { store }
    }

    pub async fn get_curriculum(&self, curriculum_id: &str) -> Result<CurriculumDetail, ApprovalError> {
        let curriculum = self.store.get_curriculum(curriculum_id).await?;
        let courses = self.store.list_curriculum_courses(curriculum_id).await?;
        let modules = group_by_module(&courses);
        Ok(CurriculumDetail {
            curriculum,
            courses,
            modules,
        })
    }

    async fn update_link(
        &self,
        curriculum_id: &str,
        course_id: i64,
        update: CurriculumCourseUpdate,
    ) -> Result<(), ApprovalError> {
        // A missing curriculum surfaces as NotFound; a missing link inside an
        // existing curriculum is its own error.
        self.store.get_curriculum(curriculum_id).await?;
        match self
            .store
            .update_curriculum_course(curriculum_id, course_id, update)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Err(ApprovalError::CourseNotInCurriculum {
                curriculum_id: curriculum_id.to_string(),
                course_id,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn approval(approved: bool) -> CurriculumCourseUpdate {
        CurriculumCourseUpdate {
            user_approved: Some(approved),
            ..CurriculumCourseUpdate::default()
        }
    }

    pub async fn approve_course(&self, curriculum_id: &str, course_id: i64) -> Result<(), ApprovalError> {
        self.update_link(curriculum_id, course_id, Self::approval(true)).await?;
        tracing::info!(curriculum_id, course_id, "course approved");
        Ok(())
    }

    pub async fn reject_course(&self, curriculum_id: &str, course_id: i64) -> Result<(), ApprovalError> {
        self.update_link(curriculum_id, course_id, Self::approval(false)).await?;
        tracing::info!(curriculum_id, course_id, "course rejected");
        Ok(())
    }

    async fn bulk_set(
        &self,
        curriculum_id: &str,
        course_ids: &[i64],
        approved: bool,
    ) -> Result<BulkResult, ApprovalError> {
        self.store.get_curriculum(curriculum_id).await?;

        let mut result = BulkResult::default();
        for &course_id in course_ids {
            match self
                .store
                .update_curriculum_course(curriculum_id, course_id, Self::approval(approved))
                .await
            {
                Ok(()) => result.updated += 1,
                Err(e) if e.is_not_found() => result.missing.push(course_id),
                Err(e) => return Err(e.into()),
            }
        }

        if !result.missing.is_empty() {
            tracing::warn!(curriculum_id, missing = ?result.missing, "bulk update skipped unknown courses");
        }
        tracing::info!(curriculum_id, approved, updated = result.updated, "bulk approval update");
        Ok(result)
    }

    pub async fn bulk_approve(&self, curriculum_id: &str, course_ids: &[i64]) -> Result<BulkResult, ApprovalError> {
        self.bulk_set(curriculum_id, course_ids, true).await
    }

    pub async fn bulk_reject(&self, curriculum_id: &str, course_ids: &[i64]) -> Result<BulkResult, ApprovalError> {
        self.bulk_set(curriculum_id, course_ids, false).await
    }

    pub async fn add_course_notes(
        &self,
        curriculum_id: &str,
        course_id: i64,
        notes: String,
    ) -> Result<(), ApprovalError> {
        let update = CurriculumCourseUpdate {
            user_notes: Some(notes),
            ..CurriculumCourseUpdate::default()
        };
        self.update_link(curriculum_id, course_id, update).await
    }

    pub async fn get_curriculum_stats(&self, curriculum_id: &str) -> Result<CurriculumStats, ApprovalError> {
        self.store.get_curriculum(curriculum_id).await?;
        let courses = self.store.list_curriculum_courses(curriculum_id).await?;
        Ok(CurriculumStats::from_courses(&courses))
    }

    /// Finalizes the learner's choices. Pending links count as approved;
    /// rejected links stay on record but are left out of the published set.
    pub async fn publish_curriculum(&self, curriculum_id: &str) -> Result<PublishedCurriculum, ApprovalError> {
        let detail = self.get_curriculum(curriculum_id).await?;

        let approved = detail
            .courses
            .iter()
            .filter(|c| c.user_approved == Some(true))
            .count();
        if approved == 0 {
            return Err(ApprovalError::NoApprovedCourses);
        }

        let mut published = Vec::new();
        let mut excluded = 0;
        for mut course in detail.courses {
            match course.user_approved {
                Some(false) => excluded += 1,
                Some(true) => published.push(course),
                None => {
                    self.store
                        .update_curriculum_course(curriculum_id, course.course_id, Self::approval(true))
                        .await?;
                    course.user_approved = Some(true);
                    published.push(course);
                }
            }
        }

        let curriculum = self.store.publish_curriculum(curriculum_id).await?;
        tracing::info!(
            curriculum_id,
            approved,
            published = published.len(),
            excluded,
            "curriculum published"
        );
        Ok(PublishedCurriculum {
            curriculum,
            courses: published,
            excluded_courses: excluded,
        })
    }

    pub async fn set_curriculum_active(&self, curriculum_id: &str, is_active: bool) -> Result<(), ApprovalError> {
        self.store.set_curriculum_active(curriculum_id, is_active).await?;
        tracing::info!(curriculum_id, is_active, "curriculum active flag changed");
        Ok(())
    }
}
