use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db::models::{
    AssessmentLink, CurriculumCourse, CurriculumCourseUpdate, CurriculumDraft,
    CurriculumModuleRecord, CurriculumRecord, GenerationJob, JobUpdate, ProgressUpdate,
    WorkflowProgress,
};
use crate::db::{CurriculumStore, StoreError};
use crate::services::course::Course;
use crate::services::lifecycle::{JobStatus, WorkflowStatus};
use crate::services::profile::{
    Assessment, CategoryPerformance, ExperienceLevel, LearnerProfile, LearningGoal, LearningStyle,
    NewLearnerProfile, ProficiencyArea, ProfilingData,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_error(message: String) -> StoreError {
    StoreError::Database(sqlx::Error::Decode(message.into()))
}

fn to_u32(value: i32) -> u32 {
    value.max(0) as u32
}

fn map_profile(row: &PgRow) -> Result<LearnerProfile, StoreError> {
    let level: String = row.try_get("experience_level")?;
    let style: String = row.try_get("preferred_learning_style")?;
    let goals: Json<Vec<LearningGoal>> = row.try_get("learning_goals")?;
    let areas: Option<Json<Vec<ProficiencyArea>>> = row.try_get("proficiency_areas")?;
    let years: Option<i32> = row.try_get("years_experience")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(LearnerProfile {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        profile_name: row.try_get("profile_name")?,
        description: row.try_get("description")?,
        learning_goals: goals.0,
        target_audience: row.try_get("target_audience")?,
        experience_level: ExperienceLevel::parse(&level).unwrap_or_default(),
        industry: row.try_get("industry")?,
        job_role: row.try_get("job_role")?,
        company_size: row.try_get("company_size")?,
        years_experience: years.map(to_u32),
        preferred_learning_style: LearningStyle::parse(&style).unwrap_or_default(),
        available_hours_per_week: to_u32(row.try_get("available_hours_per_week")?),
        preferred_schedule: row.try_get::<Json<Value>, _>("preferred_schedule")?.0,
        latest_assessment_id: row.try_get("latest_assessment_id")?,
        irt_ability_score: row.try_get("irt_ability_score")?,
        proficiency_areas: areas.map(|a| a.0),
        is_active: row.try_get("is_active")?,
        is_primary: row.try_get("is_primary")?,
        created_at: ts(created_at),
    })
}

fn map_assessment(row: &PgRow) -> Result<Assessment, StoreError> {
    let category_scores: Json<BTreeMap<String, Value>> = row.try_get("category_scores")?;
    let weak: Json<Vec<CategoryPerformance>> = row.try_get("weak_categories")?;
    let strong: Json<Vec<CategoryPerformance>> = row.try_get("strong_categories")?;
    let profiling: Option<Json<ProfilingData>> = row.try_get("profiling_data")?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at")?;

    Ok(Assessment {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        final_score: row.try_get("final_score")?,
        ability_estimate: row.try_get("final_irt_ability")?,
        augmentation_level: row.try_get("augmentation_level")?,
        category_scores: category_scores.0,
        weak_categories: weak.0,
        strong_categories: strong.0,
        profiling_data: profiling.map(|p| p.0),
        is_complete: row.try_get("is_complete")?,
        completed_at: completed_at.map(ts),
    })
}

fn map_course(row: &PgRow) -> Result<Course, StoreError> {
    Ok(Course {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        level: row.try_get("level")?,
        duration: row.try_get("duration")?,
        estimated_duration_hours: row.try_get("estimated_duration_hours")?,
        price: row.try_get("price")?,
        keywords: row.try_get("keywords")?,
        audiences: row.try_get("audiences")?,
        is_active: row.try_get("is_active")?,
        display: row.try_get("display")?,
    })
}

fn map_job(row: &PgRow) -> Result<GenerationJob, StoreError> {
    let status: String = row.try_get("status")?;
    let status = JobStatus::parse(&status)
        .ok_or_else(|| decode_error(format!("unknown job status '{status}'")))?;
    let courses: Option<i32> = row.try_get("courses_recommended")?;
    let elapsed: Option<i64> = row.try_get("generation_time_ms")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let started_at: Option<DateTime<Utc>> = row.try_get("started_at")?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at")?;

    Ok(GenerationJob {
        id: row.try_get("id")?,
        profile_id: row.try_get("profile_id")?,
        status,
        generated_curriculum_id: row.try_get("generated_curriculum_id")?,
        error_message: row.try_get("error_message")?,
        courses_recommended: courses.map(to_u32),
        generation_time_ms: elapsed.map(|ms| ms.max(0) as u64),
        input_parameters: row.try_get::<Json<Value>, _>("input_parameters")?.0,
        created_at: ts(created_at),
        started_at: started_at.map(ts),
        completed_at: completed_at.map(ts),
    })
}

fn map_curriculum(row: &PgRow) -> Result<CurriculumRecord, StoreError> {
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
    Ok(CurriculumRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        profile_id: row.try_get("profile_id")?,
        curriculum_name: row.try_get("curriculum_name")?,
        description: row.try_get("description")?,
        generated_by_ai: row.try_get("generated_by_ai")?,
        ai_confidence_score: row.try_get("ai_confidence_score")?,
        generation_metadata: row.try_get::<Json<Value>, _>("generation_metadata")?.0,
        difficulty_progression: row.try_get("difficulty_progression")?,
        estimated_completion_weeks: to_u32(row.try_get("estimated_completion_weeks")?),
        estimated_total_hours: to_u32(row.try_get("estimated_total_hours")?),
        total_courses: to_u32(row.try_get("total_courses")?),
        is_active: row.try_get("is_active")?,
        is_published: row.try_get("is_published")?,
        created_at: ts(created_at),
        updated_at: ts(updated_at),
    })
}

fn map_module(row: &PgRow) -> Result<CurriculumModuleRecord, StoreError> {
    Ok(CurriculumModuleRecord {
        curriculum_id: row.try_get("curriculum_id")?,
        module_order: to_u32(row.try_get("module_order")?),
        module_name: row.try_get("module_name")?,
        module_description: row.try_get("module_description")?,
        difficulty_level: row.try_get("difficulty_level")?,
        courses_in_module: to_u32(row.try_get("courses_in_module")?),
    })
}

fn map_curriculum_course(row: &PgRow) -> Result<CurriculumCourse, StoreError> {
    Ok(CurriculumCourse {
        id: row.try_get("id")?,
        curriculum_id: row.try_get("curriculum_id")?,
        course_id: row.try_get("course_id")?,
        sequence_order: to_u32(row.try_get("sequence_order")?),
        module_name: row.try_get("module_name")?,
        ai_recommended: row.try_get("ai_recommended")?,
        recommendation_score: row.try_get("recommendation_score")?,
        recommendation_reason: row.try_get("recommendation_reason")?,
        skill_gaps_addressed: row.try_get("skill_gaps_addressed")?,
        user_approved: row.try_get("user_approved")?,
        user_notes: row.try_get("user_notes")?,
        is_required: row.try_get("is_required")?,
    })
}

fn map_progress(row: &PgRow) -> Result<WorkflowProgress, StoreError> {
    let status: String = row.try_get("status")?;
    let status = WorkflowStatus::parse(&status)
        .ok_or_else(|| decode_error(format!("unknown workflow status '{status}'")))?;
    let completed_steps: Vec<i32> = row.try_get("completed_steps")?;
    let step_data: Json<Map<String, Value>> = row.try_get("step_data")?;
    let started_at: DateTime<Utc> = row.try_get("started_at")?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at")?;
    let last_activity_at: DateTime<Utc> = row.try_get("last_activity_at")?;

    Ok(WorkflowProgress {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        profile_id: row.try_get("profile_id")?,
        current_step_order: to_u32(row.try_get("current_step_order")?),
        completed_steps: completed_steps.into_iter().map(to_u32).collect(),
        step_data: step_data.0,
        status,
        started_at: ts(started_at),
        completed_at: completed_at.map(ts),
        last_activity_at: ts(last_activity_at),
    })
}

const COURSE_COLUMNS: &str = r#"
    id, title, description, category, level, duration, estimated_duration_hours,
    price, keywords, audiences, is_active, display
"#;

#[async_trait]
impl CurriculumStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch_profile(&self, profile_id: &str) -> Result<LearnerProfile, StoreError> {
        let row = sqlx::query(r#"SELECT * FROM learner_profiles WHERE id = $1"#)
            .bind(profile_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("learner_profile", profile_id))?;
        map_profile(&row)
    }

    async fn fetch_assessment(&self, assessment_id: &str) -> Result<Option<Assessment>, StoreError> {
        let row = sqlx::query(r#"SELECT * FROM user_ai_assessments WHERE id = $1"#)
            .bind(assessment_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_assessment).transpose()
    }

    async fn fetch_latest_assessment_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Assessment>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM user_ai_assessments
            WHERE user_id = $1 AND is_complete = TRUE
            ORDER BY completed_at DESC NULLS LAST
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_assessment).transpose()
    }

    async fn fetch_eligible_courses(&self, user_id: &str) -> Result<Vec<Course>, StoreError> {
        let sql = format!(
            r#"
            SELECT {COURSE_COLUMNS} FROM courses c
            WHERE c.is_active = TRUE AND c.display = TRUE
              AND NOT EXISTS (
                SELECT 1 FROM enrollments e WHERE e.user_id = $1 AND e.course_id = c.id
              )
            ORDER BY c.id
            "#
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.pool).await?;
        rows.iter().map(map_course).collect()
    }

    async fn fetch_published_courses(&self) -> Result<Vec<Course>, StoreError> {
        let sql = format!(
            r#"SELECT {COURSE_COLUMNS} FROM courses WHERE is_active = TRUE AND display = TRUE ORDER BY id"#
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(map_course).collect()
    }

    async fn fetch_enrolled_course_ids(&self, user_id: &str) -> Result<Vec<i64>, StoreError> {
        let ids = sqlx::query_scalar(
            r#"SELECT course_id FROM enrollments WHERE user_id = $1 ORDER BY course_id"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn fetch_completed_course_ids(&self, user_id: &str) -> Result<Vec<i64>, StoreError> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT course_id FROM enrollments
            WHERE user_id = $1 AND progress_percentage >= 100
            ORDER BY course_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn create_generation_job(
        &self,
        profile_id: &str,
        input_parameters: Value,
    ) -> Result<GenerationJob, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO curriculum_generation_jobs (id, profile_id, status, input_parameters)
            VALUES ($1, $2, 'pending', $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(profile_id)
        .bind(Json(input_parameters))
        .fetch_one(&self.pool)
        .await?;
        map_job(&row)
    }

    async fn update_generation_job(
        &self,
        job_id: &str,
        update: JobUpdate,
    ) -> Result<GenerationJob, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE curriculum_generation_jobs SET
                status = COALESCE($2, status),
                generated_curriculum_id = COALESCE($3, generated_curriculum_id),
                error_message = COALESCE($4, error_message),
                courses_recommended = COALESCE($5, courses_recommended),
                generation_time_ms = COALESCE($6, generation_time_ms),
                started_at = COALESCE($7::timestamptz, started_at),
                completed_at = COALESCE($8::timestamptz, completed_at)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(update.status.map(JobStatus::as_str))
        .bind(update.generated_curriculum_id)
        .bind(update.error_message)
        .bind(update.courses_recommended.map(|n| n as i32))
        .bind(update.generation_time_ms.map(|ms| ms as i64))
        .bind(update.started_at)
        .bind(update.completed_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("generation_job", job_id))?;
        map_job(&row)
    }

    async fn get_generation_job(&self, job_id: &str) -> Result<GenerationJob, StoreError> {
        let row = sqlx::query(r#"SELECT * FROM curriculum_generation_jobs WHERE id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("generation_job", job_id))?;
        map_job(&row)
    }

    async fn list_unfinished_jobs(&self) -> Result<Vec<GenerationJob>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM curriculum_generation_jobs
            WHERE status IN ('pending', 'processing')
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_job).collect()
    }

    async fn save_generated_curriculum(&self, draft: CurriculumDraft) -> Result<String, StoreError> {
        let CurriculumDraft {
            curriculum,
            modules,
            courses,
        } = draft;
        let id = Uuid::new_v4().to_string();

        // Dropping `tx` before commit rolls every insert back.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO user_curricula (
                id, user_id, profile_id, curriculum_name, description, generated_by_ai,
                ai_confidence_score, generation_metadata, difficulty_progression,
                estimated_completion_weeks, estimated_total_hours, total_courses,
                is_active, is_published
            )
            VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7, 'linear', $8, $9, $10, TRUE, FALSE)
            "#,
        )
        .bind(&id)
        .bind(&curriculum.user_id)
        .bind(&curriculum.profile_id)
        .bind(&curriculum.curriculum_name)
        .bind(&curriculum.description)
        .bind(curriculum.ai_confidence_score)
        .bind(Json(&curriculum.generation_metadata))
        .bind(curriculum.estimated_completion_weeks as i32)
        .bind(curriculum.estimated_total_hours as i32)
        .bind(curriculum.total_courses as i32)
        .execute(&mut *tx)
        .await?;

        for module in &modules {
            sqlx::query(
                r#"
                INSERT INTO curriculum_modules (
                    curriculum_id, module_order, module_name, module_description,
                    difficulty_level, courses_in_module
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&id)
            .bind(module.module_order as i32)
            .bind(&module.module_name)
            .bind(&module.module_description)
            .bind(&module.difficulty_level)
            .bind(module.courses_in_module as i32)
            .execute(&mut *tx)
            .await?;
        }

        for link in &courses {
            sqlx::query(
                r#"
                INSERT INTO curriculum_courses (
                    id, curriculum_id, course_id, sequence_order, module_name, ai_recommended,
                    recommendation_score, recommendation_reason, skill_gaps_addressed, user_approved
                )
                VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7, $8, NULL)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&id)
            .bind(link.course_id)
            .bind(link.sequence_order as i32)
            .bind(&link.module_name)
            .bind(link.recommendation_score)
            .bind(&link.recommendation_reason)
            .bind(&link.skill_gaps_addressed)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    async fn get_curriculum(&self, curriculum_id: &str) -> Result<CurriculumRecord, StoreError> {
        let row = sqlx::query(r#"SELECT * FROM user_curricula WHERE id = $1"#)
            .bind(curriculum_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("curriculum", curriculum_id))?;
        map_curriculum(&row)
    }

    async fn list_curriculum_modules(
        &self,
        curriculum_id: &str,
    ) -> Result<Vec<CurriculumModuleRecord>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT * FROM curriculum_modules WHERE curriculum_id = $1 ORDER BY module_order"#,
        )
        .bind(curriculum_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_module).collect()
    }

    async fn list_curriculum_courses(
        &self,
        curriculum_id: &str,
    ) -> Result<Vec<CurriculumCourse>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT * FROM curriculum_courses WHERE curriculum_id = $1 ORDER BY sequence_order"#,
        )
        .bind(curriculum_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_curriculum_course).collect()
    }

    async fn update_curriculum_course(
        &self,
        curriculum_id: &str,
        course_id: i64,
        update: CurriculumCourseUpdate,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE curriculum_courses SET
                user_approved = COALESCE($3, user_approved),
                user_notes = COALESCE($4, user_notes),
                updated_at = NOW()
            WHERE curriculum_id = $1 AND course_id = $2
            "#,
        )
        .bind(curriculum_id)
        .bind(course_id)
        .bind(update.user_approved)
        .bind(update.user_notes)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(
                "curriculum_course",
                format!("{curriculum_id}/{course_id}"),
            ));
        }
        Ok(())
    }

    async fn publish_curriculum(&self, curriculum_id: &str) -> Result<CurriculumRecord, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE user_curricula SET is_published = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(curriculum_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("curriculum", curriculum_id))?;
        map_curriculum(&row)
    }

    async fn set_curriculum_active(&self, curriculum_id: &str, is_active: bool) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE user_curricula SET is_active = $2, updated_at = NOW() WHERE id = $1"#,
        )
        .bind(curriculum_id)
        .bind(is_active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("curriculum", curriculum_id));
        }
        Ok(())
    }

    async fn get_or_create_workflow_progress(&self, user_id: &str) -> Result<WorkflowProgress, StoreError> {
        let existing = sqlx::query(
            r#"
            SELECT * FROM user_profile_workflow_progress
            WHERE user_id = $1 AND status IN ('not_started', 'in_progress')
            ORDER BY last_activity_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            return map_progress(&row);
        }

        let row = sqlx::query(
            r#"
            INSERT INTO user_profile_workflow_progress
                (id, user_id, status, current_step_order, step_data, completed_steps)
            VALUES ($1, $2, 'not_started', 1, '{}'::jsonb, '{}')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        map_progress(&row)
    }

    async fn get_workflow_progress(&self, progress_id: &str) -> Result<WorkflowProgress, StoreError> {
        let row = sqlx::query(r#"SELECT * FROM user_profile_workflow_progress WHERE id = $1"#)
            .bind(progress_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("workflow_progress", progress_id))?;
        map_progress(&row)
    }

    async fn update_workflow_progress(
        &self,
        progress_id: &str,
        update: ProgressUpdate,
    ) -> Result<WorkflowProgress, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE user_profile_workflow_progress SET
                status = COALESCE($2, status),
                current_step_order = GREATEST(COALESCE($3, current_step_order), COALESCE($4, 0)),
                completed_steps = CASE
                    WHEN $5::int IS NULL OR $5::int = ANY(completed_steps) THEN completed_steps
                    ELSE array_append(completed_steps, $5::int)
                END,
                step_data = step_data || COALESCE($6::jsonb, '{}'::jsonb),
                profile_id = COALESCE($7, profile_id),
                completed_at = COALESCE($8::timestamptz, completed_at),
                last_activity_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(progress_id)
        .bind(update.status.map(WorkflowStatus::as_str))
        .bind(update.current_step_order.map(|n| n as i32))
        .bind(update.advance_to.map(|n| n as i32))
        .bind(update.completed_step.map(|n| n as i32))
        .bind(update.step_data.map(Json))
        .bind(update.profile_id)
        .bind(update.completed_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("workflow_progress", progress_id))?;
        map_progress(&row)
    }

    async fn create_learner_profile(&self, profile: NewLearnerProfile) -> Result<LearnerProfile, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO learner_profiles (
                id, user_id, profile_name, description, learning_goals, target_audience,
                experience_level, industry, job_role, company_size, years_experience,
                preferred_learning_style, available_hours_per_week, preferred_schedule,
                latest_assessment_id, is_active, is_primary, created_via
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, TRUE, $16, 'workflow')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&profile.user_id)
        .bind(&profile.profile_name)
        .bind(&profile.description)
        .bind(Json(&profile.learning_goals))
        .bind(&profile.target_audience)
        .bind(profile.experience_level.as_str())
        .bind(&profile.industry)
        .bind(&profile.job_role)
        .bind(&profile.company_size)
        .bind(profile.years_experience.map(|y| y as i32))
        .bind(profile.preferred_learning_style.as_str())
        .bind(profile.available_hours_per_week as i32)
        .bind(Json(&profile.preferred_schedule))
        .bind(&profile.latest_assessment_id)
        .bind(profile.is_primary)
        .fetch_one(&self.pool)
        .await?;
        map_profile(&row)
    }

    async fn user_has_primary_profile(&self, user_id: &str) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM learner_profiles
                WHERE user_id = $1 AND is_primary = TRUE AND is_active = TRUE
            )
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn update_learner_profile_assessment(
        &self,
        profile_id: &str,
        link: AssessmentLink,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE learner_profiles SET
                latest_assessment_id = $2,
                irt_ability_score = $3,
                proficiency_areas = $4
            WHERE id = $1
            "#,
        )
        .bind(profile_id)
        .bind(&link.assessment_id)
        .bind(link.irt_ability_score)
        .bind(Json(&link.proficiency_areas))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("learner_profile", profile_id));
        }
        Ok(())
    }
}
