use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::db::models::{
    CurriculumDraft, GenerationJob, JobUpdate, NewCurriculum, NewCurriculumCourse,
    NewCurriculumModule,
};
use crate::db::{now_rfc3339, CurriculumStore, StoreError};
use crate::services::lifecycle::{JobStatus, TransitionError};
use crate::services::profile::LearnerProfile;
use crate::services::sequencer::{CurriculumPlanner, GeneratedCurriculum, ALGORITHM_VERSION, MODEL_NAME};
use crate::workers::generation::{GenerationQueue, QueuedJob};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const RESTART_MESSAGE: &str = "orchestrator restart";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("generation timed out after {0}ms")]
    TimedOut(u64),
    #[error("generation cancelled")]
    Cancelled,
    #[error("generation queue is closed")]
    QueueClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationSettings {
    /// `None` lets a run take as long as it needs.
    pub timeout: Option<Duration>,
    pub serialize_per_profile: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            serialize_per_profile: true,
        }
    }
}

/// Fetch, plan and persist steps of one generation run.
pub struct CurriculumPipeline {
    store: Arc<dyn CurriculumStore>,
    planner: CurriculumPlanner,
}

impl CurriculumPipeline {
    pub fn new(store: Arc<dyn CurriculumStore>, planner: CurriculumPlanner) -> Self {
        Self { store, planner }
    }

    pub async fn build(
        &self,
        profile_id: &str,
    ) -> Result<(LearnerProfile, GeneratedCurriculum), StoreError> {
        let profile = self.store.fetch_profile(profile_id).await?;

        let assessment = match profile.latest_assessment_id.as_deref() {
            Some(assessment_id) => {
                let found = self.store.fetch_assessment(assessment_id).await?;
                if found.is_none() {
                    tracing::warn!(profile_id, assessment_id, "linked assessment missing, scoring without it");
                }
                found
            }
            None => None,
        };

        let catalog = self.store.fetch_eligible_courses(&profile.user_id).await?;
        let curriculum = self.planner.plan(&profile, &catalog, assessment.as_ref());
        Ok((profile, curriculum))
    }

    /// Writes the curriculum row, one row per module and one link per course,
    /// numbering links across modules from 1. The store commits all of them
    /// or none.
    pub async fn persist(
        &self,
        profile: &LearnerProfile,
        curriculum: &mut GeneratedCurriculum,
    ) -> Result<String, StoreError> {
        let modules = curriculum
            .modules
            .iter()
            .map(|module| NewCurriculumModule {
                module_order: module.module_order,
                module_name: module.module_name.clone(),
                module_description: module.module_description.clone(),
                difficulty_level: module.difficulty_level.as_str().to_string(),
                courses_in_module: module.courses.len() as u32,
            })
            .collect();

        let courses = curriculum
            .modules
            .iter()
            .flat_map(|module| module.courses.iter().map(move |scored| (module, scored)))
            .zip(1..)
            .map(|((module, scored), sequence_order)| NewCurriculumCourse {
                course_id: scored.course.id,
                sequence_order,
                module_name: module.module_name.clone(),
                recommendation_score: scored.relevance_score,
                recommendation_reason: scored.recommendation_reason.clone(),
                skill_gaps_addressed: scored.skill_gaps_addressed.clone(),
            })
            .collect();

        let draft = CurriculumDraft {
            curriculum: NewCurriculum {
                user_id: profile.user_id.clone(),
                profile_id: profile.id.clone(),
                curriculum_name: curriculum.curriculum_name.clone(),
                description: curriculum.description.clone(),
                ai_confidence_score: curriculum.ai_confidence_score,
                generation_metadata: serde_json::to_value(&curriculum.generation_metadata)?,
                estimated_completion_weeks: curriculum.estimated_completion_weeks,
                estimated_total_hours: curriculum.estimated_total_hours,
                total_courses: curriculum.total_courses as u32,
            },
            modules,
            courses,
        };
        let curriculum_id = self.store.save_generated_curriculum(draft).await?;

        curriculum.curriculum_id = curriculum_id.clone();
        Ok(curriculum_id)
    }
}

type PlannedRun = (
    Option<tokio::sync::OwnedMutexGuard<()>>,
    LearnerProfile,
    GeneratedCurriculum,
);

/// Owns the generation job lifecycle. Runs are handed to the
/// [`GenerationQueue`] and executed by its dispatcher.
pub struct CurriculumGenerator {
    store: Arc<dyn CurriculumStore>,
    pipeline: CurriculumPipeline,
    queue: GenerationQueue,
    settings: GenerationSettings,
    in_flight: Mutex<HashMap<String, CancellationToken>>,
    profile_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CurriculumGenerator {
    pub fn new(
        store: Arc<dyn CurriculumStore>,
        planner: CurriculumPlanner,
        queue: GenerationQueue,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            pipeline: CurriculumPipeline::new(Arc::clone(&store), planner),
            store,
            queue,
            settings,
            in_flight: Mutex::new(HashMap::new()),
            profile_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> GenerationSettings {
        self.settings
    }

    /// Creates a `pending` job and queues it. Returns without waiting for the run.
    pub async fn request_generation(&self, profile_id: &str) -> Result<GenerationJob, GenerationError> {
        let job = self
            .store
            .create_generation_job(
                profile_id,
                json!({ "algorithm_version": ALGORITHM_VERSION, "model": MODEL_NAME }),
            )
            .await?;

        let token = self.queue.child_token();
        self.in_flight.lock().insert(job.id.clone(), token.clone());

        let queued = QueuedJob {
            job_id: job.id.clone(),
            profile_id: profile_id.to_string(),
            cancel: token,
        };
        if self.queue.submit(queued).is_err() {
            self.in_flight.lock().remove(&job.id);
            self.fail_job(&job.id, &GenerationError::QueueClosed).await;
            return Err(GenerationError::QueueClosed);
        }

        tracing::info!(job_id = %job.id, profile_id, "curriculum generation requested");
        Ok(job)
    }

    pub async fn get_generation_status(&self, job_id: &str) -> Result<GenerationJob, GenerationError> {
        Ok(self.store.get_generation_job(job_id).await?)
    }

    /// Stops a queued or running job. Jobs already finished are left alone and
    /// reported as a transition error. A run that has started saving its
    /// curriculum finishes regardless.
    pub async fn cancel_generation(&self, job_id: &str) -> Result<GenerationJob, GenerationError> {
        let job = self.store.get_generation_job(job_id).await?;
        job.status.ensure_active()?;

        let token = self.in_flight.lock().get(job_id).cloned();
        match token {
            Some(token) => {
                tracing::info!(job_id, "cancelling curriculum generation");
                token.cancel();
                Ok(job)
            }
            None => {
                // Not owned by this process, nothing will pick it up again.
                self.fail_job(job_id, &GenerationError::Cancelled).await;
                Ok(self.store.get_generation_job(job_id).await?)
            }
        }
    }

    /// Fails jobs left `pending`/`processing` by an earlier process.
    pub async fn recover_stale_jobs(&self) -> Result<usize, GenerationError> {
        let jobs = self.store.list_unfinished_jobs().await?;
        let mut recovered = 0;
        for job in jobs {
            if self.in_flight.lock().contains_key(&job.id) {
                continue;
            }
            self.record_failure(job, RESTART_MESSAGE.to_string()).await?;
            recovered += 1;
        }
        if recovered > 0 {
            tracing::warn!(count = recovered, "failed stale generation jobs");
        }
        Ok(recovered)
    }

    /// Entry point for the queue dispatcher. Every outcome is recorded on the
    /// job; nothing propagates to the caller.
    pub async fn run_job(&self, job: QueuedJob) {
        match self.execute(&job).await {
            Ok(curriculum_id) => {
                tracing::info!(job_id = %job.job_id, curriculum_id = %curriculum_id, "curriculum generation completed");
            }
            Err(err) => {
                tracing::error!(job_id = %job.job_id, profile_id = %job.profile_id, error = %err, "curriculum generation failed");
                self.fail_job(&job.job_id, &err).await;
            }
        }

        self.in_flight.lock().remove(&job.job_id);
        self.release_profile_lock(&job.profile_id);
    }

    /// Marks the job `processing` as soon as it leaves the queue. Waiting for
    /// the profile lock and planning can be cancelled or time out; saving the
    /// result and completing the job cannot.
    async fn execute(&self, job: &QueuedJob) -> Result<String, GenerationError> {
        let started = Instant::now();
        let status = self.start_processing(&job.job_id).await?;
        tracing::info!(job_id = %job.job_id, profile_id = %job.profile_id, "curriculum generation processing");

        let planned = tokio::select! {
            biased;
            _ = job.cancel.cancelled() => Err(GenerationError::Cancelled),
            planned = self.plan_with_timeout(&job.profile_id) => planned,
        };
        let (_guard, profile, mut curriculum) = planned?;

        let curriculum_id = self.pipeline.persist(&profile, &mut curriculum).await?;

        self.store
            .update_generation_job(
                &job.job_id,
                JobUpdate {
                    status: Some(status.transition_to(JobStatus::Completed)?),
                    generated_curriculum_id: Some(curriculum_id.clone()),
                    courses_recommended: Some(curriculum.total_courses as u32),
                    generation_time_ms: Some(started.elapsed().as_millis() as u64),
                    completed_at: Some(now_rfc3339()),
                    ..JobUpdate::default()
                },
            )
            .await?;

        Ok(curriculum_id)
    }

    async fn start_processing(&self, job_id: &str) -> Result<JobStatus, GenerationError> {
        let job = self.store.get_generation_job(job_id).await?;
        let status = job.status.transition_to(JobStatus::Processing)?;
        self.store
            .update_generation_job(
                job_id,
                JobUpdate {
                    status: Some(status),
                    started_at: Some(now_rfc3339()),
                    ..JobUpdate::default()
                },
            )
            .await?;
        Ok(status)
    }

    async fn plan_with_timeout(&self, profile_id: &str) -> Result<PlannedRun, GenerationError> {
        match self.settings.timeout {
            Some(limit) => tokio::time::timeout(limit, self.plan(profile_id))
                .await
                .unwrap_or_else(|_| Err(GenerationError::TimedOut(limit.as_millis() as u64))),
            None => self.plan(profile_id).await,
        }
    }

    /// Takes the profile lock and builds the curriculum. The returned guard
    /// keeps other runs for the profile waiting until the result is saved.
    async fn plan(&self, profile_id: &str) -> Result<PlannedRun, GenerationError> {
        let guard = if self.settings.serialize_per_profile {
            Some(self.profile_lock(profile_id).lock_owned().await)
        } else {
            None
        };
        let (profile, curriculum) = self.pipeline.build(profile_id).await?;
        Ok((guard, profile, curriculum))
    }

    async fn fail_job(&self, job_id: &str, err: &GenerationError) {
        let job = match self.store.get_generation_job(job_id).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(job_id, error = %e, "could not load job to record failure");
                return;
            }
        };
        if job.status.is_terminal() {
            tracing::warn!(job_id, status = job.status.as_str(), "job already finished, failure not recorded");
            return;
        }
        if let Err(e) = self.record_failure(job, err.to_string()).await {
            tracing::error!(job_id, error = %e, "could not record job failure");
        }
    }

    /// Moves an unfinished job to `failed`, passing through `processing`
    /// first when it never left the queue.
    async fn record_failure(&self, job: GenerationJob, message: String) -> Result<(), GenerationError> {
        let mut status = job.status;
        if status == JobStatus::Pending {
            status = status.transition_to(JobStatus::Processing)?;
            self.store
                .update_generation_job(
                    &job.id,
                    JobUpdate {
                        status: Some(status),
                        started_at: Some(now_rfc3339()),
                        ..JobUpdate::default()
                    },
                )
                .await?;
        }

        let update = JobUpdate {
            status: Some(status.transition_to(JobStatus::Failed)?),
            error_message: Some(message),
            completed_at: Some(now_rfc3339()),
            ..JobUpdate::default()
        };
        self.store.update_generation_job(&job.id, update).await?;
        Ok(())
    }

    fn profile_lock(&self, profile_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.profile_locks.lock();
        Arc::clone(locks.entry(profile_id.to_string()).or_default())
    }

    fn release_profile_lock(&self, profile_id: &str) {
        let mut locks = self.profile_locks.lock();
        if locks
            .get(profile_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(profile_id);
        }
    }
}
