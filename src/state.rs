use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::db::CurriculumStore;
use crate::services::approval::CurriculumApprovalService;
use crate::services::curriculum::{CurriculumGenerator, GenerationSettings};
use crate::services::learning_paths::LearningPathRecommender;
use crate::services::scoring::ScoringEngine;
use crate::services::sequencer::CurriculumPlanner;
use crate::services::workflow::ProfileWorkflowService;
use crate::workers::generation::generation_queue;
use crate::workers::WorkerManager;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    store: Arc<dyn CurriculumStore>,
    generator: Arc<CurriculumGenerator>,
    workflow: Arc<ProfileWorkflowService>,
    approval: Arc<CurriculumApprovalService>,
    learning_paths: Arc<LearningPathRecommender>,
}

impl AppState {
    pub fn new(store: Arc<dyn CurriculumStore>, generator: Arc<CurriculumGenerator>) -> Self {
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            workflow: Arc::new(ProfileWorkflowService::new(Arc::clone(&store))),
            approval: Arc::new(CurriculumApprovalService::new(Arc::clone(&store))),
            learning_paths: Arc::new(LearningPathRecommender::new(Arc::clone(&store))),
            store,
            generator,
        }
    }

    /// Wires the generation queue into `workers` and builds every service
    /// around `store`.
    pub fn start(
        store: Arc<dyn CurriculumStore>,
        settings: GenerationSettings,
        workers: &WorkerManager,
    ) -> Self {
        let (queue, dispatcher) = generation_queue(workers.shutdown_token());
        let planner = CurriculumPlanner::new(ScoringEngine::new());
        let generator = Arc::new(CurriculumGenerator::new(
            Arc::clone(&store),
            planner,
            queue,
            settings,
        ));
        workers.start_generation(dispatcher, Arc::clone(&generator));
        Self::new(store, generator)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn store(&self) -> Arc<dyn CurriculumStore> {
        Arc::clone(&self.store)
    }

    pub fn generator(&self) -> Arc<CurriculumGenerator> {
        Arc::clone(&self.generator)
    }

    pub fn workflow(&self) -> Arc<ProfileWorkflowService> {
        Arc::clone(&self.workflow)
    }

    pub fn approval(&self) -> Arc<CurriculumApprovalService> {
        Arc::clone(&self.approval)
    }

    pub fn learning_paths(&self) -> Arc<LearningPathRecommender> {
        Arc::clone(&self.learning_paths)
    }
}
