use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::services::curriculum::CurriculumGenerator;

/// One generation run waiting for the dispatcher.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job_id: String,
    pub profile_id: String,
    /// Cancelled on explicit cancellation or queue shutdown.
    pub cancel: CancellationToken,
}

#[derive(Debug, thiserror::Error)]
#[error("generation queue is closed")]
pub struct QueueClosed(pub QueuedJob);

/// Submission side of the generation work queue.
#[derive(Clone)]
pub struct GenerationQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
    shutdown: CancellationToken,
}

/// Dispatch side; drained by [`GenerationDispatcher::spawn`].
pub struct GenerationDispatcher {
    rx: mpsc::UnboundedReceiver<QueuedJob>,
    shutdown: CancellationToken,
}

pub fn generation_queue(shutdown: CancellationToken) -> (GenerationQueue, GenerationDispatcher) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        GenerationQueue {
            tx,
            shutdown: shutdown.clone(),
        },
        GenerationDispatcher { rx, shutdown },
    )
}

impl GenerationQueue {
    /// Token for a new job; shutting the queue down cancels it too.
    pub fn child_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn submit(&self, job: QueuedJob) -> Result<(), QueueClosed> {
        if self.shutdown.is_cancelled() {
            return Err(QueueClosed(job));
        }
        self.tx.send(job).map_err(|e| QueueClosed(e.0))
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.tx.is_closed()
    }
}

impl GenerationDispatcher {
    /// Starts the dispatcher loop. Every job runs on its own task so a slow
    /// run never holds up the ones queued behind it.
    pub fn spawn(self, generator: Arc<CurriculumGenerator>) -> JoinHandle<()> {
        tokio::spawn(self.run(generator))
    }

    async fn run(mut self, generator: Arc<CurriculumGenerator>) {
        info!("Generation dispatcher started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Generation dispatcher received shutdown signal");
                    break;
                }
                next = self.rx.recv() => match next {
                    Some(job) => {
                        debug!(job_id = %job.job_id, "dispatching generation job");
                        let generator = Arc::clone(&generator);
                        tokio::spawn(async move {
                            generator.run_job(job).await;
                        });
                    }
                    None => break,
                },
            }
        }

        // Anything still queued is failed through its cancelled token.
        self.rx.close();
        while let Some(job) = self.rx.recv().await {
            let generator = Arc::clone(&generator);
            tokio::spawn(async move {
                generator.run_job(job).await;
            });
        }
        info!("Generation dispatcher stopped");
    }
}
