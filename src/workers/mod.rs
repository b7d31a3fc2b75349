pub mod generation;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::services::curriculum::CurriculumGenerator;
use crate::workers::generation::GenerationDispatcher;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Owns background tasks and the token that stops them.
pub struct WorkerManager {
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerManager {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn start_generation(&self, dispatcher: GenerationDispatcher, generator: Arc<CurriculumGenerator>) {
        let handle = dispatcher.spawn(generator);
        self.handles.lock().push(handle);
        info!("Generation worker started");
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "worker task ended abnormally"),
                Err(_) => warn!("worker task did not stop within grace period"),
            }
        }
        info!("Workers stopped");
    }
}

impl Default for WorkerManager {
    fn default() -> Self {
        Self::new()
    }
}
