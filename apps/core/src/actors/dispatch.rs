use crate::actors::traits::Character;
use crate::error::AppError;
use crate::models::ResponseContext;
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// One detached character reply.
pub struct ResponseJob {
    pub character: Arc<dyn Character>,
    pub message: String,
    pub speaker: String,
    pub context: ResponseContext,
}

/// A fixed set of workers running character replies nobody waits for.
///
/// Jobs go through a bounded channel shared by all workers. Nothing is sent back
/// to the caller; callers that need the text call the character directly.
pub struct ResponsePool {
    sender: Mutex<Option<mpsc::Sender<ResponseJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    completed: Arc<AtomicUsize>,
}

impl ResponsePool {
    /// Spawns `size` workers (at least one).
    pub fn new(size: usize, capacity: usize, job_timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let completed = Arc::new(AtomicUsize::new(0));

        let workers = (0..size.max(1))
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                let completed = Arc::clone(&completed);
                tokio::spawn(worker_loop(id, receiver, completed, job_timeout))
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            completed,
        }
    }

    /// Queues a job without waiting for it.
    pub fn dispatch(&self, job: ResponseJob) -> Result<(), AppError> {
        let guard = self
            .sender
            .lock()
            .map_err(|e| AppError::Internal(format!("Response pool lock poisoned: {}", e)))?;
        let Some(sender) = guard.as_ref() else {
            return Err(AppError::Shutdown);
        };
        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => Err(AppError::Internal(format!(
                "Response pool saturated, dropping reply from {}",
                job.character.name()
            ))),
            Err(TrySendError::Closed(_)) => Err(AppError::Shutdown),
        }
    }

    /// Number of jobs that have finished, successfully or not.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Stops accepting jobs, lets queued ones finish, and waits for every worker.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if workers.is_empty() {
            return;
        }
        for result in join_all(workers).await {
            if let Err(e) = result {
                warn!("Response worker ended abnormally: {}", e);
            }
        }
        info!("Response pool stopped");
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<ResponseJob>>>,
    completed: Arc<AtomicUsize>,
    job_timeout: Duration,
) {
    loop {
        let job = { receiver.lock().await.recv().await };
        let Some(job) = job else { break };

        let name = job.character.name().to_string();
        match timeout(
            job_timeout,
            job.character
                .respond_to(&job.message, &job.speaker, &job.context),
        )
        .await
        {
            Ok(reply) => debug!(worker = id, character = %name, "Detached reply: {}", reply),
            Err(_) => warn!(worker = id, character = %name, "Detached reply timed out"),
        }
        completed.fetch_add(1, Ordering::SeqCst);
    }
    debug!(worker = id, "Response worker exiting");
}
