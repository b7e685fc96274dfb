//! A fixed pool of tasks uploading parts from a bounded queue.

use crate::error::{MultipartError, PartFailure, S3Error, TransferError};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// An entry in the work queue.
#[derive(Debug)]
pub enum WorkItem<J> {
    /// A part to process.
    Part(J),
    /// Tells one worker to exit.
    Stop,
}

/// `N` workers sharing a queue of depth `N`.
///
/// The first failure raises a shared flag. From then on workers drain the
/// queue without processing, and the feeder should stop submitting. Tasks
/// still running when the pool is dropped are aborted.
pub struct PartWorkers<J> {
    sender: mpsc::Sender<WorkItem<J>>,
    tasks: JoinSet<Vec<PartFailure>>,
    failed: Arc<AtomicBool>,
    workers: usize,
}

impl<J: Send + 'static> PartWorkers<J> {
    /// Start `workers` tasks running `handler` for each submitted job.
    pub fn spawn<F, Fut>(workers: usize, handler: F) -> Self
    where
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PartFailure>> + Send + 'static,
    {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(workers);
        let receiver = Arc::new(Mutex::new(receiver));
        let handler = Arc::new(handler);
        let failed = Arc::new(AtomicBool::new(false));

        let mut tasks = JoinSet::new();
        for worker in 0..workers {
            let receiver = Arc::clone(&receiver);
            let handler = Arc::clone(&handler);
            let failed = Arc::clone(&failed);
            tasks.spawn(async move {
                let mut failures = Vec::new();
                loop {
                    let item = receiver.lock().await.recv().await;
                    match item {
                        Some(WorkItem::Part(job)) => {
                            if failed.load(Ordering::SeqCst) {
                                continue;
                            }
                            if let Err(failure) = (*handler)(job).await {
                                warn!(
                                    worker,
                                    part_number = failure.part_number,
                                    error = %failure.error,
                                    "Part failed"
                                );
                                failed.store(true, Ordering::SeqCst);
                                failures.push(failure);
                            }
                        }
                        Some(WorkItem::Stop) | None => break,
                    }
                }
                debug!(worker, "Worker stopped");
                failures
            });
        }

        Self {
            sender,
            tasks,
            failed,
            workers,
        }
    }

    /// True once any job failed.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Queue a job, waiting while the queue is full.
    pub async fn submit(&self, job: J) -> Result<(), S3Error> {
        self.sender
            .send(WorkItem::Part(job))
            .await
            .map_err(|_| S3Error::Transfer(TransferError::QueueClosed))
    }

    /// Stop the workers and wait for them.
    ///
    /// Every part failure is reported in one `PartsFailed` error for
    /// `upload_id`. A panicking worker is reported as `WorkerPanicked`,
    /// carrying the part failures of the workers that did finish.
    pub async fn finish(mut self, upload_id: &str) -> Result<(), S3Error> {
        for _ in 0..self.workers {
            if self.sender.send(WorkItem::Stop).await.is_err() {
                break;
            }
        }

        let mut failures = Vec::new();
        let mut panicked = None;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(worker_failures) => failures.extend(worker_failures),
                Err(e) => {
                    panicked.get_or_insert_with(|| e.to_string());
                }
            }
        }
        failures.sort_by_key(|f| f.part_number);

        if let Some(message) = panicked {
            return Err(S3Error::Transfer(TransferError::WorkerPanicked {
                message,
                failures,
            }));
        }
        if failures.is_empty() {
            return Ok(());
        }
        Err(S3Error::Multipart(MultipartError::PartsFailed {
            upload_id: upload_id.to_string(),
            failures,
        }))
    }
}

impl<J> std::fmt::Debug for PartWorkers<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartWorkers")
            .field("workers", &self.workers)
            .field("failed", &self.failed.load(Ordering::SeqCst))
            .finish()
    }
}
