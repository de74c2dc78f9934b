use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{
    runtime::Handle,
    sync::{
        mpsc::{self, error::SendTimeoutError, error::TrySendError},
        Mutex,
    },
    task::JoinHandle,
};
use tracing::{debug, error, warn};

use crate::{client::MetricsClient, datum::Datum, retry::RetryPolicy, telemetry::Telemetry};

/// Default number of publish workers.
pub const DEFAULT_WORKERS: usize = 10;

/// Default depth of the publisher admission queue.
pub const DEFAULT_ADMISSION_QUEUE_SIZE: usize = 10_000;

/// Default amount of time a submission waits for room in a full admission queue.
pub const DEFAULT_ADMISSION_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors that could occur while submitting a batch to the publisher.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// The admission queue stayed full for the entire admission timeout, and the batch was dropped.
    #[error("admission queue still full after {0:?}, batch dropped")]
    TimedOut(Duration),

    /// The worker pool has shut down.
    #[error("publisher is closed")]
    Closed,
}

/// A completed batch in flight to the remote API.
#[derive(Debug)]
pub struct PublishTask {
    namespace: Arc<str>,
    datums: Vec<Datum>,
}

/// Publisher configuration.
#[derive(Clone, Debug)]
pub(crate) struct PublisherConfiguration {
    pub namespace: Arc<str>,
    pub workers: usize,
    pub admission_queue_size: usize,
    pub admission_timeout: Duration,
}

/// Submission handle for the publish worker pool.
#[derive(Clone)]
pub struct Publisher {
    tx: mpsc::Sender<PublishTask>,
    namespace: Arc<str>,
    admission_timeout: Duration,
    telemetry: Telemetry,
}

impl Publisher {
    /// Spawns the worker pool on the given runtime, returning the submission handle and the pool itself.
    ///
    /// Workers exit once every `Publisher` clone has been dropped and the admission queue is empty.
    pub(crate) fn spawn(
        handle: &Handle,
        config: PublisherConfiguration,
        client: Arc<dyn MetricsClient>,
        retry_policy: Arc<RetryPolicy>,
        telemetry: Telemetry,
    ) -> (Publisher, PublisherWorkers) {
        let (tx, rx) = mpsc::channel(config.admission_queue_size);
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..config.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    rx: Arc::clone(&rx),
                    client: Arc::clone(&client),
                    retry_policy: Arc::clone(&retry_policy),
                    telemetry: telemetry.clone(),
                };
                handle.spawn(worker.run())
            })
            .collect();

        let publisher = Publisher {
            tx,
            namespace: config.namespace,
            admission_timeout: config.admission_timeout,
            telemetry,
        };

        (publisher, PublisherWorkers { handles })
    }

    /// Submits a batch of datums for publishing.
    ///
    /// If the admission queue is full, waits up to the admission timeout for room.
    ///
    /// # Errors
    ///
    /// If the queue is still full once the timeout elapses, the batch is dropped and an error is returned. An error is
    /// also returned if the worker pool has shut down.
    pub async fn publish(&self, datums: Vec<Datum>) -> Result<(), SubmitError> {
        let task = PublishTask { namespace: Arc::clone(&self.namespace), datums };

        let task = match self.tx.try_send(task) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Closed(_)) => return Err(SubmitError::Closed),
            Err(TrySendError::Full(task)) => task,
        };

        match self.tx.send_timeout(task, self.admission_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(_)) => Err(SubmitError::Closed),
            Err(SendTimeoutError::Timeout(task)) => {
                warn!(
                    datums = task.datums.len(),
                    timeout = ?self.admission_timeout,
                    "Publisher admission queue full. Dropping batch."
                );
                self.telemetry.track_task_dropped_overflow();
                Err(SubmitError::TimedOut(self.admission_timeout))
            }
        }
    }

    /// Returns the number of tasks waiting in the admission queue.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

struct Worker {
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<PublishTask>>>,
    client: Arc<dyn MetricsClient>,
    retry_policy: Arc<RetryPolicy>,
    telemetry: Telemetry,
}

impl Worker {
    async fn run(self) {
        loop {
            // Only one idle worker waits on the queue at a time; the lock is released before the task is processed.
            let task = self.rx.lock().await.recv().await;
            let Some(task) = task else {
                debug!(worker = self.id, "Admission queue closed. Publish worker exiting.");
                break;
            };

            let result =
                self.retry_policy.put(&*self.client, &task.namespace, &task.datums, &self.telemetry).await;
            match result {
                Ok(attempts) => {
                    debug!(worker = self.id, datums = task.datums.len(), attempts, "Published batch.");
                    self.telemetry.track_task_published();
                }
                Err(e) => {
                    error!(
                        worker = self.id,
                        error = %e,
                        datums = task.datums.len(),
                        "Exhausted retries while publishing batch. Dropping batch."
                    );
                    self.telemetry.track_task_dropped_exhausted();
                }
            }
        }
    }
}

/// Handles to the running publish workers.
pub struct PublisherWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl PublisherWorkers {
    /// Waits for every worker to exit.
    ///
    /// Workers only exit after the admission queue has been closed and drained, so every admitted task runs to
    /// completion, retries included, before this returns.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Publish worker terminated abnormally.");
            }
        }
    }
}
