use std::time::{Duration, SystemTime};

use rand::Rng as _;
use tokio::{
    select,
    sync::{mpsc, watch},
    time::{interval_at, sleep, Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace};

use crate::{datum::Datum, publisher::Publisher};

use super::{signalled, ForwarderConfiguration, DISPATCH_IDLE_INTERVAL};

/// Picks a random publish jitter within the given interval.
pub(crate) fn publish_jitter(interval: Duration) -> Duration {
    let nanos = u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX);
    if nanos == 0 {
        return Duration::ZERO;
    }

    Duration::from_nanos(rand::rng().random_range(0..nanos))
}

/// Returns how long to wait before the first publish.
///
/// The first publish happens `jitter` after the most recent instant, measured from the Unix epoch, that is a whole
/// multiple of `interval`. If that moment has already passed, there is no wait.
pub(crate) fn initial_delay(since_epoch: Duration, interval: Duration, jitter: Duration) -> Duration {
    let interval_nanos = interval.as_nanos();
    if interval_nanos == 0 {
        return Duration::ZERO;
    }

    let into_interval = since_epoch.as_nanos() % interval_nanos;
    let into_interval = Duration::from_nanos(u64::try_from(into_interval).unwrap_or(u64::MAX));
    jitter.saturating_sub(into_interval)
}

/// Dispatch loop.
///
/// Takes completed batches off the completed-batch queue and submits them to the publisher. Publishing happens on
/// every tick of the publish interval, immediately when the queue reaches capacity, and eagerly once the ingestion loop
/// has finished.
pub(crate) struct Dispatch {
    config: ForwarderConfiguration,
    jitter: Duration,
    batches: mpsc::Receiver<Vec<Datum>>,
    publisher: Publisher,
    shutdown: watch::Receiver<bool>,
    ingest_done: watch::Receiver<bool>,
}

impl Dispatch {
    /// Creates a new `Dispatch`.
    pub fn new(
        config: ForwarderConfiguration,
        jitter: Duration,
        batches: mpsc::Receiver<Vec<Datum>>,
        publisher: Publisher,
        shutdown: watch::Receiver<bool>,
        ingest_done: watch::Receiver<bool>,
    ) -> Self {
        Dispatch { config, jitter, batches, publisher, shutdown, ingest_done }
    }

    /// Runs the dispatch loop.
    ///
    /// Once the ingestion loop has finished, the first publish is no longer delayed, and the loop exits as soon as the
    /// queue is empty. When shutdown is signalled, the loop exits without publishing whatever is still queued.
    pub async fn run(mut self) {
        let interval = self.config.force_flush_interval;
        let since_epoch = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
        let delay = initial_delay(since_epoch, interval, self.jitter);
        info!(?interval, jitter = ?self.jitter, ?delay, "Starting publish loop.");

        select! {
            biased;

            _ = signalled(&mut self.shutdown) => {
                debug!("Publish loop received shutdown signal before first publish. Exiting.");
                return;
            }
            _ = signalled(&mut self.ingest_done) => {
                debug!("Ingestion finished before first publish. Publishing immediately.");
            }
            _ = sleep(delay) => {}
        }

        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *self.shutdown.borrow() {
                debug!(queued = self.batches.len(), "Publish loop received shutdown signal. Exiting.");
                break;
            }

            let ingest_done = *self.ingest_done.borrow();
            let backpressure = self.batches.len() >= self.config.batch_queue_size;
            if ingest_done || backpressure {
                trace!(ingest_done, backpressure, "Publishing queued batches early.");
                self.publish_queued().await;

                if ingest_done && self.batches.is_empty() {
                    debug!("Ingestion finished and completed-batch queue drained. Exiting publish loop.");
                    break;
                }
                continue;
            }

            select! {
                biased;

                _ = signalled(&mut self.shutdown) => {}
                _ = ticker.tick() => self.publish_queued().await,
                _ = sleep(DISPATCH_IDLE_INTERVAL) => {}
            }
        }
    }

    async fn publish_queued(&mut self) {
        let mut published = 0;
        while let Ok(datums) = self.batches.try_recv() {
            if let Err(e) = self.publisher.publish(datums).await {
                debug!(error = %e, "Failed to submit batch to publisher.");
            }
            published += 1;
        }

        if published > 0 {
            debug!(batches = published, "Submitted queued batches to publisher.");
        }
    }
}
