use tokio::{
    select,
    sync::{mpsc, watch},
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, trace};

use crate::{
    batch::DatumBatch, convert::DatumBuilder, datum::Datum, point::MeasurementPoint, telemetry::Telemetry,
};

use super::{signalled, ForwarderConfiguration, FORCE_FLUSH_CHECK_INTERVAL};

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

/// Ingestion loop.
///
/// Drains the measurement point channel, converting each point into datums and accumulating them into batches. Batches
/// are pushed onto the completed-batch queue as soon as they fill up, or once they have been open for longer than the
/// force-flush interval.
pub(crate) struct Ingest {
    config: ForwarderConfiguration,
    builder: DatumBuilder,
    points: mpsc::Receiver<MeasurementPoint>,
    batches: mpsc::Sender<Vec<Datum>>,
    shutdown: watch::Receiver<bool>,
    drain: watch::Receiver<bool>,
    done: watch::Sender<bool>,
    telemetry: Telemetry,
}

impl Ingest {
    /// Creates a new `Ingest`.
    pub fn new(
        config: ForwarderConfiguration,
        builder: DatumBuilder,
        points: mpsc::Receiver<MeasurementPoint>,
        batches: mpsc::Sender<Vec<Datum>>,
        shutdown: watch::Receiver<bool>,
        drain: watch::Receiver<bool>,
        done: watch::Sender<bool>,
        telemetry: Telemetry,
    ) -> Self {
        Ingest { config, builder, points, batches, shutdown, drain, done, telemetry }
    }

    /// Runs the ingestion loop.
    ///
    /// The loop exits immediately when shutdown is signalled, discarding the in-progress batch and any points still in
    /// the channel. When draining is signalled, the channel is closed to new points, the points already in it are
    /// ingested, and the in-progress batch is flushed before exiting. The same happens once every point sender has been
    /// dropped. Whichever way the loop exits, the ingestion-finished signal is raised.
    pub async fn run(mut self) {
        let mut batch =
            DatumBatch::new(self.config.max_datums_per_batch, self.config.request_overhead, now());

        let mut ticker =
            interval_at(Instant::now() + FORCE_FLUSH_CHECK_INTERVAL, FORCE_FLUSH_CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                biased;

                _ = signalled(&mut self.shutdown) => {
                    debug!(pending_datums = batch.len(), "Ingestion loop received shutdown signal. Exiting.");
                    break;
                }

                _ = signalled(&mut self.drain) => {
                    debug!(queued_points = self.points.len(), "Ingestion loop draining. Flushing and exiting.");
                    self.drain_remaining(&mut batch).await;
                    break;
                }

                maybe_point = self.points.recv() => match maybe_point {
                    Some(point) => {
                        if !self.ingest(&point, &mut batch).await {
                            break;
                        }
                    }
                    None => {
                        debug!("Measurement channel closed. Flushing remaining datums and exiting.");
                        self.drain_remaining(&mut batch).await;
                        break;
                    }
                },

                _ = ticker.tick() => {
                    let now = now();
                    if batch.should_force_flush(now, self.config.force_flush_interval) {
                        let datums = batch.take(now);
                        if !self.flush(datums, true).await {
                            break;
                        }
                    }
                }
            }
        }

        self.done.send_replace(true);
    }

    async fn drain_remaining(&mut self, batch: &mut DatumBatch) {
        self.points.close();
        while let Ok(point) = self.points.try_recv() {
            if !self.ingest(&point, batch).await {
                return;
            }
        }

        if !batch.is_empty() {
            let datums = batch.take(now());
            self.flush(datums, true).await;
        }
    }

    async fn ingest(&mut self, point: &MeasurementPoint, batch: &mut DatumBatch) -> bool {
        let datums = self.builder.build(point);
        trace!(point = point.name(), datums = datums.len(), "Built datums from measurement point.");
        self.telemetry.track_datums_built(datums.len());

        for datum in datums {
            let now = now();
            if let Some(completed) = batch.append(datum, now) {
                if !self.flush(completed, false).await {
                    return false;
                }
            }

            if batch.is_full() {
                let completed = batch.take(now);
                if !self.flush(completed, false).await {
                    return false;
                }
            }
        }

        true
    }

    async fn flush(&mut self, datums: Vec<Datum>, forced: bool) -> bool {
        let len = datums.len();
        if self.batches.send(datums).await.is_err() {
            debug!(datums = len, "Completed-batch queue closed. Dropping batch.");
            return false;
        }

        trace!(datums = len, forced, "Flushed batch to completed-batch queue.");
        self.telemetry.track_batch_flushed(forced);
        true
    }
}
