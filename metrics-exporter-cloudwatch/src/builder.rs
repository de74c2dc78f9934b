use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    client::MetricsClient,
    convert::DatumBuilder,
    datum::{request_overhead, Datum},
    decoration::{MetricDecoration, MetricDecorations, UnsupportedUnit},
    dimensions::RollupRules,
    forwarder::{
        self, Dispatch, ForwarderConfiguration, Ingest, DEFAULT_BATCH_QUEUE_SIZE, DEFAULT_FORCE_FLUSH_INTERVAL,
        DEFAULT_POINT_BUFFER_SIZE,
    },
    point::MeasurementPoint,
    publisher::{
        Publisher, PublisherConfiguration, PublisherWorkers, DEFAULT_ADMISSION_QUEUE_SIZE, DEFAULT_ADMISSION_TIMEOUT,
        DEFAULT_WORKERS,
    },
    retry::{RetryPolicy, DEFAULT_BACKOFF_BASE, DEFAULT_MAX_ATTEMPTS},
    telemetry::Telemetry,
};

const DEFAULT_NAMESPACE: &str = "CWAgent";
const DEFAULT_MAX_DATUMS_PER_CALL: usize = 20;
const MAX_DATUMS_PER_CALL_LIMIT: usize = 1000;
const DEFAULT_MAX_VALUES_PER_DATUM: usize = 150;
const MAX_VALUES_PER_DATUM_LIMIT: usize = 150;

// Number of times, one second apart, that `close` checks for pending work before shutting down.
const CLOSE_DRAIN_POLLS: usize = 5;
const CLOSE_DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Errors that could occur while building the exporter.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A configuration option was set to an invalid value.
    #[error("invalid value for `{option}`: {reason}")]
    InvalidOption {
        /// Name of the option.
        option: &'static str,

        /// Details about why the value is invalid.
        reason: String,
    },

    /// A metric decoration specified a unit that the remote API does not support.
    #[error(transparent)]
    UnsupportedUnit(#[from] UnsupportedUnit),

    /// The exporter was built outside of a Tokio runtime.
    #[error("exporter must be built from within a Tokio runtime")]
    NoRuntime,
}

fn check_range(option: &'static str, value: usize, max: usize) -> Result<(), BuildError> {
    if (1..=max).contains(&value) {
        Ok(())
    } else {
        Err(BuildError::InvalidOption { option, reason: format!("must be between 1 and {max}, got {value}") })
    }
}

fn check_non_zero(option: &'static str, is_zero: bool) -> Result<(), BuildError> {
    if is_zero {
        Err(BuildError::InvalidOption { option, reason: "must be non-zero".to_owned() })
    } else {
        Ok(())
    }
}

/// Builder for a CloudWatch exporter.
pub struct CloudWatchBuilder {
    namespace: String,
    max_datums_per_call: usize,
    max_values_per_datum: usize,
    force_flush_interval: Duration,
    rollup_dimensions: Vec<Vec<String>>,
    decorations: Vec<MetricDecoration>,
    point_buffer_size: usize,
    batch_queue_size: usize,
    publish_workers: usize,
    admission_queue_size: usize,
    admission_timeout: Duration,
    retry_base: Duration,
    max_attempts: u32,
    telemetry: bool,
}

impl CloudWatchBuilder {
    /// Sets the namespace that every datum is published into.
    ///
    /// Defaults to `CWAgent`.
    #[must_use]
    pub fn with_namespace<N>(mut self, namespace: N) -> Self
    where
        N: Into<String>,
    {
        self.namespace = namespace.into();
        self
    }

    /// Sets the maximum number of datums sent in a single call to the remote API.
    ///
    /// Must be between 1 and 1,000.
    ///
    /// Defaults to 20.
    #[must_use]
    pub fn with_max_datums_per_call(mut self, max_datums_per_call: usize) -> Self {
        self.max_datums_per_call = max_datums_per_call;
        self
    }

    /// Sets the maximum number of value/count pairs carried by a single statistic set datum.
    ///
    /// Distributions holding more values than this are split over several datums, each reporting the statistics of the
    /// whole distribution.
    ///
    /// Must be between 1 and 150.
    ///
    /// Defaults to 150.
    #[must_use]
    pub fn with_max_values_per_datum(mut self, max_values_per_datum: usize) -> Self {
        self.max_values_per_datum = max_values_per_datum;
        self
    }

    /// Sets the force-flush interval.
    ///
    /// A batch that has not filled up is flushed once it has been open for this long. This is also the interval at
    /// which completed batches are handed to the publisher.
    ///
    /// Defaults to 60 seconds.
    #[must_use]
    pub fn with_force_flush_interval(mut self, interval: Duration) -> Self {
        self.force_flush_interval = interval;
        self
    }

    /// Sets the rollup dimension rules.
    ///
    /// Each rule is an ordered list of tag keys. For every point carrying all of a rule's keys, each field is published
    /// once more with only those keys as dimensions. Duplicate rules are ignored.
    ///
    /// Defaults to no rules.
    #[must_use]
    pub fn with_rollup_dimensions<I, R, K>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.rollup_dimensions =
            rules.into_iter().map(|rule| rule.into_iter().map(Into::into).collect()).collect();
        self
    }

    /// Adds a metric decoration, overriding the published name or unit of a single field.
    ///
    /// When several decorations target the same field, the last one added wins.
    #[must_use]
    pub fn add_decoration(mut self, decoration: MetricDecoration) -> Self {
        self.decorations.push(decoration);
        self
    }

    /// Sets the capacity of the measurement point channel.
    ///
    /// Defaults to 10,000.
    #[must_use]
    pub fn with_point_buffer_size(mut self, size: usize) -> Self {
        self.point_buffer_size = size;
        self
    }

    /// Sets the capacity of the completed-batch queue.
    ///
    /// When the queue fills up, queued batches are handed to the publisher immediately rather than waiting for the
    /// next publish interval.
    ///
    /// Defaults to 50.
    #[must_use]
    pub fn with_batch_queue_size(mut self, size: usize) -> Self {
        self.batch_queue_size = size;
        self
    }

    /// Sets the number of publish workers, which bounds the number of concurrent calls to the remote API.
    ///
    /// Defaults to 10.
    #[must_use]
    pub fn with_publish_workers(mut self, workers: usize) -> Self {
        self.publish_workers = workers;
        self
    }

    /// Sets the capacity of the publisher admission queue.
    ///
    /// Defaults to 10,000.
    #[must_use]
    pub fn with_admission_queue_size(mut self, size: usize) -> Self {
        self.admission_queue_size = size;
        self
    }

    /// Sets how long a batch waits for room in a full admission queue before it is dropped.
    ///
    /// Defaults to 2 seconds.
    #[must_use]
    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }

    /// Sets the base delay for exponential backoff between retries.
    ///
    /// Defaults to 200 milliseconds.
    #[must_use]
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Sets the maximum number of attempts made to publish a single batch before it is dropped.
    ///
    /// Defaults to 5.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets whether or not to enable telemetry for the exporter.
    ///
    /// When enabled, the exporter reports counters about its own operation, such as datums built, batches flushed, and
    /// batches published, retried or dropped, through the globally installed `metrics` recorder.
    ///
    /// Defaults to `true`.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: bool) -> Self {
        self.telemetry = telemetry;
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        if self.namespace.is_empty() {
            return Err(BuildError::InvalidOption { option: "namespace", reason: "must not be empty".to_owned() });
        }

        check_range("max_datums_per_call", self.max_datums_per_call, MAX_DATUMS_PER_CALL_LIMIT)?;
        check_range("max_values_per_datum", self.max_values_per_datum, MAX_VALUES_PER_DATUM_LIMIT)?;
        check_non_zero("force_flush_interval", self.force_flush_interval.is_zero())?;
        check_non_zero("point_buffer_size", self.point_buffer_size == 0)?;
        check_non_zero("batch_queue_size", self.batch_queue_size == 0)?;
        check_non_zero("publish_workers", self.publish_workers == 0)?;
        check_non_zero("admission_queue_size", self.admission_queue_size == 0)?;
        check_non_zero("max_attempts", self.max_attempts == 0)?;

        Ok(())
    }

    /// Builds the exporter.
    ///
    /// The ingestion loop, the dispatch loop and the publish workers are spawned onto the current Tokio runtime. Points
    /// sent through the returned sender are converted, batched and published using the given client.
    ///
    /// # Errors
    ///
    /// If any option holds an invalid value, if a decoration uses an unsupported unit, or if this is not called from
    /// within a Tokio runtime, an error will be returned.
    pub fn build<C>(self, client: C) -> Result<(mpsc::Sender<MeasurementPoint>, CloudWatchExporter), BuildError>
    where
        C: MetricsClient,
    {
        self.validate()?;
        let handle = Handle::try_current().map_err(|_| BuildError::NoRuntime)?;

        let decorations = MetricDecorations::new(self.decorations)?;
        let rollup_rules = RollupRules::new(self.rollup_dimensions);
        let builder = DatumBuilder::new(rollup_rules, decorations, self.max_values_per_datum);
        let telemetry = Telemetry::new(self.telemetry);

        info!(
            namespace = %self.namespace,
            max_datums_per_call = self.max_datums_per_call,
            max_values_per_datum = self.max_values_per_datum,
            force_flush_interval = ?self.force_flush_interval,
            publish_workers = self.publish_workers,
            "Starting CloudWatch exporter."
        );

        let namespace: Arc<str> = Arc::from(self.namespace);
        let (publisher, workers) = Publisher::spawn(
            &handle,
            PublisherConfiguration {
                namespace: Arc::clone(&namespace),
                workers: self.publish_workers,
                admission_queue_size: self.admission_queue_size,
                admission_timeout: self.admission_timeout,
            },
            Arc::new(client),
            Arc::new(RetryPolicy::new(self.retry_base, self.max_attempts)),
            telemetry.clone(),
        );

        let forwarder_config = ForwarderConfiguration {
            max_datums_per_batch: self.max_datums_per_call,
            request_overhead: request_overhead(&namespace),
            force_flush_interval: self.force_flush_interval,
            batch_queue_size: self.batch_queue_size,
        };

        let (points_tx, points_rx) = mpsc::channel(self.point_buffer_size);
        let (batches_tx, batches_rx) = mpsc::channel(self.batch_queue_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (drain_tx, drain_rx) = watch::channel(false);
        let (ingest_done_tx, ingest_done_rx) = watch::channel(false);

        let ingest = Ingest::new(
            forwarder_config.clone(),
            builder,
            points_rx,
            batches_tx.clone(),
            shutdown_rx.clone(),
            drain_rx,
            ingest_done_tx,
            telemetry,
        );
        let dispatch = Dispatch::new(
            forwarder_config.clone(),
            forwarder::publish_jitter(forwarder_config.force_flush_interval),
            batches_rx,
            publisher.clone(),
            shutdown_rx,
            ingest_done_rx.clone(),
        );

        let exporter = CloudWatchExporter {
            points: points_tx.downgrade(),
            batches: batches_tx,
            publisher,
            shutdown: shutdown_tx,
            drain: drain_tx,
            ingest_done: ingest_done_rx,
            ingest: handle.spawn(ingest.run()),
            dispatch: handle.spawn(dispatch.run()),
            workers,
        };

        Ok((points_tx, exporter))
    }
}

impl Default for CloudWatchBuilder {
    fn default() -> Self {
        CloudWatchBuilder {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            max_datums_per_call: DEFAULT_MAX_DATUMS_PER_CALL,
            max_values_per_datum: DEFAULT_MAX_VALUES_PER_DATUM,
            force_flush_interval: DEFAULT_FORCE_FLUSH_INTERVAL,
            rollup_dimensions: Vec::new(),
            decorations: Vec::new(),
            point_buffer_size: DEFAULT_POINT_BUFFER_SIZE,
            batch_queue_size: DEFAULT_BATCH_QUEUE_SIZE,
            publish_workers: DEFAULT_WORKERS,
            admission_queue_size: DEFAULT_ADMISSION_QUEUE_SIZE,
            admission_timeout: DEFAULT_ADMISSION_TIMEOUT,
            retry_base: DEFAULT_BACKOFF_BASE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            telemetry: true,
        }
    }
}

/// Depths of the exporter's internal queues.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pending {
    /// Points waiting in the measurement channel.
    ///
    /// Always zero once every point sender has been dropped.
    pub points: usize,

    /// Completed batches waiting to be handed to the publisher.
    pub batches: usize,

    /// Batches admitted to the publisher but not yet picked up by a worker.
    pub tasks: usize,
}

/// Handle to a running CloudWatch exporter.
///
/// Dropping the handle leaves the exporter running in the background until every point sender has been dropped. Use
/// [`close`][Self::close] or [`shutdown`][Self::shutdown] to stop it explicitly.
pub struct CloudWatchExporter {
    points: mpsc::WeakSender<MeasurementPoint>,
    batches: mpsc::Sender<Vec<Datum>>,
    publisher: Publisher,
    shutdown: watch::Sender<bool>,
    drain: watch::Sender<bool>,
    ingest_done: watch::Receiver<bool>,
    ingest: JoinHandle<()>,
    dispatch: JoinHandle<()>,
    workers: PublisherWorkers,
}

impl CloudWatchExporter {
    /// Returns the current depths of the exporter's internal queues.
    pub fn pending(&self) -> Pending {
        let points = self.points.upgrade().map_or(0, |tx| tx.max_capacity() - tx.capacity());
        let batches = self.batches.max_capacity() - self.batches.capacity();

        Pending { points, batches, tasks: self.publisher.queued() }
    }

    fn has_pending_work(&self) -> bool {
        let pending = self.pending();
        pending.points > 0 || pending.batches > 0 || !*self.ingest_done.borrow()
    }

    /// Closes the exporter gracefully.
    ///
    /// The measurement channel stops accepting points, even while senders are still alive. Points already in it are
    /// converted, the in-progress batch is flushed, and every completed batch is handed to the publisher without
    /// waiting for the next publish interval. This is given a bounded amount of time, after which the ingestion and
    /// dispatch loops are stopped. Finally, waits for the publish workers to finish every batch they were given, retries
    /// included.
    pub async fn close(self) {
        self.drain.send_replace(true);

        for _ in 0..CLOSE_DRAIN_POLLS {
            if !self.has_pending_work() {
                break;
            }
            tokio::time::sleep(CLOSE_DRAIN_POLL_INTERVAL).await;
        }

        let pending = self.pending();
        if pending.points > 0 || pending.batches > 0 {
            warn!(points = pending.points, batches = pending.batches, "Closing exporter with work still pending.");
        }

        self.shutdown().await;
    }

    /// Shuts the exporter down without waiting for queued points or batches.
    ///
    /// Anything still in the measurement channel or the completed-batch queue is discarded. Batches already admitted to
    /// the publisher are still published.
    pub async fn shutdown(self) {
        let CloudWatchExporter { batches, publisher, shutdown, ingest, dispatch, workers, .. } = self;

        shutdown.send_replace(true);
        for (name, handle) in [("ingestion", ingest), ("dispatch", dispatch)] {
            if let Err(e) = handle.await {
                error!(error = %e, "CloudWatch exporter {name} loop terminated abnormally.");
            }
        }

        drop(batches);
        drop(publisher);
        workers.join().await;
        debug!("CloudWatch exporter shut down.");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{decoration::MetricDecoration, test_util::ScriptedClient};

    use super::{BuildError, CloudWatchBuilder, Pending};

    #[test]
    fn build_requires_runtime() {
        let result = CloudWatchBuilder::default().build(ScriptedClient::default());
        assert!(matches!(result, Err(BuildError::NoRuntime)));
    }

    #[tokio::test]
    async fn invalid_options_are_rejected() {
        let cases = [
            (CloudWatchBuilder::default().with_namespace(""), "namespace"),
            (CloudWatchBuilder::default().with_max_datums_per_call(0), "max_datums_per_call"),
            (CloudWatchBuilder::default().with_max_datums_per_call(1001), "max_datums_per_call"),
            (CloudWatchBuilder::default().with_max_values_per_datum(151), "max_values_per_datum"),
            (CloudWatchBuilder::default().with_force_flush_interval(Duration::ZERO), "force_flush_interval"),
            (CloudWatchBuilder::default().with_publish_workers(0), "publish_workers"),
            (CloudWatchBuilder::default().with_batch_queue_size(0), "batch_queue_size"),
            (CloudWatchBuilder::default().with_max_attempts(0), "max_attempts"),
        ];

        for (builder, expected) in cases {
            match builder.build(ScriptedClient::default()) {
                Err(BuildError::InvalidOption { option, .. }) => assert_eq!(option, expected),
                Err(e) => panic!("unexpected error for {expected}: {e}"),
                Ok(_) => panic!("expected {expected} to be rejected"),
            }
        }
    }

    #[tokio::test]
    async fn unsupported_decoration_unit_is_rejected() {
        let result = CloudWatchBuilder::default()
            .add_decoration(MetricDecoration::new("mem", "used").with_unit("Furlongs"))
            .build(ScriptedClient::default());

        assert!(matches!(result, Err(BuildError::UnsupportedUnit(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_and_shutdown() {
        let (points, exporter) = CloudWatchBuilder::default()
            .with_telemetry(false)
            .build(ScriptedClient::default())
            .unwrap();

        assert_eq!(exporter.pending(), Pending::default());
        exporter.shutdown().await;
        assert!(points.is_closed());
    }
}
