use metrics::{counter, Counter};

/// Exporter telemetry.
///
/// `Telemetry` collects information about the exporter's behavior -- datums built, batches flushed, tasks published,
/// retried, or dropped -- and reports it through whichever `metrics` recorder the host application has installed. When
/// telemetry is disabled, or no recorder is installed, every update is a no-op.
#[derive(Clone)]
pub struct Telemetry {
    datums_built: Counter,
    batches_flushed: Counter,
    batches_force_flushed: Counter,
    tasks_published: Counter,
    tasks_dropped_overflow: Counter,
    tasks_dropped_exhausted: Counter,
    put_retries: Counter,
}

impl Telemetry {
    /// Creates a `Telemetry` instance.
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self::noop();
        }

        Self {
            datums_built: counter!("cloudwatch.exporter.datums_built"),
            batches_flushed: counter!("cloudwatch.exporter.batches_flushed", "reason" => "full"),
            batches_force_flushed: counter!("cloudwatch.exporter.batches_flushed", "reason" => "interval"),
            tasks_published: counter!("cloudwatch.exporter.tasks_published"),
            tasks_dropped_overflow: counter!("cloudwatch.exporter.tasks_dropped", "reason" => "overflow"),
            tasks_dropped_exhausted: counter!("cloudwatch.exporter.tasks_dropped", "reason" => "retries_exhausted"),
            put_retries: counter!("cloudwatch.exporter.put_retries"),
        }
    }

    /// Creates a `Telemetry` instance that discards every update.
    pub fn noop() -> Self {
        Self {
            datums_built: Counter::noop(),
            batches_flushed: Counter::noop(),
            batches_force_flushed: Counter::noop(),
            tasks_published: Counter::noop(),
            tasks_dropped_overflow: Counter::noop(),
            tasks_dropped_exhausted: Counter::noop(),
            put_retries: Counter::noop(),
        }
    }

    /// Tracks datums built from a single measurement point.
    pub fn track_datums_built(&self, count: usize) {
        self.datums_built.increment(count as u64);
    }

    /// Tracks a batch pushed onto the completed-batch queue, either because it filled up or because it was forced.
    pub fn track_batch_flushed(&self, forced: bool) {
        if forced {
            self.batches_force_flushed.increment(1);
        } else {
            self.batches_flushed.increment(1);
        }
    }

    pub fn track_task_published(&self) {
        self.tasks_published.increment(1);
    }

    pub fn track_task_dropped_overflow(&self) {
        self.tasks_dropped_overflow.increment(1);
    }

    pub fn track_task_dropped_exhausted(&self) {
        self.tasks_dropped_exhausted.increment(1);
    }

    /// Tracks a put that is about to be retried after backing off.
    pub fn track_put_retry(&self) {
        self.put_retries.increment(1);
    }
}
