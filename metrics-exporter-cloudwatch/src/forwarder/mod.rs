use std::time::Duration;

use tokio::sync::watch;

mod dispatch;
pub(crate) use self::dispatch::{publish_jitter, Dispatch};

mod ingest;
pub(crate) use self::ingest::Ingest;

/// Default force-flush interval, which is also the publish interval.
pub const DEFAULT_FORCE_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Default capacity of the measurement point channel.
pub const DEFAULT_POINT_BUFFER_SIZE: usize = 10_000;

/// Default capacity of the completed-batch queue.
pub const DEFAULT_BATCH_QUEUE_SIZE: usize = 50;

// How often the ingestion loop checks whether the in-progress batch is due for a force flush.
const FORCE_FLUSH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

// How long the dispatch loop idles between checks when there is nothing to publish.
const DISPATCH_IDLE_INTERVAL: Duration = Duration::from_secs(1);

/// Forwarder configuration.
#[derive(Clone, Debug)]
pub(crate) struct ForwarderConfiguration {
    pub max_datums_per_batch: usize,
    pub request_overhead: usize,
    pub force_flush_interval: Duration,
    pub batch_queue_size: usize,
}

/// Resolves once the given signal has been raised.
///
/// A signal whose sender was dropped without raising it never resolves.
async fn signalled(signal: &mut watch::Receiver<bool>) {
    if signal.wait_for(|raised| *raised).await.is_err() {
        std::future::pending::<()>().await;
    }
}
