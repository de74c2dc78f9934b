use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use tracing::{error, warn};

use crate::{
    client::{ErrorCode, MetricsClient, PutError},
    datum::Datum,
    telemetry::Telemetry,
};

/// Default base delay for exponential backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(200);

/// Default number of attempts made for a single batch before it is dropped.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

// Retry counts above this use the fallback delay instead of growing the exponential delay any further.
const MAX_BACKOFF_EXPONENT: u32 = 5;
const FALLBACK_BACKOFF: Duration = Duration::from_secs(60);

/// Class of a failed put.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Throttling or an internal service fault.
    Transient,

    /// Any other failure, including failures that carried no error code at all.
    Unclassified,
}

impl ErrorClass {
    /// Classifies the given error.
    pub fn of(error: &PutError) -> Self {
        match error.code() {
            Some(ErrorCode::Throttled | ErrorCode::InternalServiceFault) => ErrorClass::Transient,
            Some(ErrorCode::Other(_)) | None => ErrorClass::Unclassified,
        }
    }
}

/// Retry policy for putting batches.
///
/// Every failed attempt is retried, whatever its class, until the attempt budget for the batch is spent. Before each
/// retry, the policy sleeps for an exponentially growing delay driven by a retry counter that is shared by every
/// worker: when many batches fail at the same time, backoff escalates for all of them. Any successful put resets the
/// shared counter.
#[derive(Debug)]
pub struct RetryPolicy {
    base: Duration,
    max_attempts: u32,
    retries: AtomicU32,
}

impl RetryPolicy {
    /// Creates a new `RetryPolicy`.
    ///
    /// # Panics
    ///
    /// Panics if `max_attempts` is zero.
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        assert!(max_attempts > 0, "maximum attempts must be non-zero");

        Self { base, max_attempts, retries: AtomicU32::new(0) }
    }

    /// Returns the backoff delay used when the shared retry counter is at `retries`.
    ///
    /// The delay is `base * 2^retries` up to the maximum exponent, and a fixed one minute delay beyond it. A product
    /// too large to represent also falls back to one minute.
    pub fn backoff_delay(&self, retries: u32) -> Duration {
        if retries > MAX_BACKOFF_EXPONENT {
            return FALLBACK_BACKOFF;
        }

        self.base.checked_mul(2u32.pow(retries)).unwrap_or(FALLBACK_BACKOFF)
    }

    fn next_backoff(&self) -> (u32, Duration) {
        let retries = self
            .retries
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| Some(r.saturating_add(1)))
            .unwrap_or_else(|r| r);
        (retries, self.backoff_delay(retries))
    }

    /// Puts the given datums, retrying with backoff on failure.
    ///
    /// Returns the number of attempts made on success.
    ///
    /// # Errors
    ///
    /// If every attempt failed, the error from the last attempt is returned.
    pub async fn put(
        &self,
        client: &dyn MetricsClient,
        namespace: &str,
        datums: &[Datum],
        telemetry: &Telemetry,
    ) -> Result<u32, PutError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let error = match client.put_batch(namespace, datums).await {
                Ok(()) => {
                    self.retries.store(0, Ordering::Release);
                    return Ok(attempt);
                }
                Err(e) => e,
            };

            match ErrorClass::of(&error) {
                ErrorClass::Transient => warn!(%error, attempt, "Put failed with a transient error."),
                ErrorClass::Unclassified => error!(%error, attempt, "Put failed with an unclassified error."),
            }

            // Every failure counts towards the shared counter, including the last attempt of a batch.
            let (retries, delay) = self.next_backoff();
            if attempt >= self.max_attempts {
                return Err(error);
            }

            warn!(retries, ?delay, "Backing off before retrying put.");
            telemetry.track_put_retry();
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(DEFAULT_BACKOFF_BASE, DEFAULT_MAX_ATTEMPTS)
    }
}
