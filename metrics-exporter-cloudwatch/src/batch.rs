use std::{
    mem,
    time::{Duration, Instant},
};

use crate::datum::Datum;

/// Estimated request size at which a batch is considered full.
///
/// This leaves headroom below the true transport limit for estimation error, assuming roughly a 5:1 compression ratio.
pub const PAYLOAD_CEILING: usize = 200_000;

/// Accumulates datums into a batch bounded by datum count and estimated request size.
///
/// A batch is never allowed to reach the payload ceiling or to hold more than the configured number of datums: when the
/// next datum would break either bound, the current contents are handed back to the caller as a completed batch before
/// the datum is added to the (now empty) batch.
pub struct DatumBatch {
    max_datums: usize,
    request_overhead: usize,
    datums: Vec<Datum>,
    size: usize,
    started: Instant,
}

impl DatumBatch {
    /// Creates a new, empty `DatumBatch`.
    ///
    /// `request_overhead` is the estimated size of a request carrying no datums, which seeds the size estimate.
    ///
    /// # Panics
    ///
    /// Panics if `max_datums` is zero.
    pub fn new(max_datums: usize, request_overhead: usize, now: Instant) -> Self {
        assert!(max_datums > 0, "maximum datums per batch must be non-zero");

        Self {
            max_datums,
            request_overhead,
            datums: Vec::with_capacity(max_datums),
            size: request_overhead,
            started: now,
        }
    }

    /// Returns the number of datums in the batch.
    pub fn len(&self) -> usize {
        self.datums.len()
    }

    /// Returns `true` if the batch holds no datums.
    pub fn is_empty(&self) -> bool {
        self.datums.is_empty()
    }

    /// Returns the estimated request size of the batch, in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    fn would_overflow(&self, datum_size: usize) -> bool {
        self.datums.len() >= self.max_datums || self.size + datum_size >= PAYLOAD_CEILING
    }

    /// Appends a datum to the batch.
    ///
    /// If the datum does not fit, the current contents are returned as a completed batch and the datum starts a fresh
    /// one. A datum too large to fit even in an empty batch is still accepted, and [`is_full`][Self::is_full] will
    /// report `true` immediately after.
    pub fn append(&mut self, datum: Datum, now: Instant) -> Option<Vec<Datum>> {
        let datum_size = datum.estimated_size();

        let completed = if !self.is_empty() && self.would_overflow(datum_size) {
            Some(self.take(now))
        } else {
            None
        };

        self.datums.push(datum);
        self.size += datum_size;

        completed
    }

    /// Returns `true` if the batch has reached either of its bounds.
    pub fn is_full(&self) -> bool {
        self.datums.len() >= self.max_datums || self.size >= PAYLOAD_CEILING
    }

    /// Returns `true` if the batch holds datums and has been open for at least `interval`.
    pub fn should_force_flush(&self, now: Instant, interval: Duration) -> bool {
        !self.is_empty() && now.saturating_duration_since(self.started) >= interval
    }

    /// Resets the batch to an empty state, discarding any datums it held.
    pub fn clear(&mut self, now: Instant) {
        self.datums = Vec::with_capacity(self.max_datums);
        self.size = self.request_overhead;
        self.started = now;
    }

    /// Takes the datums out of the batch, leaving it empty.
    pub fn take(&mut self, now: Instant) -> Vec<Datum> {
        let datums = mem::replace(&mut self.datums, Vec::with_capacity(self.max_datums));
        self.clear(now);
        datums
    }
}
