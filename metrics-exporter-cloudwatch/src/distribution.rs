use std::{iter::Zip, slice::Chunks};

/// A pre-aggregated statistical summary of a population of sample values.
///
/// A distribution is a sequence of `(value, count)` entries, along with the aggregate statistics -- sample count, sum,
/// minimum, and maximum -- of the whole population. The number of entries is the "size" of the distribution, and a size
/// of zero means the distribution holds no data at all.
#[derive(Clone, Debug, PartialEq)]
pub struct Distribution {
    unit: String,
    values: Vec<f64>,
    counts: Vec<f64>,
    sample_count: f64,
    sum: f64,
    minimum: f64,
    maximum: f64,
}

impl Distribution {
    /// Creates an empty `Distribution` with the given unit.
    ///
    /// The unit may be empty, in which case the distribution is considered to have no unit.
    pub fn new<U>(unit: U) -> Self
    where
        U: Into<String>,
    {
        Self {
            unit: unit.into(),
            values: Vec::new(),
            counts: Vec::new(),
            sample_count: 0.0,
            sum: 0.0,
            minimum: f64::MAX,
            maximum: f64::MIN,
        }
    }

    /// Creates a `Distribution` from the given `(value, count)` entries.
    pub fn from_entries<U, I>(unit: U, entries: I) -> Self
    where
        U: Into<String>,
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut dist = Self::new(unit);
        for (value, count) in entries {
            dist.add_entry(value, count);
        }
        dist
    }

    /// Adds an entry of `count` samples that all had the given `value`.
    ///
    /// Entries with a non-positive count are ignored.
    pub fn add_entry(&mut self, value: f64, count: f64) {
        if count <= 0.0 {
            return;
        }

        self.values.push(value);
        self.counts.push(count);
        self.sample_count += count;
        self.sum += value * count;
        self.minimum = self.minimum.min(value);
        self.maximum = self.maximum.max(value);
    }

    /// Returns the unit of the distribution, if any.
    pub fn unit(&self) -> Option<&str> {
        if self.unit.is_empty() {
            None
        } else {
            Some(&self.unit)
        }
    }

    /// Returns the number of `(value, count)` entries in the distribution.
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the distribution holds no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the total number of samples represented by the distribution.
    pub fn sample_count(&self) -> f64 {
        self.sample_count
    }

    /// Returns the sum of all samples represented by the distribution.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Returns the smallest sample value.
    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    /// Returns the largest sample value.
    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    /// Returns the entry values, in insertion order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Returns the entry counts, in insertion order.
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Splits the distribution into chunks holding at most `max_values` entries each.
    ///
    /// Chunking is lazy and borrows from the distribution. Every chunk reports the aggregate statistics of the _whole_
    /// distribution, as a statistic set describes the population being sampled rather than the subset of entries that
    /// happen to be carried alongside it.
    ///
    /// An empty distribution yields no chunks, and a distribution with at most `max_values` entries yields exactly one
    /// chunk covering every entry.
    ///
    /// # Panics
    ///
    /// Panics if `max_values` is zero.
    pub fn split(&self, max_values: usize) -> Split<'_> {
        assert!(max_values > 0, "maximum values per chunk must be non-zero");

        Split {
            dist: self,
            inner: self.values.chunks(max_values).zip(self.counts.chunks(max_values)),
        }
    }
}

/// Lazy iterator over the chunks of a [`Distribution`].
///
/// Created by [`Distribution::split`].
pub struct Split<'a> {
    dist: &'a Distribution,
    inner: Zip<Chunks<'a, f64>, Chunks<'a, f64>>,
}

impl<'a> Iterator for Split<'a> {
    type Item = DistributionChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(values, counts)| DistributionChunk { dist: self.dist, values, counts })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Split<'_> {}

/// A bounded subset of the entries of a [`Distribution`].
#[derive(Clone, Copy, Debug)]
pub struct DistributionChunk<'a> {
    dist: &'a Distribution,
    values: &'a [f64],
    counts: &'a [f64],
}

impl<'a> DistributionChunk<'a> {
    /// Returns the entry values held by this chunk.
    pub fn values(&self) -> &'a [f64] {
        self.values
    }

    /// Returns the entry counts held by this chunk.
    pub fn counts(&self) -> &'a [f64] {
        self.counts
    }

    /// Returns the number of entries held by this chunk.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if this chunk holds no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the sample count of the originating distribution.
    pub fn sample_count(&self) -> f64 {
        self.dist.sample_count
    }

    /// Returns the sum of the originating distribution.
    pub fn sum(&self) -> f64 {
        self.dist.sum
    }

    /// Returns the minimum of the originating distribution.
    pub fn minimum(&self) -> f64 {
        self.dist.minimum
    }

    /// Returns the maximum of the originating distribution.
    pub fn maximum(&self) -> f64 {
        self.dist.maximum
    }
}

#[cfg(test)]
mod tests {
    use proptest::{collection::vec as arb_vec, prelude::*};

    use super::Distribution;

    fn sequential(size: usize) -> Distribution {
        Distribution::from_entries("Milliseconds", (0..size).map(|i| (i as f64, (i % 7 + 1) as f64)))
    }

    #[test]
    fn empty_distribution_yields_no_chunks() {
        let dist = Distribution::new("Count");
        assert_eq!(dist.size(), 0);
        assert_eq!(dist.split(150).count(), 0);
    }

    #[test]
    fn small_distribution_yields_itself() {
        let dist = sequential(150);
        let chunks = dist.split(150).collect::<Vec<_>>();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].values(), dist.values());
        assert_eq!(chunks[0].counts(), dist.counts());
    }

    #[test]
    fn oversized_distribution_keeps_aggregates() {
        let dist = sequential(300);
        let chunks = dist.split(150).collect::<Vec<_>>();

        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert_eq!(chunk.len(), 150);
            assert_eq!(chunk.minimum(), 0.0);
            assert_eq!(chunk.maximum(), 299.0);
            assert_eq!(chunk.sum(), dist.sum());
            assert_eq!(chunk.sample_count(), dist.sample_count());
        }
    }

    #[test]
    fn non_positive_counts_are_ignored() {
        let mut dist = Distribution::new("");
        dist.add_entry(1.0, 0.0);
        dist.add_entry(2.0, -3.0);
        assert!(dist.is_empty());
        assert_eq!(dist.unit(), None);

        dist.add_entry(4.0, 2.0);
        assert_eq!(dist.size(), 1);
        assert_eq!(dist.sum(), 8.0);
        assert_eq!(dist.sample_count(), 2.0);
    }

    proptest! {
        #[test]
        fn split_preserves_entries(
            entries in arb_vec((-1.0e6f64..1.0e6, 1.0f64..1000.0), 0..600),
            max_values in 1usize..200,
        ) {
            let dist = Distribution::from_entries("Bytes", entries);

            let mut values = Vec::new();
            let mut counts = Vec::new();
            let mut chunk_count = 0;
            for chunk in dist.split(max_values) {
                prop_assert!(!chunk.is_empty());
                prop_assert!(chunk.len() <= max_values);
                prop_assert_eq!(chunk.sum(), dist.sum());
                prop_assert_eq!(chunk.sample_count(), dist.sample_count());

                values.extend_from_slice(chunk.values());
                counts.extend_from_slice(chunk.counts());
                chunk_count += 1;
            }

            prop_assert_eq!(chunk_count, dist.size().div_ceil(max_values));
            prop_assert_eq!(&values[..], dist.values());
            prop_assert_eq!(&counts[..], dist.counts());
        }
    }
}
