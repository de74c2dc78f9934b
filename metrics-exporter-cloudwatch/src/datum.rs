use std::{sync::Arc, time::SystemTime};

use crate::{dimensions::DimensionSet, distribution::DistributionChunk};

// Size estimates are derived from the query-string encoding of a `PutMetricData` request, using the widest member
// indexes and typical value widths so that the estimate errs on the large side.
const REQUEST_ENVELOPE_SIZE: usize = "Action=PutMetricData&Version=2010-08-01".len();
const NAMESPACE_OVERHEAD: usize = "&Namespace=".len();
const METRIC_NAME_OVERHEAD: usize = "&MetricData.member.100.MetricName=".len();
const DIMENSION_OVERHEAD: usize = "&MetricData.member.100.Dimensions.member.10.Name=\
     &MetricData.member.100.Dimensions.member.10.Value="
    .len();
const TIMESTAMP_SIZE: usize = "&MetricData.member.100.Timestamp=2018-05-29T21%3A14%3A00Z".len();
const VALUE_SIZE: usize = "&MetricData.member.100.Value=1558.3086995967291".len();
const VALUE_COUNT_PAIR_SIZE: usize = "&MetricData.member.100.Values.member.150=1558.3086995967291\
     &MetricData.member.100.Counts.member.150=1000"
    .len();
const STATISTICS_SIZE: usize = "&MetricData.member.100.StatisticValues.Maximum=1558.3086995967291\
     &MetricData.member.100.StatisticValues.Minimum=1558.3086995967291\
     &MetricData.member.100.StatisticValues.SampleCount=1000\
     &MetricData.member.100.StatisticValues.Sum=1558.3086995967291"
    .len();
const UNIT_SIZE: usize = "&MetricData.member.100.Unit=Kilobytes%2FSecond".len();
const HIGH_RESOLUTION_SIZE: usize = "&MetricData.member.100.StorageResolution=1".len();

/// Returns the estimated size, in bytes, of a request carrying no datums for the given namespace.
pub fn request_overhead(namespace: &str) -> usize {
    REQUEST_ENVELOPE_SIZE + NAMESPACE_OVERHEAD + namespace.len()
}

/// A statistic set payload: a bounded list of values and their counts, plus population statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct StatisticSet {
    /// Sample values.
    pub values: Vec<f64>,

    /// Number of samples observed for each entry in `values`.
    pub counts: Vec<f64>,

    /// Smallest sample in the population.
    pub minimum: f64,

    /// Largest sample in the population.
    pub maximum: f64,

    /// Sum of all samples in the population.
    pub sum: f64,

    /// Number of samples in the population.
    pub sample_count: f64,
}

impl From<DistributionChunk<'_>> for StatisticSet {
    fn from(chunk: DistributionChunk<'_>) -> Self {
        Self {
            values: chunk.values().to_vec(),
            counts: chunk.counts().to_vec(),
            minimum: chunk.minimum(),
            maximum: chunk.maximum(),
            sum: chunk.sum(),
            sample_count: chunk.sample_count(),
        }
    }
}

/// Value carried by a [`Datum`].
#[derive(Clone, Debug, PartialEq)]
pub enum DatumPayload {
    /// A single scalar value.
    Value(f64),

    /// A statistic set.
    StatisticSet(StatisticSet),
}

/// A single data point, as submitted to the remote ingestion API.
///
/// Datums are immutable once built. The metric name, dimensions and unit are reference counted, as a single point
/// fans out into many datums that share them.
#[derive(Clone, Debug, PartialEq)]
pub struct Datum {
    metric_name: Arc<str>,
    dimensions: DimensionSet,
    timestamp: SystemTime,
    unit: Option<Arc<str>>,
    high_resolution: bool,
    payload: DatumPayload,
}

impl Datum {
    pub(crate) fn new(
        metric_name: Arc<str>,
        dimensions: DimensionSet,
        timestamp: SystemTime,
        unit: Option<Arc<str>>,
        high_resolution: bool,
        payload: DatumPayload,
    ) -> Self {
        Self { metric_name, dimensions, timestamp, unit, high_resolution, payload }
    }

    /// Returns the metric name.
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// Returns the dimensions, in emission order.
    pub fn dimensions(&self) -> &DimensionSet {
        &self.dimensions
    }

    /// Returns the timestamp.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Returns the unit, if any.
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// Returns `true` if the datum should be stored at 1-second resolution.
    pub fn is_high_resolution(&self) -> bool {
        self.high_resolution
    }

    /// Returns the payload.
    pub fn payload(&self) -> &DatumPayload {
        &self.payload
    }

    /// Returns the estimated size, in bytes, that this datum adds to a request.
    pub fn estimated_size(&self) -> usize {
        let dimensions_size = self
            .dimensions
            .iter()
            .map(|dim| DIMENSION_OVERHEAD + dim.name().len() + dim.value().len())
            .sum::<usize>();

        let payload_size = match &self.payload {
            DatumPayload::Value(_) => VALUE_SIZE,
            DatumPayload::StatisticSet(set) => set.values.len() * VALUE_COUNT_PAIR_SIZE + STATISTICS_SIZE,
        };

        let unit_size = if self.unit.is_some() { UNIT_SIZE } else { 0 };
        let resolution_size = if self.high_resolution { HIGH_RESOLUTION_SIZE } else { 0 };

        METRIC_NAME_OVERHEAD
            + self.metric_name.len()
            + dimensions_size
            + TIMESTAMP_SIZE
            + payload_size
            + unit_size
            + resolution_size
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use crate::{
        dimensions::{Dimension, DimensionSet},
        distribution::Distribution,
    };

    use super::*;

    fn datum(dimensions: DimensionSet, payload: DatumPayload, unit: bool, high_res: bool) -> Datum {
        Datum::new(
            Arc::from("cpu_usage_idle"),
            dimensions,
            SystemTime::UNIX_EPOCH,
            unit.then(|| Arc::from("Percent")),
            high_res,
            payload,
        )
    }

    #[test]
    fn request_overhead_includes_namespace() {
        assert_eq!(request_overhead(""), 50);
        assert_eq!(request_overhead("CWAgent"), 57);
    }

    #[test]
    fn scalar_size() {
        let bare = datum(DimensionSet::from(Vec::new()), DatumPayload::Value(1.0), false, false);
        assert_eq!(
            bare.estimated_size(),
            METRIC_NAME_OVERHEAD + "cpu_usage_idle".len() + TIMESTAMP_SIZE + VALUE_SIZE
        );

        let dims = DimensionSet::from(vec![Dimension::new("host", "h1")]);
        let decorated = datum(dims, DatumPayload::Value(1.0), true, true);
        assert_eq!(
            decorated.estimated_size(),
            bare.estimated_size() + DIMENSION_OVERHEAD + 6 + UNIT_SIZE + HIGH_RESOLUTION_SIZE
        );
    }

    #[test]
    fn statistic_set_size_scales_with_values() {
        let dist = Distribution::from_entries("", (0..10).map(|i| (f64::from(i), 1.0)));
        let set = StatisticSet::from(dist.split(150).next().unwrap());
        assert_eq!(set.values.len(), 10);
        assert_eq!(set.sample_count, 10.0);

        let d = datum(DimensionSet::from(Vec::new()), DatumPayload::StatisticSet(set), false, false);
        assert_eq!(
            d.estimated_size(),
            METRIC_NAME_OVERHEAD
                + "cpu_usage_idle".len()
                + TIMESTAMP_SIZE
                + 10 * VALUE_COUNT_PAIR_SIZE
                + STATISTICS_SIZE
        );
    }
}
