use std::{sync::Arc, time::SystemTime};

use crate::{
    datum::{Datum, DatumPayload, StatisticSet},
    decoration::MetricDecorations,
    dimensions::{build_dimensions, RollupRules},
    distribution::Distribution,
    point::{FieldValue, MeasurementPoint},
};

/// Tag requesting that every datum built from a point is stored at 1-second resolution.
///
/// The tag is consumed, rather than published as a dimension, only when its value is `true` (case-insensitive).
pub const HIGH_RESOLUTION_TAG_KEY: &str = "aws:StorageResolution";

// Field named `value` is published under the bare point name.
const VALUE_FIELD: &str = "value";

#[cfg(windows)]
const NAME_SEPARATOR: &str = " ";
#[cfg(not(windows))]
const NAME_SEPARATOR: &str = "_";

#[derive(Clone, Copy)]
enum PublishedValue<'a> {
    Scalar(f64),
    Distribution(&'a Distribution),
}

/// Converts measurement points into datums.
#[derive(Debug)]
pub struct DatumBuilder {
    rollup_rules: RollupRules,
    decorations: MetricDecorations,
    max_values_per_datum: usize,
}

impl DatumBuilder {
    /// Creates a new `DatumBuilder`.
    ///
    /// # Panics
    ///
    /// Panics if `max_values_per_datum` is zero.
    pub fn new(
        rollup_rules: RollupRules,
        decorations: MetricDecorations,
        max_values_per_datum: usize,
    ) -> Self {
        assert!(max_values_per_datum > 0, "maximum values per datum must be non-zero");

        Self { rollup_rules, decorations, max_values_per_datum }
    }

    fn metric_name(&self, category: &str, field: &str) -> Arc<str> {
        match self.decorations.rename(category, field) {
            Some(rename) => Arc::from(rename),
            None if field == VALUE_FIELD => Arc::from(category),
            None => Arc::from(format!("{category}{NAME_SEPARATOR}{field}")),
        }
    }

    /// Builds every datum for the given point.
    ///
    /// Each publishable field is emitted once for every dimension set derived from the point's tags and, for
    /// distributions, once more for every chunk of the split distribution. Output is ordered by field, then dimension
    /// set, then chunk. Fields that cannot be published, and empty distributions, are skipped.
    pub fn build(&self, point: &MeasurementPoint) -> Vec<Datum> {
        let high_resolution = point
            .tags()
            .get(HIGH_RESOLUTION_TAG_KEY)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));

        let raw = build_dimensions(
            point
                .tags()
                .iter()
                .filter(|(key, _)| !(high_resolution && *key == HIGH_RESOLUTION_TAG_KEY))
                .map(|(key, value)| (key.as_str(), value.as_str())),
        );
        let dimension_sets = self.rollup_rules.expand(raw);

        let mut datums = Vec::new();
        for (field, value) in point.fields() {
            let field_value = match value {
                FieldValue::Integer(v) => PublishedValue::Scalar(*v as f64),
                FieldValue::Unsigned(v) => PublishedValue::Scalar(*v as f64),
                FieldValue::Float(v) => PublishedValue::Scalar(*v),
                FieldValue::Boolean(v) => PublishedValue::Scalar(f64::from(u8::from(*v))),
                FieldValue::Timestamp(ts) => PublishedValue::Scalar(unix_seconds(*ts)),
                FieldValue::Distribution(dist) if dist.is_empty() => continue,
                FieldValue::Distribution(dist) => PublishedValue::Distribution(dist),
                FieldValue::String(_) => continue,
            };

            let metric_name = self.metric_name(point.name(), field);
            let unit: Option<Arc<str>> = match self.decorations.unit(point.name(), field) {
                Some(unit) => Some(unit),
                None => match field_value {
                    PublishedValue::Distribution(dist) => dist.unit(),
                    PublishedValue::Scalar(_) => None,
                },
            }
            .map(Arc::from);

            for dimensions in &dimension_sets {
                let new_datum = |payload| {
                    Datum::new(
                        Arc::clone(&metric_name),
                        Arc::clone(dimensions),
                        point.timestamp(),
                        unit.clone(),
                        high_resolution,
                        payload,
                    )
                };

                match field_value {
                    PublishedValue::Scalar(value) => datums.push(new_datum(DatumPayload::Value(value))),
                    PublishedValue::Distribution(dist) => datums.extend(
                        dist.split(self.max_values_per_datum)
                            .map(|chunk| new_datum(DatumPayload::StatisticSet(StatisticSet::from(chunk)))),
                    ),
                }
            }
        }

        datums
    }
}

fn unix_seconds(ts: SystemTime) -> f64 {
    match ts.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(since) => since.as_secs() as f64,
        Err(e) => -(e.duration().as_secs() as f64),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use crate::{
        datum::DatumPayload,
        decoration::{MetricDecoration, MetricDecorations},
        dimensions::{Dimension, RollupRules},
        distribution::Distribution,
        point::MeasurementPoint,
    };

    use super::{DatumBuilder, HIGH_RESOLUTION_TAG_KEY, NAME_SEPARATOR};

    fn builder(rules: &[&[&str]], decorations: Vec<MetricDecoration>) -> DatumBuilder {
        let rules = rules.iter().map(|rule| rule.iter().map(|k| (*k).to_owned()).collect());
        DatumBuilder::new(RollupRules::new(rules), MetricDecorations::new(decorations).unwrap(), 150)
    }

    fn dims(pairs: &[(&str, &str)]) -> Vec<Dimension> {
        pairs.iter().map(|(k, v)| Dimension::new(*k, *v)).collect()
    }

    fn ts() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[test]
    fn scalar_with_rollup() {
        let point = MeasurementPoint::new("cpu", ts())
            .with_tag("host", "h1")
            .with_tag("az", "us-east-1a")
            .with_field("usage_idle", 42.5);

        let datums = builder(&[&["az"]], vec![]).build(&point);
        assert_eq!(datums.len(), 2);

        let expected_name = format!("cpu{NAME_SEPARATOR}usage_idle");
        assert_eq!(datums[0].dimensions().to_vec(), dims(&[("host", "h1"), ("az", "us-east-1a")]));
        assert_eq!(datums[1].dimensions().to_vec(), dims(&[("az", "us-east-1a")]));
        for datum in &datums {
            assert_eq!(datum.metric_name(), expected_name);
            assert_eq!(datum.payload(), &DatumPayload::Value(42.5));
            assert_eq!(datum.timestamp(), ts());
            assert_eq!(datum.unit(), None);
            assert!(!datum.is_high_resolution());
        }
    }

    #[test]
    fn oversized_distribution_fans_out() {
        let dist = Distribution::from_entries("Milliseconds", (0..300).map(|i| (f64::from(i), 2.0)));
        let point = MeasurementPoint::new("latency", ts())
            .with_tag("host", "h1")
            .with_field("request", dist.clone());

        let datums = builder(&[], vec![]).build(&point);
        assert_eq!(datums.len(), 2);

        let mut total_values = 0;
        for datum in &datums {
            assert_eq!(datum.unit(), Some("Milliseconds"));
            let DatumPayload::StatisticSet(set) = datum.payload() else {
                panic!("expected statistic set payload");
            };
            assert!(set.values.len() <= 150);
            assert_eq!(set.values.len(), set.counts.len());
            assert_eq!(set.minimum, dist.minimum());
            assert_eq!(set.maximum, dist.maximum());
            assert_eq!(set.sum, dist.sum());
            assert_eq!(set.sample_count, dist.sample_count());
            total_values += set.values.len();
        }
        assert_eq!(total_values, 300);
    }

    #[test]
    fn unsupported_and_empty_fields_are_skipped() {
        let point = MeasurementPoint::new("proc", ts())
            .with_field("state", "running")
            .with_field("latency", Distribution::new("Seconds"))
            .with_field("pid", 1234i64);

        let datums = builder(&[], vec![]).build(&point);
        assert_eq!(datums.len(), 1);
        assert_eq!(datums[0].payload(), &DatumPayload::Value(1234.0));
        assert!(datums[0].dimensions().is_empty());
    }

    #[test]
    fn scalar_conversions() {
        let point = MeasurementPoint::new("misc", ts())
            .with_field("up", true)
            .with_field("down", false)
            .with_field("bytes", 7u64)
            .with_field("delta", -3i64)
            .with_field("started", ts());

        let values = builder(&[], vec![])
            .build(&point)
            .into_iter()
            .map(|datum| datum.payload().clone())
            .collect::<Vec<_>>();

        assert_eq!(
            values,
            vec![
                DatumPayload::Value(1.0),
                DatumPayload::Value(0.0),
                DatumPayload::Value(7.0),
                DatumPayload::Value(-3.0),
                DatumPayload::Value(1_700_000_000.0),
            ]
        );
    }

    #[test]
    fn naming_and_units() {
        let point = MeasurementPoint::new("mem", ts())
            .with_field("value", 1.0)
            .with_field("used", 2.0)
            .with_field("free", 3.0)
            .with_field("latency", Distribution::from_entries("Seconds", [(1.0, 1.0)]));

        let decorations = vec![
            MetricDecoration::new("mem", "used").with_rename("MemoryUsed").with_unit("Bytes"),
            MetricDecoration::new("mem", "latency").with_unit("Milliseconds"),
        ];
        let datums = builder(&[], decorations).build(&point);

        let names = datums.iter().map(|d| d.metric_name()).collect::<Vec<_>>();
        let free = format!("mem{NAME_SEPARATOR}free");
        let latency = format!("mem{NAME_SEPARATOR}latency");
        assert_eq!(names, vec!["mem", "MemoryUsed", free.as_str(), latency.as_str()]);

        let units = datums.iter().map(|d| d.unit()).collect::<Vec<_>>();
        assert_eq!(units, vec![None, Some("Bytes"), None, Some("Milliseconds")]);
    }

    #[test]
    fn high_resolution_tag() {
        for (value, expected) in [("true", true), ("TRUE", true), ("True", true), ("false", false), ("1", false)] {
            let point = MeasurementPoint::new("cpu", ts())
                .with_tag(HIGH_RESOLUTION_TAG_KEY, value)
                .with_tag("host", "h1")
                .with_field("usage_idle", 1.0);

            let datums = builder(&[], vec![]).build(&point);
            assert_eq!(datums.len(), 1);
            assert_eq!(datums[0].is_high_resolution(), expected, "tag value {value}");

            // Any other value is an ordinary tag and stays on the datum as a dimension.
            let mut expected_dims = vec![("host", "h1")];
            if !expected {
                expected_dims.push((HIGH_RESOLUTION_TAG_KEY, value));
            }
            assert_eq!(datums[0].dimensions().to_vec(), dims(&expected_dims), "tag value {value}");
        }
    }

    #[test]
    fn datum_count_is_full_cross_product() {
        let point = MeasurementPoint::new("disk", ts())
            .with_tag("host", "h1")
            .with_tag("device", "sda")
            .with_tag("fstype", "ext4")
            .with_field("free", 1.0)
            .with_field("used", 2.0)
            .with_field("iops", Distribution::from_entries("", (0..451).map(|i| (f64::from(i), 1.0))));

        let datums = builder(&[&["device"], &["host"], &["missing"]], vec![]).build(&point);

        // 3 dimension sets, and fields contribute 1 + 1 + 4 chunks.
        assert_eq!(datums.len(), 3 * (1 + 1 + 4));
    }
}
