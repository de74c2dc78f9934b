use std::time::SystemTime;

use indexmap::IndexMap;

use crate::distribution::Distribution;

/// A field value carried by a [`MeasurementPoint`].
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// A signed integer.
    Integer(i64),

    /// An unsigned integer.
    Unsigned(u64),

    /// A floating-point number.
    Float(f64),

    /// A boolean, published as `1` or `0`.
    Boolean(bool),

    /// A point in time, published as whole seconds since the Unix epoch.
    Timestamp(SystemTime),

    /// A pre-aggregated distribution of sample values.
    Distribution(Distribution),

    /// A string.
    ///
    /// Strings cannot be published as metric data and are always skipped.
    String(String),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Unsigned(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<SystemTime> for FieldValue {
    fn from(value: SystemTime) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<Distribution> for FieldValue {
    fn from(value: Distribution) -> Self {
        FieldValue::Distribution(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_owned())
    }
}

/// A single measurement delivered by the upstream aggregation stage.
///
/// A point has a name (its "category"), a timestamp, a set of tags, and a set of fields. Every publishable field turns
/// into one or more datums when the point is converted.
///
/// Tags and fields keep their insertion order, which makes conversion output deterministic.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasurementPoint {
    name: String,
    timestamp: SystemTime,
    tags: IndexMap<String, String>,
    fields: IndexMap<String, FieldValue>,
}

impl MeasurementPoint {
    /// Creates a new `MeasurementPoint` with no tags or fields.
    pub fn new<N>(name: N, timestamp: SystemTime) -> Self
    where
        N: Into<String>,
    {
        Self { name: name.into(), timestamp, tags: IndexMap::new(), fields: IndexMap::new() }
    }

    /// Adds a tag to the point.
    ///
    /// If the tag already exists, its value is replaced.
    #[must_use]
    pub fn with_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds a field to the point.
    ///
    /// If the field already exists, its value is replaced.
    #[must_use]
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns the name of the point.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the timestamp of the point.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Returns the tags of the point.
    pub fn tags(&self) -> &IndexMap<String, String> {
        &self.tags
    }

    /// Returns the fields of the point.
    pub fn fields(&self) -> &IndexMap<String, FieldValue> {
        &self.fields
    }
}
