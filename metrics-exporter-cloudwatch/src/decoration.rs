use std::collections::HashMap;

use thiserror::Error;

/// Units accepted by the remote ingestion API.
const STANDARD_UNITS: &[&str] = &[
    "Seconds",
    "Microseconds",
    "Milliseconds",
    "Bytes",
    "Kilobytes",
    "Megabytes",
    "Gigabytes",
    "Terabytes",
    "Bits",
    "Kilobits",
    "Megabits",
    "Gigabits",
    "Terabits",
    "Percent",
    "Count",
    "Bytes/Second",
    "Kilobytes/Second",
    "Megabytes/Second",
    "Gigabytes/Second",
    "Terabytes/Second",
    "Bits/Second",
    "Kilobits/Second",
    "Megabits/Second",
    "Gigabits/Second",
    "Terabits/Second",
    "Count/Second",
    "None",
];

/// Returns `true` if `unit` is one of the standard units accepted by the remote ingestion API.
pub fn is_standard_unit(unit: &str) -> bool {
    STANDARD_UNITS.contains(&unit)
}

/// Error returned when a metric decoration carries a unit that the remote ingestion API does not accept.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported unit '{unit}' for metric '{category}.{name}'")]
pub struct UnsupportedUnit {
    /// Category the decoration applies to.
    pub category: String,

    /// Field name the decoration applies to.
    pub name: String,

    /// The offending unit.
    pub unit: String,
}

/// A rename and/or unit override for a single field of a given category of points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricDecoration {
    category: String,
    name: String,
    rename: Option<String>,
    unit: Option<String>,
}

impl MetricDecoration {
    /// Creates a new `MetricDecoration` for the field `name` of points named `category`.
    pub fn new<C, N>(category: C, name: N) -> Self
    where
        C: Into<String>,
        N: Into<String>,
    {
        Self { category: category.into(), name: name.into(), rename: None, unit: None }
    }

    /// Sets the metric name to publish the field under.
    #[must_use]
    pub fn with_rename<R>(mut self, rename: R) -> Self
    where
        R: Into<String>,
    {
        self.rename = Some(rename.into());
        self
    }

    /// Sets the unit to publish the field with.
    #[must_use]
    pub fn with_unit<U>(mut self, unit: U) -> Self
    where
        U: Into<String>,
    {
        self.unit = Some(unit.into());
        self
    }
}

#[derive(Debug, Default)]
struct Decoration {
    rename: Option<String>,
    unit: Option<String>,
}

/// Lookup table of metric decorations, keyed by category and field name.
#[derive(Debug, Default)]
pub struct MetricDecorations {
    decorations: HashMap<String, HashMap<String, Decoration>>,
}

impl MetricDecorations {
    /// Creates a new `MetricDecorations` from the given decorations.
    ///
    /// When more than one decoration targets the same field, later ones override earlier ones.
    ///
    /// # Errors
    ///
    /// If any decoration carries a unit that is not a standard unit, an error is returned.
    pub fn new<I>(decorations: I) -> Result<Self, UnsupportedUnit>
    where
        I: IntoIterator<Item = MetricDecoration>,
    {
        let mut table: HashMap<String, HashMap<String, Decoration>> = HashMap::new();
        for decoration in decorations {
            if let Some(unit) = decoration.unit.as_deref() {
                if !is_standard_unit(unit) {
                    return Err(UnsupportedUnit {
                        category: decoration.category,
                        name: decoration.name,
                        unit: unit.to_owned(),
                    });
                }
            }

            let rename = decoration.rename.filter(|rename| !rename.is_empty());
            table
                .entry(decoration.category)
                .or_default()
                .insert(decoration.name, Decoration { rename, unit: decoration.unit });
        }

        Ok(Self { decorations: table })
    }

    fn get(&self, category: &str, name: &str) -> Option<&Decoration> {
        self.decorations.get(category).and_then(|fields| fields.get(name))
    }

    /// Returns the configured rename for the given field, if any.
    pub fn rename(&self, category: &str, name: &str) -> Option<&str> {
        self.get(category, name).and_then(|d| d.rename.as_deref())
    }

    /// Returns the configured unit for the given field, if any.
    pub fn unit(&self, category: &str, name: &str) -> Option<&str> {
        self.get(category, name).and_then(|d| d.unit.as_deref())
    }

    /// Returns `true` if no decorations are configured.
    pub fn is_empty(&self) -> bool {
        self.decorations.is_empty()
    }
}
