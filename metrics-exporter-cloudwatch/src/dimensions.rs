use std::sync::Arc;

use tracing::{info, trace};

/// Maximum number of dimensions allowed on a single datum.
pub const MAX_DIMENSIONS: usize = 10;

const HOST_KEY: &str = "host";

/// A named value qualifying a datum.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Dimension {
    name: String,
    value: String,
}

impl Dimension {
    /// Creates a new `Dimension`.
    pub fn new<N, V>(name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        Self { name: name.into(), value: value.into() }
    }

    /// Returns the dimension name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the dimension value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// An immutable, shareable set of dimensions.
///
/// The same set is shared by every datum emitted for it, across fields and distribution chunks.
pub type DimensionSet = Arc<[Dimension]>;

/// Builds the raw dimension set for the given tags.
///
/// The `host` tag, when present with a non-empty value, is always the first dimension. All other tags with non-empty
/// values follow in lexicographical order of their keys, and the set is capped at [`MAX_DIMENSIONS`] entries.
pub fn build_dimensions<'a, I>(tags: I) -> Vec<Dimension>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut host = None;
    let mut others = Vec::new();
    for (key, value) in tags {
        if value.is_empty() {
            continue;
        }

        if key == HOST_KEY {
            host = Some(value);
        } else {
            others.push((key, value));
        }
    }
    others.sort_unstable_by(|a, b| a.0.cmp(b.0));

    host.map(|value| (HOST_KEY, value))
        .into_iter()
        .chain(others)
        .take(MAX_DIMENSIONS)
        .map(|(key, value)| Dimension::new(key, value))
        .collect()
}

/// A deduplicated list of rollup rules.
///
/// Each rule is an ordered list of tag keys, describing one additional, coarser-grained dimension set that a point
/// should be re-emitted under.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RollupRules {
    rules: Vec<Vec<String>>,
}

impl RollupRules {
    /// Creates a new `RollupRules` from the given rules.
    ///
    /// Duplicate rules are removed, keeping the first occurrence of each.
    pub fn new<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let mut unique: Vec<Vec<String>> = Vec::new();
        for rule in rules {
            if !unique.contains(&rule) {
                unique.push(rule);
            }
        }

        info!(rules = ?unique, "Using unique rollup dimension rules.");
        Self { rules: unique }
    }

    /// Returns the rules, in declaration order.
    pub fn rules(&self) -> &[Vec<String>] {
        &self.rules
    }

    /// Expands a raw dimension set into every dimension set it must be emitted under.
    ///
    /// The raw set always comes first, followed by the set derived from each rule, in rule order. A rule referencing a
    /// dimension that the raw set does not hold derives nothing, and a derived set identical to the raw set is skipped.
    pub fn expand(&self, raw: Vec<Dimension>) -> Vec<DimensionSet> {
        let mut sets = Vec::with_capacity(self.rules.len() + 1);

        for rule in &self.rules {
            let derived = rule
                .iter()
                .map(|key| {
                    raw.iter().find(|dim| dim.name == *key).map(|dim| Dimension::new(key.as_str(), dim.value()))
                })
                .collect::<Option<Vec<_>>>();

            if let Some(derived) = derived {
                if derived != raw {
                    sets.push(DimensionSet::from(derived));
                }
            }
        }

        sets.insert(0, DimensionSet::from(raw));
        trace!(dimension_sets = ?sets, "Expanded rollup dimensions.");
        sets
    }
}

#[cfg(test)]
mod tests {
    use proptest::{collection::hash_map as arb_map, prelude::*};

    use super::{build_dimensions, Dimension, RollupRules, MAX_DIMENSIONS};

    fn rule(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| (*k).to_owned()).collect()
    }

    fn dims(pairs: &[(&str, &str)]) -> Vec<Dimension> {
        pairs.iter().map(|(k, v)| Dimension::new(*k, *v)).collect()
    }

    #[test]
    fn host_first_then_sorted() {
        let tags = [("zone", "b"), ("az", "us-east-1a"), ("host", "h1"), ("empty", "")];
        let actual = build_dimensions(tags);

        assert_eq!(actual, dims(&[("host", "h1"), ("az", "us-east-1a"), ("zone", "b")]));
    }

    #[test]
    fn empty_host_is_skipped() {
        let actual = build_dimensions([("host", ""), ("az", "a")]);
        assert_eq!(actual, dims(&[("az", "a")]));
    }

    #[test]
    fn capped_at_max_dimensions() {
        let keys = (0..15).map(|i| format!("tag{i:02}")).collect::<Vec<_>>();
        let tags = keys.iter().map(|k| (k.as_str(), "v")).chain([("host", "h1")]);

        let actual = build_dimensions(tags);
        assert_eq!(actual.len(), MAX_DIMENSIONS);
        assert_eq!(actual[0].name(), "host");
        assert_eq!(actual[1].name(), "tag00");
        assert_eq!(actual[9].name(), "tag08");
    }

    #[test]
    fn rules_are_deduplicated_in_order() {
        let rules = RollupRules::new(vec![rule(&["a"]), rule(&["b", "a"]), rule(&["a"]), rule(&[]), rule(&[])]);
        assert_eq!(rules.rules(), &[rule(&["a"]), rule(&["b", "a"]), rule(&[])]);
    }

    #[test]
    fn expand_with_rollups() {
        let rules = RollupRules::new(vec![
            rule(&["az"]),
            rule(&["az", "missing"]),
            rule(&["az", "host"]),
            rule(&["host", "az"]),
            rule(&[]),
        ]);
        let raw = dims(&[("host", "h1"), ("az", "us-east-1a")]);

        let sets = rules.expand(raw.clone());
        let sets = sets.iter().map(|set| set.to_vec()).collect::<Vec<_>>();
        assert_eq!(
            sets,
            vec![
                raw,
                dims(&[("az", "us-east-1a")]),
                dims(&[("az", "us-east-1a"), ("host", "h1")]),
                vec![],
            ]
        );
    }

    #[test]
    fn expand_without_rules() {
        let sets = RollupRules::default().expand(dims(&[("host", "h1")]));
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].to_vec(), dims(&[("host", "h1")]));
    }

    #[test]
    fn empty_rule_on_empty_raw_set_is_skipped() {
        let sets = RollupRules::new(vec![rule(&[])]).expand(Vec::new());
        assert_eq!(sets.len(), 1);
        assert!(sets[0].is_empty());
    }

    proptest! {
        #[test]
        fn raw_dimensions_are_bounded(
            tags in arb_map("[a-z]{1,6}", "[a-z]{0,3}", 0..32),
            host in proptest::option::of("[a-z]{1,4}"),
        ) {
            let host_tag = host.as_deref().map(|h| ("host", h));
            let actual = build_dimensions(
                tags.iter().map(|(k, v)| (k.as_str(), v.as_str())).filter(|(k, _)| *k != "host").chain(host_tag),
            );

            prop_assert!(actual.len() <= MAX_DIMENSIONS);
            prop_assert!(actual.iter().all(|dim| !dim.value().is_empty()));
            if let Some(host) = host {
                prop_assert_eq!(actual[0].name(), "host");
                prop_assert_eq!(actual[0].value(), host.as_str());
            }
        }

        #[test]
        fn rules_with_missing_keys_derive_nothing(
            tags in arb_map("[a-e]", "[a-z]{1,3}", 0..5),
            keys in proptest::collection::vec("[a-g]", 1..4),
        ) {
            let raw = build_dimensions(tags.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            let sets = RollupRules::new(vec![keys.clone()]).expand(raw.clone());

            let all_present = keys.iter().all(|key| tags.contains_key(key));
            if !all_present {
                prop_assert_eq!(sets.len(), 1);
            }
            prop_assert_eq!(sets[0].to_vec(), raw);
        }
    }
}
