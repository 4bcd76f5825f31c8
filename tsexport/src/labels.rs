//! Series label sets and equality matchers.
//!
//! A [`Labels`] value is the full identity of a series as the storage layer
//! sees it, including the reserved `__name__` label. Labels are kept sorted
//! by name so two sets with the same pairs compare and hash equal regardless
//! of the order they were built in.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved label carrying the series metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Synthesized output column holding the sample timestamp.
pub const TIME_COLUMN: &str = "__time__";

/// Synthesized output column holding the sample value.
pub const VALUE_COLUMN: &str = "__value__";

/// Include-list token meaning "export every label present on the series".
pub const WILDCARD: &str = "*";

/// Returns `true` for names that are synthesized by the encoders and never
/// exported as ordinary labels.
pub fn is_reserved(name: &str) -> bool {
    matches!(name, METRIC_NAME_LABEL | TIME_COLUMN | VALUE_COLUMN)
}

/// A single `name=value` label pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Label value.
    pub value: String,
}

impl Label {
    /// Creates a new label pair.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An ordered, duplicate-free set of labels identifying a series.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(Vec<Label>);

impl Labels {
    /// Builds a label set from pairs.
    ///
    /// Pairs are sorted by name. When a name appears more than once the last
    /// occurrence wins.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tsexport::labels::Labels;
    ///
    /// let labels = Labels::from_pairs([("job", "api"), ("__name__", "up")]);
    /// assert_eq!(labels.get("__name__"), Some("up"));
    /// assert_eq!(labels.iter().next().unwrap().name, "__name__");
    /// ```
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut labels: Vec<Label> = pairs
            .into_iter()
            .map(|(name, value)| Label::new(name, value))
            .collect();
        // Stable sort keeps insertion order among equal names, so the
        // reverse dedup retains the last one.
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        labels.reverse();
        labels.dedup_by(|a, b| a.name == b.name);
        labels.reverse();
        Self(labels)
    }

    /// Returns the value of a label, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|label| label.name.as_str().cmp(name))
            .ok()
            .map(|index| self.0[index].value.as_str())
    }

    /// Returns the metric name, or an empty string when unset.
    pub fn metric_name(&self) -> &str {
        self.get(METRIC_NAME_LABEL).unwrap_or("")
    }

    /// Iterates labels in name order.
    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.0.iter()
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn is_sorted_unique(&self) -> bool {
        self.0.windows(2).all(|pair| pair[0].name < pair[1].name)
    }
}

impl<'a> IntoIterator for &'a Labels {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}=\"{}\"", label.name, label.value)?;
        }
        f.write_str("}")
    }
}

/// Equality predicate over one label's value.
///
/// An absent label is treated as the empty string, so `name=""` selects
/// series that do not carry `name` at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    /// Label name.
    pub name: String,
    /// Required value.
    pub value: String,
}

impl Matcher {
    /// Creates an equality matcher.
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Tests the matcher against a label set.
    pub fn matches(&self, labels: &Labels) -> bool {
        labels.get(&self.name).unwrap_or("") == self.value
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=\"{}\"", self.name, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_sorts_and_dedups() {
        let labels = Labels::from_pairs([("b", "2"), ("a", "1"), ("b", "3")]);
        let names: Vec<_> = labels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(labels.get("b"), Some("3"));
        assert!(labels.is_sorted_unique());
    }

    #[test]
    fn test_metric_name_defaults_to_empty() {
        let labels = Labels::from_pairs([("job", "api")]);
        assert_eq!(labels.metric_name(), "");

        let labels = Labels::from_pairs([("__name__", "up"), ("job", "api")]);
        assert_eq!(labels.metric_name(), "up");
    }

    #[test]
    fn test_matcher_absent_label_is_empty() {
        let labels = Labels::from_pairs([("job", "api")]);
        assert!(Matcher::equal("job", "api").matches(&labels));
        assert!(!Matcher::equal("job", "db").matches(&labels));
        assert!(Matcher::equal("instance", "").matches(&labels));
        assert!(!Matcher::equal("instance", "a").matches(&labels));
    }

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved("__name__"));
        assert!(is_reserved("__time__"));
        assert!(is_reserved("__value__"));
        assert!(!is_reserved("__other__"));
        assert!(!is_reserved("job"));
    }

    #[test]
    fn test_display() {
        let labels = Labels::from_pairs([("job", "api"), ("__name__", "up")]);
        assert_eq!(labels.to_string(), "{__name__=\"up\", job=\"api\"}");
    }
}
