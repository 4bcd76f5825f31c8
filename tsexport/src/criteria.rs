//! Series selection criteria.
//!
//! [`SelectionCriteria`] is immutable once built: the time window is
//! validated at construction so nothing downstream can observe an inverted
//! range.

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, Result};
use crate::labels::WILDCARD;

/// A `label:value` equality filter taken from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter {
    /// Label name.
    pub name: String,
    /// Required value.
    pub value: String,
}

impl LabelFilter {
    /// Creates a filter from its parts.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl FromStr for LabelFilter {
    type Err = ConfigError;

    /// Splits on the first `:`, so values may themselves contain colons.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let Some((name, value)) = s.split_once(':') else {
            return Err(ConfigError::MalformedFilter {
                filter: s.to_string(),
                reason: "expected label:value",
            });
        };
        if name.is_empty() {
            return Err(ConfigError::MalformedFilter {
                filter: s.to_string(),
                reason: "label name cannot be empty",
            });
        }
        Ok(Self::new(name, value))
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.value)
    }
}

/// Everything the selector and projector need to know about what to export.
///
/// # Example
///
/// ```rust
/// use tsexport::criteria::{LabelFilter, SelectionCriteria};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let criteria = SelectionCriteria::new(0, 60_000)?
///     .with_metric_names(["http_requests_total"])
///     .with_filters([LabelFilter::new("job", "api")])
///     .with_include(["instance"])
///     .with_exclude(["pod"]);
/// assert!(!criteria.includes_all());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionCriteria {
    min_t: i64,
    max_t: i64,
    metric_names: Vec<String>,
    filters: Vec<LabelFilter>,
    include: Vec<String>,
    exclude: Vec<String>,
}

impl SelectionCriteria {
    /// Creates criteria for the inclusive window `[min_t, max_t]`.
    ///
    /// The include list starts as the wildcard; metric names, filters and
    /// exclusions start empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvertedTimeRange`] if `min_t > max_t`.
    pub fn new(min_t: i64, max_t: i64) -> Result<Self> {
        if min_t > max_t {
            return Err(ConfigError::InvertedTimeRange { min_t, max_t }.into());
        }
        Ok(Self {
            min_t,
            max_t,
            metric_names: Vec::new(),
            filters: Vec::new(),
            include: vec![WILDCARD.to_string()],
            exclude: Vec::new(),
        })
    }

    /// Restricts the export to the given metric names.
    #[must_use]
    pub fn with_metric_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metric_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Adds equality filters applied to every query.
    #[must_use]
    pub fn with_filters<I>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = LabelFilter>,
    {
        self.filters = filters.into_iter().collect();
        self
    }

    /// Sets the include list. An empty list falls back to the wildcard.
    #[must_use]
    pub fn with_include<I, S>(mut self, include: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = include.into_iter().map(Into::into).collect();
        if self.include.is_empty() {
            self.include.push(WILDCARD.to_string());
        }
        self
    }

    /// Sets the exclude list.
    #[must_use]
    pub fn with_exclude<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = exclude.into_iter().map(Into::into).collect();
        self
    }

    /// Lower bound, milliseconds, inclusive.
    pub fn min_t(&self) -> i64 {
        self.min_t
    }

    /// Upper bound, milliseconds, inclusive.
    pub fn max_t(&self) -> i64 {
        self.max_t
    }

    /// Requested metric names; empty means unrestricted.
    pub fn metric_names(&self) -> &[String] {
        &self.metric_names
    }

    /// Equality filters.
    pub fn filters(&self) -> &[LabelFilter] {
        &self.filters
    }

    /// Labels to include.
    pub fn include(&self) -> &[String] {
        &self.include
    }

    /// Labels to exclude.
    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    /// Whether the include list contains the wildcard.
    pub fn includes_all(&self) -> bool {
        self.include.iter().any(|label| label == WILDCARD)
    }
}
