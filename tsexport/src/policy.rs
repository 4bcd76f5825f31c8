//! Label include/exclude policy.
//!
//! The policy decides, per series, whether it takes part in the export and
//! which labels it exports:
//!
//! 1. With an explicit include list, keep exactly those labels. A series
//!    missing any of them is rejected as a whole.
//! 2. With the wildcard, keep every label.
//! 3. Drop every excluded label, even if it was included.
//! 4. Drop reserved names; the metric name travels separately.

use std::fmt;

use crate::labels::{is_reserved, Labels, WILDCARD};
use crate::record::ExportedLabels;

/// Stateless projection of series labels onto the exported label set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPolicy {
    include: Vec<String>,
    exclude: Vec<String>,
    include_all: bool,
}

/// Outcome of projecting an accepted series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    /// Value of `__name__`, empty if the series has none.
    pub metric_name: String,
    /// Labels to export.
    pub labels: ExportedLabels,
}

/// Why a series was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// The first include label the series did not carry.
    pub missing_label: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "label '{}' not found", self.missing_label)
    }
}

impl LabelPolicy {
    /// Builds a policy from include and exclude lists.
    ///
    /// A `*` anywhere in `include` switches to wildcard mode and the other
    /// include entries are ignored.
    pub fn new<I, E, S, T>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let include: Vec<String> = include.into_iter().map(Into::into).collect();
        let include_all = include.iter().any(|label| label == WILDCARD);
        Self {
            include,
            exclude: exclude.into_iter().map(Into::into).collect(),
            include_all,
        }
    }

    /// Whether every label is included.
    pub fn includes_all(&self) -> bool {
        self.include_all
    }

    /// Include list as configured.
    pub fn include(&self) -> &[String] {
        &self.include
    }

    /// Exclude list as configured.
    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    /// Projects a series' labels.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] when the include list is explicit and the
    /// series lacks one of its labels.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tsexport::labels::Labels;
    /// use tsexport::policy::LabelPolicy;
    ///
    /// let policy = LabelPolicy::new(["job", "pod"], ["pod"]);
    /// let labels = Labels::from_pairs([("__name__", "up"), ("job", "api"), ("pod", "p1")]);
    /// let projection = policy.project(&labels).unwrap();
    /// assert_eq!(projection.metric_name, "up");
    /// assert_eq!(projection.labels.keys().collect::<Vec<_>>(), ["job"]);
    ///
    /// let rejected = policy.project(&Labels::from_pairs([("job", "api")]));
    /// assert!(rejected.is_err());
    /// ```
    pub fn project(&self, labels: &Labels) -> Result<Projection, Rejection> {
        let mut exported = ExportedLabels::new();

        if self.include_all {
            for label in labels {
                exported.insert(label.name.clone(), label.value.clone());
            }
        } else {
            for name in &self.include {
                let Some(value) = labels.get(name) else {
                    return Err(Rejection {
                        missing_label: name.clone(),
                    });
                };
                exported.insert(name.clone(), value.to_string());
            }
        }

        for name in &self.exclude {
            exported.remove(name);
        }
        exported.retain(|name, _| !is_reserved(name));

        Ok(Projection {
            metric_name: labels.metric_name().to_string(),
            labels: exported,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> Labels {
        Labels::from_pairs([
            ("__name__", "http_requests_total"),
            ("job", "api"),
            ("instance", "10.0.0.1:9090"),
            ("pod", "api-7f9c"),
        ])
    }

    fn keys(projection: &Projection) -> Vec<&str> {
        projection.labels.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_explicit_include_keeps_only_listed() {
        let policy = LabelPolicy::new(["job", "instance"], Vec::<String>::new());
        let projection = policy.project(&series()).unwrap();
        assert_eq!(projection.metric_name, "http_requests_total");
        assert_eq!(keys(&projection), ["instance", "job"]);
        assert_eq!(projection.labels["instance"], "10.0.0.1:9090");
    }

    #[test]
    fn test_missing_include_rejects_series() {
        let policy = LabelPolicy::new(["job", "zone"], Vec::<String>::new());
        let rejection = policy.project(&series()).unwrap_err();
        assert_eq!(rejection.missing_label, "zone");
        assert_eq!(rejection.to_string(), "label 'zone' not found");
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let policy = LabelPolicy::new(["job", "pod"], ["pod"]);
        let projection = policy.project(&series()).unwrap();
        assert_eq!(keys(&projection), ["job"]);
    }

    #[test]
    fn test_excluded_include_still_required() {
        // The include list decides participation before exclusions apply.
        let policy = LabelPolicy::new(["zone"], ["zone"]);
        assert!(policy.project(&series()).is_err());
    }

    #[test]
    fn test_wildcard_keeps_everything_but_excluded() {
        let policy = LabelPolicy::new(["*"], ["pod"]);
        assert!(policy.includes_all());
        let projection = policy.project(&series()).unwrap();
        assert_eq!(keys(&projection), ["instance", "job"]);
    }

    #[test]
    fn test_wildcard_ignores_other_include_entries() {
        let policy = LabelPolicy::new(["zone", "*"], Vec::<String>::new());
        let projection = policy.project(&series()).unwrap();
        assert_eq!(keys(&projection), ["instance", "job", "pod"]);
    }

    #[test]
    fn test_reserved_names_never_exported() {
        let policy = LabelPolicy::new(["__name__", "job"], Vec::<String>::new());
        let projection = policy.project(&series()).unwrap();
        assert_eq!(keys(&projection), ["job"]);
        assert_eq!(projection.metric_name, "http_requests_total");
    }

    #[test]
    fn test_unnamed_series_resolves_empty_name() {
        let policy = LabelPolicy::new(["*"], Vec::<String>::new());
        let projection = policy.project(&Labels::from_pairs([("job", "api")])).unwrap();
        assert_eq!(projection.metric_name, "");
    }

    #[test]
    fn test_properties_over_label_combinations() {
        let names = ["a", "b", "c", "d"];
        let include = ["a", "b"];
        let exclude = ["b", "d"];

        // Every subset of `names` as a series.
        for mask in 0u8..16 {
            let pairs: Vec<_> = names
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, n)| (*n, "v"))
                .collect();
            let labels = Labels::from_pairs(pairs.clone());

            let explicit = LabelPolicy::new(include, exclude);
            let has_all_includes = include.iter().all(|n| labels.get(n).is_some());
            match explicit.project(&labels) {
                Ok(p) => {
                    assert!(has_all_includes);
                    assert!(p.labels.keys().all(|k| include.contains(&k.as_str())));
                    assert!(p.labels.keys().all(|k| !exclude.contains(&k.as_str())));
                }
                Err(_) => assert!(!has_all_includes),
            }

            let wildcard = LabelPolicy::new(["*"], exclude);
            let p = wildcard.project(&labels).unwrap();
            for (name, _) in &pairs {
                assert_eq!(p.labels.contains_key(*name), !exclude.contains(name));
            }
        }
    }
}
