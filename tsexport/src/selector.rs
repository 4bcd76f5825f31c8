//! Turns selection criteria into storage queries.

use std::ops::ControlFlow;

use tracing::debug;

use crate::criteria::SelectionCriteria;
use crate::error::Result;
use crate::labels::{Matcher, METRIC_NAME_LABEL};
use crate::storage::{Querier, Series};

/// Builds the matcher sets to run, in order.
///
/// - With metric names, one query per name, each scoped by a `__name__`
///   matcher. Repeated names produce repeated queries.
/// - With only filters, a single query carrying the filters.
/// - With neither, no query at all.
///
/// Every query carries one equality matcher per filter.
pub fn plan(criteria: &SelectionCriteria) -> Vec<Vec<Matcher>> {
    let filters: Vec<Matcher> = criteria
        .filters()
        .iter()
        .map(|filter| Matcher::equal(filter.name.as_str(), filter.value.as_str()))
        .collect();

    if criteria.metric_names().is_empty() {
        if filters.is_empty() {
            return Vec::new();
        }
        return vec![filters];
    }

    criteria
        .metric_names()
        .iter()
        .map(|name| {
            let mut matchers = Vec::with_capacity(filters.len() + 1);
            matchers.push(Matcher::equal(METRIC_NAME_LABEL, name.as_str()));
            matchers.extend(filters.iter().cloned());
            matchers
        })
        .collect()
}

/// Runs the planned queries against a querier.
#[derive(Debug, Clone)]
pub struct Selector {
    queries: Vec<Vec<Matcher>>,
}

impl Selector {
    /// Plans the queries for `criteria`.
    pub fn new(criteria: &SelectionCriteria) -> Self {
        Self {
            queries: plan(criteria),
        }
    }

    /// The planned matcher sets.
    pub fn queries(&self) -> &[Vec<Matcher>] {
        &self.queries
    }

    /// Hands every matching series to `visit`, query by query, in the order
    /// the storage returns them.
    ///
    /// `visit` can stop the walk early by returning [`ControlFlow::Break`].
    ///
    /// # Errors
    ///
    /// Returns the first storage error raised while selecting or
    /// materializing a series.
    pub fn select<F>(&self, querier: &dyn Querier, mut visit: F) -> Result<()>
    where
        F: FnMut(&dyn Series) -> ControlFlow<()>,
    {
        for matchers in &self.queries {
            debug!(matchers = %DisplayMatchers(matchers), "Querying series");
            for series in querier.select(matchers)? {
                let series = series?;
                if visit(series.as_ref()).is_break() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

struct DisplayMatchers<'a>(&'a [Matcher]);

impl std::fmt::Display for DisplayMatchers<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, matcher) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{matcher}")?;
        }
        f.write_str("}")
    }
}
