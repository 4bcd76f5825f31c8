//! Storage interface consumed by the exporter.
//!
//! The exporter never looks inside a storage engine. It asks for a
//! [`Querier`] bound to a time window, selects series with equality
//! [`Matcher`]s, and walks each [`Series`]' samples.
//!
//! Two backends ship with the crate:
//!
//! - [`block::BlockStore`]: on-disk directory of memory-mapped chunk files
//! - [`memory::MemoryStorage`]: in-process store for tests and embedding

pub mod block;
pub mod memory;

use crate::error::Result;
use crate::labels::{Labels, Matcher};

/// Iterator over `(timestamp_ms, value)` pairs. Values may be NaN.
pub type Samples<'a> = Box<dyn Iterator<Item = (i64, f64)> + 'a>;

/// Lazily produced series matching a query.
pub type SeriesSet<'a> = Box<dyn Iterator<Item = Result<Box<dyn Series + 'a>>> + 'a>;

/// A database that can be queried over a time window.
pub trait Storage {
    /// Returns a querier restricted to the inclusive window `[min_t, max_t]`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if `min_t > max_t` or the backend cannot
    /// serve reads.
    fn querier(&self, min_t: i64, max_t: i64) -> Result<Box<dyn Querier + '_>>;
}

/// Selects series within a fixed time window.
pub trait Querier {
    /// Returns every series whose labels satisfy all `matchers`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the selection cannot be started. Errors
    /// while materializing an individual series surface as `Err` items.
    fn select(&self, matchers: &[Matcher]) -> Result<SeriesSet<'_>>;
}

/// One uniquely-labeled sequence of observations.
pub trait Series {
    /// Full label set, including `__name__`.
    fn labels(&self) -> &Labels;

    /// Samples inside the querier's window, in storage order.
    fn samples(&self) -> Samples<'_>;
}

/// Returns `true` if all matchers accept the labels.
pub(crate) fn matches_all(matchers: &[Matcher], labels: &Labels) -> bool {
    matchers.iter().all(|matcher| matcher.matches(labels))
}
