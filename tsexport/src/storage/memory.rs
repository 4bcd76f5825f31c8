//! In-memory storage backend.

use std::cell::Cell;

use crate::error::{Result, StorageError};
use crate::labels::{Labels, Matcher};
use crate::storage::{matches_all, Querier, Samples, Series, SeriesSet, Storage};

/// A series held in memory.
#[derive(Debug, Clone)]
struct StoredSeries {
    labels: Labels,
    samples: Vec<(i64, f64)>,
}

/// Storage backend keeping every series in a `Vec`.
///
/// Series are returned in label order, like the block store. The number of
/// `select` calls is tracked so callers can assert which queries ran.
///
/// # Example
///
/// ```rust
/// use tsexport::labels::{Labels, Matcher};
/// use tsexport::storage::memory::MemoryStorage;
/// use tsexport::storage::{Querier, Series, Storage};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut storage = MemoryStorage::new();
/// storage.insert(Labels::from_pairs([("__name__", "up")]), vec![(1, 1.0), (2, 0.0)])?;
///
/// let querier = storage.querier(0, 10)?;
/// let series: Vec<_> = querier
///     .select(&[Matcher::equal("__name__", "up")])?
///     .collect::<Result<_, _>>()?;
/// assert_eq!(series[0].samples().count(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    series: Vec<StoredSeries>,
    select_calls: Cell<usize>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a series.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DuplicateSeries`] if the label set is already
    /// present.
    pub fn insert(&mut self, labels: Labels, samples: Vec<(i64, f64)>) -> Result<()> {
        match self.series.binary_search_by(|s| s.labels.cmp(&labels)) {
            Ok(_) => Err(StorageError::DuplicateSeries {
                labels: labels.to_string(),
            }
            .into()),
            Err(index) => {
                self.series.insert(index, StoredSeries { labels, samples });
                Ok(())
            }
        }
    }

    /// Number of stored series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Whether the store has no series.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// How many times `select` has been called on any querier.
    pub fn select_calls(&self) -> usize {
        self.select_calls.get()
    }
}

impl Storage for MemoryStorage {
    fn querier(&self, min_t: i64, max_t: i64) -> Result<Box<dyn Querier + '_>> {
        if min_t > max_t {
            return Err(StorageError::InvalidTimeRange { min_t, max_t }.into());
        }
        Ok(Box::new(MemoryQuerier {
            storage: self,
            min_t,
            max_t,
        }))
    }
}

struct MemoryQuerier<'a> {
    storage: &'a MemoryStorage,
    min_t: i64,
    max_t: i64,
}

impl Querier for MemoryQuerier<'_> {
    fn select(&self, matchers: &[Matcher]) -> Result<SeriesSet<'_>> {
        self.storage
            .select_calls
            .set(self.storage.select_calls.get() + 1);

        let matchers = matchers.to_vec();
        let (min_t, max_t) = (self.min_t, self.max_t);
        let iter = self
            .storage
            .series
            .iter()
            .filter(move |series| matches_all(&matchers, &series.labels))
            .map(move |series| -> Result<Box<dyn Series + '_>> {
                Ok(Box::new(MemorySeries {
                    series,
                    min_t,
                    max_t,
                }))
            });
        Ok(Box::new(iter))
    }
}

struct MemorySeries<'a> {
    series: &'a StoredSeries,
    min_t: i64,
    max_t: i64,
}

impl Series for MemorySeries<'_> {
    fn labels(&self) -> &Labels {
        &self.series.labels
    }

    fn samples(&self) -> Samples<'_> {
        let (min_t, max_t) = (self.min_t, self.max_t);
        Box::new(
            self.series
                .samples
                .iter()
                .copied()
                .filter(move |(t, _)| (min_t..=max_t).contains(t)),
        )
    }
}
