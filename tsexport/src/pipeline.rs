//! Wires the selector, projector and sink together.
//!
//! The calling thread produces records; a scoped thread encodes them. A
//! zero-capacity channel sits between the two, so a push blocks until the
//! sink has taken the previous record.

use std::io::Write;
use std::ops::ControlFlow;
use std::sync::mpsc::{sync_channel, SyncSender};
use std::thread;

use tracing::info;

use crate::criteria::SelectionCriteria;
use crate::error::Result;
use crate::policy::LabelPolicy;
use crate::projector::{Outcome, Projector, SeriesStats};
use crate::record::Record;
use crate::selector::Selector;
use crate::sink::{self, Format};
use crate::storage::Storage;

/// Totals for one export run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Series returned by storage, accepted or not.
    pub series_matched: u64,
    /// Series skipped by the label policy.
    pub series_rejected: u64,
    /// Records written by the sink.
    pub records_exported: u64,
    /// NaN samples skipped.
    pub nan_dropped: u64,
}

impl ExportSummary {
    fn add(&mut self, stats: SeriesStats) {
        self.records_exported += stats.records;
        self.nan_dropped += stats.nan_dropped;
    }
}

/// Exports every selected observation within the criteria's window.
///
/// Output is flushed before returning. With no metric names and no filters
/// nothing is queried and the output stays empty.
///
/// # Errors
///
/// - A storage error ends extraction. The sink finishes what it received and
///   the storage error is returned.
/// - A sink error stops extraction at the next send and is returned.
///
/// # Panics
///
/// Re-raises a panic from the sink thread.
///
/// # Example
///
/// ```rust
/// use tsexport::criteria::SelectionCriteria;
/// use tsexport::labels::Labels;
/// use tsexport::pipeline::export;
/// use tsexport::sink::Format;
/// use tsexport::storage::memory::MemoryStorage;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut storage = MemoryStorage::new();
/// storage.insert(Labels::from_pairs([("__name__", "a")]), vec![(1, 1.0)])?;
///
/// let criteria = SelectionCriteria::new(0, 10)?.with_metric_names(["a"]);
/// let mut out = Vec::new();
/// let summary = export(&storage, &criteria, Format::Json, &mut out)?;
///
/// assert_eq!(summary.records_exported, 1);
/// assert_eq!(out, b"{\"__name__\":\"a\",\"__time__\":\"1\",\"__value__\":\"1.000000\"}\n");
/// # Ok(())
/// # }
/// ```
pub fn export<W>(
    storage: &dyn Storage,
    criteria: &SelectionCriteria,
    format: Format,
    out: W,
) -> Result<ExportSummary>
where
    W: Write + Send,
{
    let policy = LabelPolicy::new(criteria.include(), criteria.exclude());
    info!(labels = ?policy.include(), "Including labels");
    if !policy.exclude().is_empty() {
        info!(labels = ?policy.exclude(), "Excluding labels");
    }
    let projector = Projector::new(policy);
    let selector = Selector::new(criteria);

    let (records, received) = sync_channel::<Record>(0);

    thread::scope(|scope| -> Result<ExportSummary> {
        let sink = scope.spawn(move || sink::stream(received, format, out));

        // `records` moves in and is dropped on return, ending the stream.
        let produced = produce(storage, criteria, &selector, &projector, records);

        let written = match sink.join() {
            Ok(written) => written,
            Err(panic) => std::panic::resume_unwind(panic),
        };

        let mut summary = produced?;
        summary.records_exported = written?;

        info!(
            series_matched = summary.series_matched,
            series_rejected = summary.series_rejected,
            records = summary.records_exported,
            nan_dropped = summary.nan_dropped,
            format = %format,
            "Export finished"
        );
        Ok(summary)
    })
}

fn produce(
    storage: &dyn Storage,
    criteria: &SelectionCriteria,
    selector: &Selector,
    projector: &Projector,
    records: SyncSender<Record>,
) -> Result<ExportSummary> {
    let mut summary = ExportSummary::default();
    let querier = storage.querier(criteria.min_t(), criteria.max_t())?;

    selector.select(querier.as_ref(), |series| {
        summary.series_matched += 1;
        match projector.emit(series, &records) {
            Outcome::Rejected(_) => {
                summary.series_rejected += 1;
                ControlFlow::Continue(())
            }
            Outcome::Emitted(stats) => {
                summary.add(stats);
                ControlFlow::Continue(())
            }
            Outcome::SinkClosed(stats) => {
                summary.add(stats);
                ControlFlow::Break(())
            }
        }
    })?;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExportError, SinkError};
    use crate::labels::Labels;
    use crate::storage::memory::MemoryStorage;
    use std::io;

    fn storage() -> MemoryStorage {
        let mut storage = MemoryStorage::new();
        storage
            .insert(
                Labels::from_pairs([("__name__", "up"), ("job", "api")]),
                vec![(1, 1.0), (2, f64::NAN), (3, 0.0)],
            )
            .unwrap();
        storage
            .insert(
                Labels::from_pairs([("__name__", "up"), ("zone", "eu")]),
                vec![(1, 1.0)],
            )
            .unwrap();
        storage
    }

    #[test]
    fn test_summary_counts() {
        let storage = storage();
        let criteria = SelectionCriteria::new(0, 10)
            .unwrap()
            .with_metric_names(["up"])
            .with_include(["job"]);
        let mut out = Vec::new();
        let summary = export(&storage, &criteria, Format::Csv, &mut out).unwrap();

        assert_eq!(
            summary,
            ExportSummary {
                series_matched: 2,
                series_rejected: 1,
                records_exported: 2,
                nan_dropped: 1,
            }
        );
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "__name__,__time__,__value__,job\nup,1,1.000000,api\nup,3,0.000000,api\n"
        );
    }

    #[test]
    fn test_no_names_no_filters_is_noop() {
        let storage = storage();
        let criteria = SelectionCriteria::new(0, 10).unwrap();
        let mut out = Vec::new();
        let summary = export(&storage, &criteria, Format::Json, &mut out).unwrap();

        assert_eq!(summary, ExportSummary::default());
        assert!(out.is_empty());
        assert_eq!(storage.select_calls(), 0);
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_error_surfaces() {
        let storage = storage();
        let criteria = SelectionCriteria::new(0, 10)
            .unwrap()
            .with_metric_names(["up"]);
        let err = export(&storage, &criteria, Format::Json, FailingWriter).unwrap_err();
        assert!(matches!(err, ExportError::Sink(SinkError::Json(_) | SinkError::Io(_))));
    }
}
