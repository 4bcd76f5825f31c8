//! Applies the label policy to each series and feeds its samples to the sink.

use std::sync::mpsc::SyncSender;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::policy::{LabelPolicy, Rejection};
use crate::record::Record;
use crate::storage::Series;

/// Counts for one series handed to [`Projector::emit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesStats {
    /// Records accepted by the sink.
    pub records: u64,
    /// Samples skipped because their value was NaN.
    pub nan_dropped: u64,
}

/// What happened to a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The policy rejected the series; nothing was sent.
    Rejected(Rejection),
    /// Every sample in the window was processed.
    Emitted(SeriesStats),
    /// The sink hung up part way. Counts cover what was sent before that.
    SinkClosed(SeriesStats),
}

/// Turns series into records according to a [`LabelPolicy`].
#[derive(Debug, Clone)]
pub struct Projector {
    policy: LabelPolicy,
}

impl Projector {
    /// Creates a projector for `policy`.
    pub fn new(policy: LabelPolicy) -> Self {
        Self { policy }
    }

    /// The policy in use.
    pub fn policy(&self) -> &LabelPolicy {
        &self.policy
    }

    /// Projects `series` and sends one record per non-NaN sample.
    ///
    /// Sends block until the sink takes the record. All records of a series
    /// share one name and one label map.
    pub fn emit(&self, series: &dyn Series, records: &SyncSender<Record>) -> Outcome {
        let projection = match self.policy.project(series.labels()) {
            Ok(projection) => projection,
            Err(rejection) => {
                debug!(
                    include = ?self.policy.include(),
                    exclude = ?self.policy.exclude(),
                    labels = %series.labels(),
                    "Skipping series: {rejection}"
                );
                return Outcome::Rejected(rejection);
            }
        };

        let metric_name: Arc<str> = Arc::from(projection.metric_name);
        let labels = Arc::new(projection.labels);
        let mut stats = SeriesStats::default();

        for (timestamp, value) in series.samples() {
            if value.is_nan() {
                stats.nan_dropped += 1;
                continue;
            }
            let record = Record {
                metric_name: Arc::clone(&metric_name),
                labels: Arc::clone(&labels),
                timestamp,
                value,
            };
            if records.send(record).is_err() {
                return Outcome::SinkClosed(stats);
            }
            stats.records += 1;
        }

        trace!(
            labels = %series.labels(),
            records = stats.records,
            nan_dropped = stats.nan_dropped,
            "Series exported"
        );
        Outcome::Emitted(stats)
    }
}
