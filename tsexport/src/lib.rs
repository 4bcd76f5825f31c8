//! # tsexport
//!
//! Streaming exporter for time-series databases.
//!
//! tsexport selects series from a storage engine by metric name and label
//! filters, reshapes each series' labels through an include/exclude policy,
//! and streams every observation in a time window to JSON lines or CSV.
//!
//! ## Key Properties
//!
//! - One producer and one consumer joined by a zero-capacity channel, so at
//!   most one record is in flight
//! - Deterministic output: label keys are sorted in every format
//! - NaN samples are dropped; infinities are written as `+Inf` / `-Inf`
//! - All configuration errors are caught before any output is produced
//!
//! ## Quick Start
//!
//! ```rust
//! use tsexport::criteria::SelectionCriteria;
//! use tsexport::labels::Labels;
//! use tsexport::sink::Format;
//! use tsexport::storage::memory::MemoryStorage;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut storage = MemoryStorage::new();
//! storage.insert(
//!     Labels::from_pairs([("__name__", "cpu_usage"), ("host", "web1"), ("pod", "p-17")]),
//!     vec![(1_700_000_000_000, 85.5), (1_700_000_001_000, f64::NAN)],
//! )?;
//!
//! let criteria = SelectionCriteria::new(0, i64::MAX)?
//!     .with_metric_names(["cpu_usage"])
//!     .with_include(["host"]);
//!
//! let mut out = Vec::new();
//! let summary = tsexport::export(&storage, &criteria, Format::Csv, &mut out)?;
//!
//! assert_eq!(summary.nan_dropped, 1);
//! assert_eq!(
//!     String::from_utf8(out)?,
//!     "__name__,__time__,__value__,host\ncpu_usage,1700000000000,85.500000,web1\n"
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`selector`]: turns criteria into one storage query per metric name
//! - [`projector`]: applies the [`LabelPolicy`] and emits [`Record`]s
//! - [`sink`]: encodes records as JSON lines or CSV
//! - [`pipeline`]: runs the three over a bounded hand-off channel
//!
//! ## Modules
//!
//! - [`storage`]: storage traits, the on-disk block store, an in-memory store
//! - [`config`]: validated configuration from raw command-line values
//! - [`criteria`], [`labels`], [`policy`], [`record`]: data model
//! - [`error`]: error types

pub mod config;
pub mod criteria;
pub mod error;
pub mod labels;
pub mod pipeline;
pub mod policy;
pub mod projector;
pub mod record;
pub mod selector;
pub mod sink;
pub mod storage;

// Re-export primary API types at crate root for convenience.
pub use config::ExportConfig;
pub use criteria::{LabelFilter, SelectionCriteria};
pub use error::{ExportError, Result};
pub use labels::{Labels, Matcher};
pub use pipeline::{export, ExportSummary};
pub use policy::LabelPolicy;
pub use record::Record;
pub use sink::Format;
pub use storage::block::{BlockStore, BlockWriter};
