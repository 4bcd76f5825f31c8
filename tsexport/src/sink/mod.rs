//! Output formats and the consuming end of the pipeline.
//!
//! Formats are a closed set dispatched with a `match`. A new format is a new
//! [`Format`] variant plus a [`RecordEncoder`] implementation.

pub mod csv;
pub mod json;

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::mpsc::Receiver;

use crate::error::{ConfigError, SinkError};
use crate::record::Record;

pub use self::csv::CsvEncoder;
pub use self::json::JsonLinesEncoder;

/// Incremental serializer for a stream of records.
pub trait RecordEncoder {
    /// Encodes one record.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if serialization or the underlying write fails.
    fn write_record(&mut self, record: &Record) -> Result<(), SinkError>;

    /// Flushes buffered output. Called once, after the last record.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the flush fails.
    fn finish(self) -> Result<(), SinkError>;
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    /// One JSON object per line.
    #[default]
    Json,
    /// Comma-separated values with a header discovered from the first record.
    Csv,
}

impl Format {
    /// Every supported format, in help-text order.
    pub const ALL: [Format; 2] = [Format::Json, Format::Csv];

    /// The name used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Csv => "csv",
        }
    }

    /// Whether the format needs a single column set for the whole export.
    pub fn is_tabular(self) -> bool {
        matches!(self, Format::Csv)
    }

    /// Comma-separated list of format names.
    pub fn names() -> String {
        Self::ALL
            .iter()
            .map(|format| format.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.name() == s)
            .ok_or_else(|| ConfigError::UnknownFormat {
                format: s.to_string(),
                available: Self::names(),
            })
    }
}

/// Consumes records until the sender side is dropped, encoding each one.
///
/// Returns the number of records written. Output is flushed before
/// returning, including when the channel delivered nothing.
///
/// # Errors
///
/// Returns the first [`SinkError`] raised by the encoder. The receiver is
/// dropped on error, so a blocked producer observes a closed channel.
pub fn stream<W: Write>(records: Receiver<Record>, format: Format, out: W) -> Result<u64, SinkError> {
    match format {
        Format::Json => drain(records, JsonLinesEncoder::new(out)),
        Format::Csv => drain(records, CsvEncoder::new(out)),
    }
}

fn drain<E: RecordEncoder>(records: Receiver<Record>, mut encoder: E) -> Result<u64, SinkError> {
    let mut written = 0;
    for record in records {
        encoder.write_record(&record)?;
        written += 1;
    }
    encoder.finish()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    fn run(format: Format, records: Vec<Record>) -> String {
        let (tx, rx) = sync_channel(records.len());
        for record in records {
            tx.send(record).unwrap();
        }
        drop(tx);

        let mut out = Vec::new();
        stream(rx, format, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_format_names() {
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("csv".parse::<Format>().unwrap(), Format::Csv);
        assert_eq!(Format::default(), Format::Json);
        assert_eq!(Format::names(), "json, csv");
        assert_eq!(Format::Csv.to_string(), "csv");
        assert!(Format::Csv.is_tabular());
        assert!(!Format::Json.is_tabular());
    }

    #[test]
    fn test_unknown_format() {
        let err = "parquet".parse::<Format>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFormat { ref format, .. } if format == "parquet"));
        assert!(err.to_string().contains("json, csv"));
    }

    #[test]
    fn test_single_record_json() {
        let out = run(Format::Json, vec![Record::new("a", Vec::<(String, String)>::new(), 1, 1.0)]);
        assert_eq!(out, "{\"__name__\":\"a\",\"__time__\":\"1\",\"__value__\":\"1.000000\"}\n");
    }

    #[test]
    fn test_single_record_csv() {
        let out = run(Format::Csv, vec![Record::new("a", Vec::<(String, String)>::new(), 1, 1.0)]);
        assert_eq!(out, "__name__,__time__,__value__\na,1,1.000000\n");
    }

    #[test]
    fn test_empty_stream() {
        assert_eq!(run(Format::Json, vec![]), "");
        assert_eq!(run(Format::Csv, vec![]), "");
    }

    #[test]
    fn test_stream_counts_records() {
        let (tx, rx) = sync_channel(3);
        for t in 0..3 {
            tx.send(Record::new("a", [("job", "api")], t, 0.5)).unwrap();
        }
        drop(tx);
        let mut out = Vec::new();
        assert_eq!(stream(rx, Format::Csv, &mut out).unwrap(), 3);
    }
}
