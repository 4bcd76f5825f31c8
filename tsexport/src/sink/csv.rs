//! CSV encoder.
//!
//! The column set is discovered from the first record: the three reserved
//! columns followed by that record's label keys in sorted order. Every later
//! record is projected onto those columns. Labels outside the header are
//! dropped and missing ones are written as empty fields.

use std::io::Write;

use crate::error::SinkError;
use crate::labels::{METRIC_NAME_LABEL, TIME_COLUMN, VALUE_COLUMN};
use crate::record::{format_timestamp, format_value, Record};
use crate::sink::RecordEncoder;

const FIXED_COLUMNS: [&str; 3] = [METRIC_NAME_LABEL, TIME_COLUMN, VALUE_COLUMN];

/// Writes records as CSV rows under a header fixed by the first record.
///
/// Nothing is written, not even the header, until the first record arrives.
pub struct CsvEncoder<W: Write> {
    writer: csv::Writer<W>,
    columns: Option<Vec<String>>,
}

impl<W: Write> CsvEncoder<W> {
    /// Wraps a byte sink. Rows are terminated by `\n`.
    pub fn new(out: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(out);
        Self {
            writer,
            columns: None,
        }
    }

    /// Label columns after the reserved ones, once the header is known.
    pub fn label_columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    fn header_for(&mut self, record: &Record) -> Result<(), SinkError> {
        let columns: Vec<String> = record.labels.keys().cloned().collect();
        self.writer.write_record(
            FIXED_COLUMNS
                .iter()
                .copied()
                .chain(columns.iter().map(String::as_str)),
        )?;
        self.columns = Some(columns);
        Ok(())
    }
}

impl<W: Write> RecordEncoder for CsvEncoder<W> {
    fn write_record(&mut self, record: &Record) -> Result<(), SinkError> {
        if self.columns.is_none() {
            self.header_for(record)?;
        }
        let columns = self.columns.as_deref().unwrap_or_default();

        let time = format_timestamp(record.timestamp);
        let value = format_value(record.value);
        let labels = columns.iter().map(|column| {
            record
                .labels
                .get(column)
                .map(String::as_str)
                .unwrap_or_default()
        });

        self.writer.write_record(
            [record.metric_name.as_ref(), time.as_str(), value.as_str()]
                .into_iter()
                .chain(labels),
        )?;
        Ok(())
    }

    fn finish(mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(records: &[Record]) -> String {
        let mut out = Vec::new();
        {
            let mut encoder = CsvEncoder::new(&mut out);
            for record in records {
                encoder.write_record(record).unwrap();
            }
            encoder.finish().unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_header_from_first_record() {
        let out = encode(&[Record::new("up", [("job", "api"), ("instance", "a:1")], 1, 1.0)]);
        assert_eq!(
            out,
            "__name__,__time__,__value__,instance,job\nup,1,1.000000,a:1,api\n"
        );
    }

    #[test]
    fn test_later_records_projected_onto_header() {
        let out = encode(&[
            Record::new("up", [("job", "api"), ("pod", "p1")], 1, 1.0),
            Record::new("up", [("job", "db"), ("zone", "eu")], 2, 0.0),
            Record::new("up", [("pod", "p2")], 3, 0.5),
        ]);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(
            lines,
            [
                "__name__,__time__,__value__,job,pod",
                "up,1,1.000000,api,p1",
                "up,2,0.000000,db,",
                "up,3,0.500000,,p2",
            ]
        );
    }

    #[test]
    fn test_empty_input_writes_nothing() {
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn test_fields_are_quoted_when_needed() {
        let out = encode(&[Record::new("m", [("path", "a,b"), ("msg", "say \"hi\"")], 1, 1.0)]);
        let mut reader = csv::Reader::from_reader(out.as_bytes());
        let header: Vec<String> = reader
            .headers()
            .unwrap()
            .iter()
            .map(str::to_string)
            .collect();
        assert_eq!(header, ["__name__", "__time__", "__value__", "msg", "path"]);
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[3], "say \"hi\"");
        assert_eq!(&row[4], "a,b");
    }

    #[test]
    fn test_columns_fixed_after_first_record() {
        let mut encoder = CsvEncoder::new(Vec::new());
        assert!(encoder.label_columns().is_none());
        encoder
            .write_record(&Record::new("m", [("b", "1"), ("a", "2")], 1, 1.0))
            .unwrap();
        assert_eq!(
            encoder.label_columns().unwrap(),
            ["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_infinities() {
        let out = encode(&[
            Record::new("m", Vec::<(String, String)>::new(), 1, f64::INFINITY),
            Record::new("m", Vec::<(String, String)>::new(), 2, f64::NEG_INFINITY),
        ]);
        assert!(out.contains("m,1,+Inf\n"));
        assert!(out.contains("m,2,-Inf\n"));
    }
}
