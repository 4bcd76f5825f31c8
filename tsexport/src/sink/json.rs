//! JSON lines encoder.

use std::collections::BTreeMap;
use std::io::Write;

use crate::error::SinkError;
use crate::labels::{METRIC_NAME_LABEL, TIME_COLUMN, VALUE_COLUMN};
use crate::record::{format_timestamp, format_value, Record};
use crate::sink::RecordEncoder;

/// Writes each record as one JSON object followed by `\n`.
///
/// Every value is a string. Keys are sorted, so `__name__`, `__time__` and
/// `__value__` come before lowercase label names. The object is a borrowed
/// view built per line; the record's shared label map is left untouched.
#[derive(Debug)]
pub struct JsonLinesEncoder<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesEncoder<W> {
    /// Wraps a byte sink.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordEncoder for JsonLinesEncoder<W> {
    fn write_record(&mut self, record: &Record) -> Result<(), SinkError> {
        let time = format_timestamp(record.timestamp);
        let value = format_value(record.value);

        let mut line: BTreeMap<&str, &str> = record
            .labels
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        line.insert(METRIC_NAME_LABEL, &record.metric_name);
        line.insert(TIME_COLUMN, &time);
        line.insert(VALUE_COLUMN, &value);

        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn finish(mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn encode(records: &[Record]) -> String {
        let mut encoder = JsonLinesEncoder::new(Vec::new());
        for record in records {
            encoder.write_record(record).unwrap();
        }
        String::from_utf8(encoder.into_inner()).unwrap()
    }

    #[test]
    fn test_labels_and_reserved_keys() {
        let out = encode(&[Record::new(
            "http_requests_total",
            [("job", "api"), ("code", "200")],
            1_700_000_000_123,
            42.5,
        )]);
        assert_eq!(
            out,
            "{\"__name__\":\"http_requests_total\",\"__time__\":\"1700000000123\",\
             \"__value__\":\"42.500000\",\"code\":\"200\",\"job\":\"api\"}\n"
        );
    }

    #[test]
    fn test_line_decodes_to_exact_key_set() {
        let out = encode(&[Record::new("up", [("instance", "a:1")], 7, 0.0)]);
        let decoded: BTreeMap<String, String> = serde_json::from_str(out.trim_end()).unwrap();
        let expected: BTreeMap<String, String> = [
            ("__name__", "up"),
            ("__time__", "7"),
            ("__value__", "0.000000"),
            ("instance", "a:1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_one_line_per_record() {
        let first = Record::new("up", [("job", "api")], 1, 1.0);
        let second = Record {
            timestamp: 2,
            value: 0.0,
            ..first.clone()
        };
        let out = encode(&[first, second]);
        assert_eq!(out.lines().count(), 2);
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn test_shared_labels_not_mutated() {
        let record = Record::new("up", [("job", "api")], 1, 1.0);
        let labels = Arc::clone(&record.labels);
        encode(&[record]);
        assert_eq!(labels.len(), 1);
        assert!(!labels.contains_key("__name__"));
    }

    #[test]
    fn test_string_escaping() {
        let out = encode(&[Record::new("m", [("path", "C:\\tmp \"x\"")], 1, 1.0)]);
        let decoded: BTreeMap<String, String> = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(decoded["path"], "C:\\tmp \"x\"");
    }
}
