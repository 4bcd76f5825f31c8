//! The unit flowing from the projector to the sink.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Exported label mapping, ordered by key.
///
/// The ordering fixes the CSV column order and the key order inside every
/// JSON line, so identical inputs produce byte-identical output.
pub type ExportedLabels = BTreeMap<String, String>;

/// One exported observation.
///
/// The name and label mapping are reference-counted and shared by every
/// record produced from the same series. Encoders only read through them.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Resolved metric name, empty when the series carries no `__name__`.
    pub metric_name: Arc<str>,
    /// Labels left after include/exclude filtering.
    pub labels: Arc<ExportedLabels>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Sample value, never NaN.
    pub value: f64,
}

impl Record {
    /// Convenience constructor that allocates fresh shared parts.
    pub fn new<I, K, V>(metric_name: &str, labels: I, timestamp: i64, value: f64) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            metric_name: Arc::from(metric_name),
            labels: Arc::new(
                labels
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            timestamp,
            value,
        }
    }
}

/// Formats a timestamp as a plain decimal integer.
pub fn format_timestamp(timestamp: i64) -> String {
    timestamp.to_string()
}

/// Formats a value in fixed-point notation with six fractional digits.
///
/// Integral values still get the fractional part (`1.000000`). Infinities
/// render as `+Inf` and `-Inf`.
pub fn format_value(value: f64) -> String {
    if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else {
        format!("{value:.6}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value_fixed_point() {
        assert_eq!(format_value(1.0), "1.000000");
        assert_eq!(format_value(0.1234567), "0.123457");
        assert_eq!(format_value(-2.5), "-2.500000");
        assert_eq!(format_value(1e-9), "0.000000");
        assert_eq!(format_value(1e21), "1000000000000000000000.000000");
    }

    #[test]
    fn test_format_value_infinities() {
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(1), "1");
        assert_eq!(format_timestamp(-1500), "-1500");
        assert_eq!(format_timestamp(1_700_000_000_000), "1700000000000");
    }

    #[test]
    fn test_records_share_labels() {
        let record = Record::new("up", [("job", "api")], 1, 1.0);
        let next = Record {
            timestamp: 2,
            ..record.clone()
        };
        assert!(Arc::ptr_eq(&record.labels, &next.labels));
    }
}
