//! Export configuration built from raw command-line values.
//!
//! Everything here runs before extraction starts, so a bad flag never
//! produces partial output.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use chrono::DateTime;

use crate::criteria::{LabelFilter, SelectionCriteria};
use crate::error::{ConfigError, Result};
use crate::sink::Format;
use crate::storage::block::{BlockStore, OpenOptions};

/// Default lower time bound.
pub const DEFAULT_MIN_TIME: &str = "1970-01-01T00:00:00Z";

/// Default upper time bound.
pub const DEFAULT_MAX_TIME: &str = "2050-01-01T00:00:00Z";

/// Default database directory.
pub const DEFAULT_DB_PATH: &str = "/data/tsdb";

/// Output path meaning standard output.
pub const STDOUT_TARGET: &str = "-";

/// Parses an RFC 3339 timestamp into milliseconds since the Unix epoch.
///
/// Sub-millisecond precision is truncated.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidTimestamp`] naming `field` if `value` is not
/// valid RFC 3339.
pub fn parse_timestamp(field: &'static str, value: &str) -> std::result::Result<i64, ConfigError> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.timestamp_millis())
        .map_err(|source| ConfigError::InvalidTimestamp {
            field,
            value: value.to_string(),
            source,
        })
}

/// Where export output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Standard output.
    Stdout,
    /// A file, created or truncated.
    File(PathBuf),
}

impl From<&str> for OutputTarget {
    fn from(value: &str) -> Self {
        if value == STDOUT_TARGET {
            OutputTarget::Stdout
        } else {
            OutputTarget::File(PathBuf::from(value))
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Stdout => f.write_str("stdout"),
            OutputTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Unvalidated options, as strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOptions {
    /// Output format name.
    pub format: String,
    /// RFC 3339 lower bound.
    pub min_time: String,
    /// RFC 3339 upper bound.
    pub max_time: String,
    /// Metric names to export.
    pub metric_names: Vec<String>,
    /// `label:value` filters.
    pub filters: Vec<String>,
    /// Database directory.
    pub db_path: String,
    /// Output path, `-` for stdout.
    pub output: String,
    /// Labels to include; empty means all.
    pub include: Vec<String>,
    /// Labels to exclude.
    pub exclude: Vec<String>,
    /// Hold the store lock file while exporting.
    pub lockfile: bool,
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            format: Format::default().name().to_string(),
            min_time: DEFAULT_MIN_TIME.to_string(),
            max_time: DEFAULT_MAX_TIME.to_string(),
            metric_names: Vec::new(),
            filters: Vec::new(),
            db_path: DEFAULT_DB_PATH.to_string(),
            output: STDOUT_TARGET.to_string(),
            include: Vec::new(),
            exclude: Vec::new(),
            lockfile: false,
        }
    }
}

/// Validated export configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// Database directory.
    pub db_path: PathBuf,
    /// Output format.
    pub format: Format,
    /// Output destination.
    pub output: OutputTarget,
    /// What to select and which labels to export.
    pub criteria: SelectionCriteria,
    /// Hold the store lock file while exporting.
    pub lockfile: bool,
}

impl ExportConfig {
    /// Parses and validates raw options.
    ///
    /// Checks run in this order: time bounds and range, format, filters,
    /// then [`ExportConfig::validate`].
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tsexport::config::{ExportConfig, RawOptions};
    /// use tsexport::error::{ConfigError, ExportError};
    ///
    /// let raw = RawOptions {
    ///     format: "csv".to_string(),
    ///     db_path: std::env::temp_dir().display().to_string(),
    ///     ..RawOptions::default()
    /// };
    /// let err = ExportConfig::from_raw(raw).unwrap_err();
    /// assert!(matches!(err, ExportError::Config(ConfigError::WildcardWithTabular { .. })));
    /// ```
    pub fn from_raw(raw: RawOptions) -> Result<Self> {
        let min_t = parse_timestamp("mint", &raw.min_time)?;
        let max_t = parse_timestamp("maxt", &raw.max_time)?;
        let criteria = SelectionCriteria::new(min_t, max_t)?;

        let format: Format = raw.format.parse()?;

        let filters = raw
            .filters
            .iter()
            .map(|filter| filter.parse::<LabelFilter>())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let config = Self {
            db_path: PathBuf::from(&raw.db_path),
            format,
            output: OutputTarget::from(raw.output.as_str()),
            criteria: criteria
                .with_metric_names(raw.metric_names)
                .with_filters(filters)
                .with_include(raw.include)
                .with_exclude(raw.exclude),
            lockfile: raw.lockfile,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the cross-field rules.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvertedTimeRange`] if the window is inverted
    /// - [`ConfigError::WildcardWithTabular`] for wildcard include with a
    ///   tabular format
    /// - [`ConfigError::DatabaseInaccessible`] if the database path is not a
    ///   readable directory
    pub fn validate(&self) -> Result<()> {
        let (min_t, max_t) = (self.criteria.min_t(), self.criteria.max_t());
        if min_t > max_t {
            return Err(ConfigError::InvertedTimeRange { min_t, max_t }.into());
        }
        if self.format.is_tabular() && self.criteria.includes_all() {
            return Err(ConfigError::WildcardWithTabular {
                format: self.format.name(),
            }
            .into());
        }
        let accessible = std::fs::metadata(&self.db_path).is_ok_and(|meta| meta.is_dir());
        if !accessible {
            return Err(ConfigError::DatabaseInaccessible {
                path: self.db_path.display().to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Opens the configured output behind a `BufWriter`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutputOpen`] if the file cannot be created.
    pub fn open_output(&self) -> Result<Box<dyn Write + Send>> {
        match &self.output {
            OutputTarget::Stdout => Ok(Box::new(BufWriter::new(io::stdout()))),
            OutputTarget::File(path) => {
                let file = File::create(path).map_err(|source| ConfigError::OutputOpen {
                    path: path.display().to_string(),
                    source,
                })?;
                Ok(Box::new(BufWriter::new(file)))
            }
        }
    }

    /// Opens the block store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be opened or is locked.
    pub fn open_store(&self) -> Result<BlockStore> {
        BlockStore::open(
            &self.db_path,
            OpenOptions {
                lockfile: self.lockfile,
            },
        )
    }
}
