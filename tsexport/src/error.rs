//! Error types for the tsexport pipeline.

use thiserror::Error;

/// The main error type for all export operations.
///
/// Every failure is either caught before extraction starts (configuration)
/// or fatal to the whole run (storage, sink). A series rejected by the label
/// policy is not an error and never shows up here.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Invalid user-supplied configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failure in the storage layer (open, query, chunk decoding).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Failure while serializing or writing records.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Errors detected before any extraction begins.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A time bound is not a valid RFC 3339 timestamp.
    #[error("bad value for {field} (RFC 3339): '{value}': {source}")]
    InvalidTimestamp {
        /// Which bound was malformed (`mint` or `maxt`).
        field: &'static str,
        /// The raw value supplied.
        value: String,
        /// The underlying parse error.
        #[source]
        source: chrono::ParseError,
    },

    /// The lower time bound is after the upper one.
    #[error("min time {min_t} cannot be after max time {max_t}")]
    InvertedTimeRange {
        /// Lower bound in milliseconds.
        min_t: i64,
        /// Upper bound in milliseconds.
        max_t: i64,
    },

    /// The requested output format is not registered.
    #[error("invalid output format '{format}': expected one of {available}")]
    UnknownFormat {
        /// The requested format name.
        format: String,
        /// Comma-separated list of supported names.
        available: String,
    },

    /// Wildcard label export was combined with a fixed-schema format.
    #[error("cannot use {format} format with wildcard label export")]
    WildcardWithTabular {
        /// The fixed-schema format name.
        format: &'static str,
    },

    /// The database directory does not exist or cannot be read.
    #[error("the database path '{path}' cannot be accessed")]
    DatabaseInaccessible {
        /// The configured path.
        path: String,
    },

    /// A `label:value` filter could not be parsed.
    #[error("wrong filter value '{filter}': {reason}")]
    MalformedFilter {
        /// The raw filter expression.
        filter: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The output file could not be created.
    #[error("failed to create output file '{path}': {source}")]
    OutputOpen {
        /// The output path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The store directory or one of its files could not be accessed.
    #[error("failed to access '{path}': {source}")]
    DirectoryAccess {
        /// The path that could not be accessed.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The metadata or series index is inconsistent.
    #[error("corrupted metadata: {reason}")]
    CorruptedMetadata {
        /// Description of what was invalid.
        reason: String,
    },

    /// Failed to (de)serialize metadata or the series index.
    #[error("failed to (de)serialize metadata: {0}")]
    MetadataSerialize(#[from] serde_json::Error),

    /// A chunk file could not be opened or mapped.
    #[error("failed to read chunk '{path}': {source}")]
    ChunkRead {
        /// The chunk file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A chunk file has an invalid header or size.
    #[error("chunk '{path}' is corrupted: {reason}")]
    CorruptedChunk {
        /// The chunk file path.
        path: String,
        /// Description of the corruption.
        reason: String,
    },

    /// Another process holds the store lock.
    #[error("store '{path}' is locked by another process")]
    StoreLocked {
        /// The store directory.
        path: String,
    },

    /// The writer target already holds a store.
    #[error("a store already exists at '{path}'")]
    StoreExists {
        /// The store directory.
        path: String,
    },

    /// A querier was requested with `min_t > max_t`.
    #[error("invalid time range: start {min_t} > end {max_t}")]
    InvalidTimeRange {
        /// Lower bound in milliseconds.
        min_t: i64,
        /// Upper bound in milliseconds.
        max_t: i64,
    },

    /// A series with the same label set was already written.
    #[error("series with labels {labels} is already present")]
    DuplicateSeries {
        /// The conflicting label set.
        labels: String,
    },

    /// Samples handed to the writer were not time-ordered.
    #[error("sample at {timestamp} precedes previous sample at {previous} in series {labels}")]
    OutOfOrderSample {
        /// The offending series.
        labels: String,
        /// Timestamp of the previous sample.
        previous: i64,
        /// Timestamp that went backwards.
        timestamp: i64,
    },
}

/// Errors raised while encoding and writing records.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Writing to the byte sink failed.
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV writer failed.
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization failed.
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Type alias for `Result<T, ExportError>`.
pub type Result<T> = std::result::Result<T, ExportError>;
