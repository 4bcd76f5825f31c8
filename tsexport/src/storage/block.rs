//! On-disk block storage backend.
//!
//! A block store is a directory holding a series index and one chunk file
//! per series. Chunks are memory-mapped and decoded lazily, only for series
//! that a query actually matches.
//!
//! # File Layout
//!
//! ```text
//! store_dir/
//! ├── meta.json            <- Format version and series count
//! ├── series_index.json    <- Series ids and label sets, sorted by labels
//! ├── LOCK                 <- Present while a locking reader holds the store
//! └── chunks/
//!     ├── 0.chunk          <- Samples of series 0
//!     └── N.chunk
//! ```
//!
//! # Chunk Format
//!
//! All integers are little-endian.
//!
//! ```text
//! [0..4)     Magic bytes "TSXC"
//! [4..8)     Format version (u32)
//! [8..16)    Sample count (u64)
//! [16..)     Samples: timestamp_ms (i64) + value bits (u64), 16 bytes each
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use tsexport::labels::Labels;
//! use tsexport::storage::block::{BlockStore, BlockWriter, OpenOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = BlockWriter::create("./metrics_db")?;
//! writer.add_series(
//!     Labels::from_pairs([("__name__", "up"), ("job", "api")]),
//!     &[(1_700_000_000_000, 1.0), (1_700_000_015_000, 1.0)],
//! )?;
//! writer.finish()?;
//!
//! let store = BlockStore::open("./metrics_db", OpenOptions::default())?;
//! println!("{} series", store.series_count());
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::labels::{Labels, Matcher};
use crate::storage::{matches_all, Querier, Samples, Series, SeriesSet, Storage};

/// Metadata file format version.
const METADATA_VERSION: u32 = 1;

/// Name of the metadata file in the store directory.
const METADATA_FILE: &str = "meta.json";

/// Name of the series index file in the store directory.
const SERIES_INDEX_FILE: &str = "series_index.json";

/// Directory holding chunk files.
const CHUNK_DIR: &str = "chunks";

/// Lock file name.
const LOCK_FILE: &str = "LOCK";

/// Magic bytes identifying a chunk file.
const CHUNK_MAGIC: [u8; 4] = *b"TSXC";

/// Current chunk format version.
const CHUNK_VERSION: u32 = 1;

/// Size of the chunk header in bytes.
const HEADER_SIZE: usize = 16;

/// Size of one encoded sample in bytes.
const SAMPLE_SIZE: usize = 16;

/// Contents of `meta.json`.
#[derive(Debug, Serialize, Deserialize)]
struct StoreMetadata {
    /// Metadata format version.
    version: u32,
    /// Number of series in the index.
    series_count: usize,
}

/// One entry of `series_index.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    /// Chunk file id.
    id: u32,
    /// Full label set.
    labels: Labels,
}

/// Options controlling how a store is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Take an exclusive `LOCK` file for the lifetime of the handle.
    ///
    /// Off by default: exports are read-only and commonly run next to the
    /// process that owns the store.
    pub lockfile: bool,
}

/// Removes the lock file when dropped.
#[derive(Debug)]
struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    fn acquire(store_path: &Path) -> Result<Self> {
        let path = store_path.join(LOCK_FILE);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StorageError::StoreLocked {
                    path: store_path.display().to_string(),
                },
                _ => StorageError::DirectoryAccess {
                    path: path.display().to_string(),
                    source: e,
                },
            })?;
        // The pid is informational only.
        let _ = writeln!(file, "{}", std::process::id());
        Ok(Self { path })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Read handle on a block store directory.
#[derive(Debug)]
pub struct BlockStore {
    /// Path to the store directory.
    path: PathBuf,
    /// Series index, sorted by labels.
    index: Vec<IndexEntry>,
    /// Held for the lifetime of the handle when locking was requested.
    _lock: Option<LockGuard>,
}

impl BlockStore {
    /// Opens an existing store.
    ///
    /// Reads and validates `meta.json` and the series index. Chunk files are
    /// not touched until a query matches their series.
    ///
    /// # Errors
    ///
    /// - [`StorageError::DirectoryAccess`] if the directory or its files cannot be read
    /// - [`StorageError::CorruptedMetadata`] on version or count mismatches
    /// - [`StorageError::MetadataSerialize`] if the JSON files are malformed
    /// - [`StorageError::StoreLocked`] if locking was requested and the lock is held
    pub fn open<P: AsRef<Path>>(path: P, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let metadata: StoreMetadata = read_json(&path.join(METADATA_FILE))?;
        if metadata.version != METADATA_VERSION {
            return Err(StorageError::CorruptedMetadata {
                reason: format!(
                    "unsupported metadata version: expected {}, found {}",
                    METADATA_VERSION, metadata.version
                ),
            }
            .into());
        }

        let mut index: Vec<IndexEntry> = read_json(&path.join(SERIES_INDEX_FILE))?;
        if index.len() != metadata.series_count {
            return Err(StorageError::CorruptedMetadata {
                reason: format!(
                    "series count mismatch: meta.json has {}, index has {}",
                    metadata.series_count,
                    index.len()
                ),
            }
            .into());
        }
        if let Some(entry) = index.iter().find(|entry| !entry.labels.is_sorted_unique()) {
            return Err(StorageError::CorruptedMetadata {
                reason: format!("series {} has unsorted or duplicate labels", entry.id),
            }
            .into());
        }
        index.sort_by(|a, b| a.labels.cmp(&b.labels));

        let lock = if options.lockfile {
            Some(LockGuard::acquire(&path)?)
        } else {
            None
        };

        tracing::debug!(path = %path.display(), series = index.len(), "opened block store");

        Ok(Self {
            path,
            index,
            _lock: lock,
        })
    }

    /// Number of series in the store.
    pub fn series_count(&self) -> usize {
        self.index.len()
    }

    /// Iterates the label sets of all series, in label order.
    pub fn series_labels(&self) -> impl Iterator<Item = &Labels> {
        self.index.iter().map(|entry| &entry.labels)
    }

    /// Returns the path to the store directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn chunk_path(&self, id: u32) -> PathBuf {
        chunk_path(&self.path, id)
    }
}

impl Storage for BlockStore {
    fn querier(&self, min_t: i64, max_t: i64) -> Result<Box<dyn Querier + '_>> {
        if min_t > max_t {
            return Err(StorageError::InvalidTimeRange { min_t, max_t }.into());
        }
        Ok(Box::new(BlockQuerier {
            store: self,
            min_t,
            max_t,
        }))
    }
}

struct BlockQuerier<'a> {
    store: &'a BlockStore,
    min_t: i64,
    max_t: i64,
}

impl Querier for BlockQuerier<'_> {
    fn select(&self, matchers: &[Matcher]) -> Result<SeriesSet<'_>> {
        let matchers = matchers.to_vec();
        let store = self.store;
        let (min_t, max_t) = (self.min_t, self.max_t);

        let iter = store
            .index
            .iter()
            .filter(move |entry| matches_all(&matchers, &entry.labels))
            .map(move |entry| -> Result<Box<dyn Series + '_>> {
                let chunk = Chunk::open(&store.chunk_path(entry.id))?;
                Ok(Box::new(BlockSeries {
                    labels: &entry.labels,
                    chunk,
                    min_t,
                    max_t,
                }))
            });
        Ok(Box::new(iter))
    }
}

struct BlockSeries<'a> {
    labels: &'a Labels,
    chunk: Chunk,
    min_t: i64,
    max_t: i64,
}

impl Series for BlockSeries<'_> {
    fn labels(&self) -> &Labels {
        self.labels
    }

    fn samples(&self) -> Samples<'_> {
        let chunk = &self.chunk;
        let max_t = self.max_t;
        // Samples are time-ordered, so the window is a contiguous run.
        let start = partition_point(chunk.len(), |i| chunk.timestamp(i) < self.min_t);
        Box::new(
            (start..chunk.len())
                .map(move |i| chunk.sample(i))
                .take_while(move |(t, _)| *t <= max_t),
        )
    }
}

/// Returns the first index in `0..len` for which `pred` is false.
fn partition_point(len: usize, pred: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// A memory-mapped, validated chunk file.
#[derive(Debug)]
struct Chunk {
    mmap: Mmap,
    count: usize,
}

impl Chunk {
    fn open(path: &Path) -> Result<Self> {
        let path_str = path.display().to_string();

        let file = File::open(path).map_err(|e| StorageError::ChunkRead {
            path: path_str.clone(),
            source: e,
        })?;

        // SAFETY: The mapping is read-only. Chunk files are written once by
        // `BlockWriter` and never modified in place afterwards.
        let mmap = unsafe {
            Mmap::map(&file).map_err(|e| StorageError::ChunkRead {
                path: path_str.clone(),
                source: e,
            })?
        };

        let count = Self::validate(&mmap, &path_str)?;
        Ok(Self { mmap, count })
    }

    /// Checks header and size, returning the sample count.
    fn validate(bytes: &[u8], path: &str) -> Result<usize> {
        let corrupted = |reason: String| StorageError::CorruptedChunk {
            path: path.to_string(),
            reason,
        };

        if bytes.len() < HEADER_SIZE {
            return Err(corrupted(format!(
                "file too small: {} bytes, expected at least {}",
                bytes.len(),
                HEADER_SIZE
            ))
            .into());
        }

        if bytes[0..4] != CHUNK_MAGIC {
            return Err(corrupted(format!(
                "invalid magic bytes: expected {:?}, found {:?}",
                CHUNK_MAGIC,
                &bytes[0..4]
            ))
            .into());
        }

        let version = read_u32(bytes, 4);
        if version != CHUNK_VERSION {
            return Err(corrupted(format!(
                "unsupported version: expected {CHUNK_VERSION}, found {version}"
            ))
            .into());
        }

        let count = usize::try_from(read_u64(bytes, 8))
            .map_err(|_| corrupted("sample count does not fit in memory".to_string()))?;
        let expected = count
            .checked_mul(SAMPLE_SIZE)
            .and_then(|n| n.checked_add(HEADER_SIZE))
            .ok_or_else(|| corrupted(format!("sample count {count} overflows")))?;
        if bytes.len() != expected {
            return Err(corrupted(format!(
                "file size mismatch: {} bytes, expected {} for {} samples",
                bytes.len(),
                expected,
                count
            ))
            .into());
        }

        Ok(count)
    }

    fn len(&self) -> usize {
        self.count
    }

    fn timestamp(&self, index: usize) -> i64 {
        read_i64(&self.mmap, HEADER_SIZE + index * SAMPLE_SIZE)
    }

    fn sample(&self, index: usize) -> (i64, f64) {
        let offset = HEADER_SIZE + index * SAMPLE_SIZE;
        (
            read_i64(&self.mmap, offset),
            f64::from_bits(read_u64(&self.mmap, offset + 8)),
        )
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

fn read_i64(bytes: &[u8], offset: usize) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    i64::from_le_bytes(buf)
}

fn chunk_path(store_path: &Path, id: u32) -> PathBuf {
    store_path.join(CHUNK_DIR).join(format!("{id}.chunk"))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).map_err(|e| StorageError::DirectoryAccess {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(serde_json::from_str(&data).map_err(StorageError::MetadataSerialize)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_string_pretty(value).map_err(StorageError::MetadataSerialize)?;
    fs::write(path, data).map_err(|e| StorageError::DirectoryAccess {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

/// Builds a new block store directory.
///
/// Chunks are written as series are added; the index and `meta.json` are
/// written by [`BlockWriter::finish`]. A directory without `meta.json` is
/// not a valid store, so an unfinished writer leaves nothing openable.
#[derive(Debug)]
pub struct BlockWriter {
    path: PathBuf,
    index: Vec<IndexEntry>,
    seen: HashSet<Labels>,
}

impl BlockWriter {
    /// Creates the store directory structure.
    ///
    /// # Errors
    ///
    /// - [`StorageError::StoreExists`] if `meta.json` is already present
    /// - [`StorageError::DirectoryAccess`] if directories cannot be created
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if path.join(METADATA_FILE).exists() {
            return Err(StorageError::StoreExists {
                path: path.display().to_string(),
            }
            .into());
        }

        let chunk_dir = path.join(CHUNK_DIR);
        fs::create_dir_all(&chunk_dir).map_err(|e| StorageError::DirectoryAccess {
            path: chunk_dir.display().to_string(),
            source: e,
        })?;

        Ok(Self {
            path,
            index: Vec::new(),
            seen: HashSet::new(),
        })
    }

    /// Writes one series' chunk.
    ///
    /// # Errors
    ///
    /// - [`StorageError::DuplicateSeries`] if the label set was already added
    /// - [`StorageError::OutOfOrderSample`] if timestamps decrease
    /// - [`StorageError::ChunkRead`] if the chunk file cannot be written
    pub fn add_series(&mut self, labels: Labels, samples: &[(i64, f64)]) -> Result<()> {
        if self.seen.contains(&labels) {
            return Err(StorageError::DuplicateSeries {
                labels: labels.to_string(),
            }
            .into());
        }

        if let Some(pair) = samples.windows(2).find(|pair| pair[1].0 < pair[0].0) {
            return Err(StorageError::OutOfOrderSample {
                labels: labels.to_string(),
                previous: pair[0].0,
                timestamp: pair[1].0,
            }
            .into());
        }

        let id = u32::try_from(self.index.len()).map_err(|_| StorageError::CorruptedMetadata {
            reason: "too many series for one store".to_string(),
        })?;
        let path = chunk_path(&self.path, id);
        Self::write_chunk(&path, samples).map_err(|e| StorageError::ChunkRead {
            path: path.display().to_string(),
            source: e,
        })?;

        self.seen.insert(labels.clone());
        self.index.push(IndexEntry { id, labels });
        Ok(())
    }

    fn write_chunk(path: &Path, samples: &[(i64, f64)]) -> std::io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(&CHUNK_MAGIC)?;
        out.write_all(&CHUNK_VERSION.to_le_bytes())?;
        out.write_all(&(samples.len() as u64).to_le_bytes())?;
        for &(timestamp, value) in samples {
            out.write_all(&timestamp.to_le_bytes())?;
            out.write_all(&value.to_bits().to_le_bytes())?;
        }
        out.flush()?;
        out.get_ref().sync_all()
    }

    /// Writes the series index and metadata, completing the store.
    ///
    /// # Errors
    ///
    /// Returns a storage error if either file cannot be written.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.index.sort_by(|a, b| a.labels.cmp(&b.labels));
        write_json(&self.path.join(SERIES_INDEX_FILE), &self.index)?;
        write_json(
            &self.path.join(METADATA_FILE),
            &StoreMetadata {
                version: METADATA_VERSION,
                series_count: self.index.len(),
            },
        )?;
        Ok(self.path)
    }
}
