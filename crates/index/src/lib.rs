//! # Index — Extendible Hash Index Facade
//!
//! The user-visible surface of the extendible hashing index: ties the
//! [`hashseq`], [`directory`], and [`bucket`] crates together into a
//! disk-resident secondary structure over a fixed-length record file.
//!
//! ## Architecture
//!
//! ```text
//! Caller (record file owner)
//!   |
//!   v
//! ┌──────────────────────────────────────────────────┐
//! │                   HashIndex                      │
//! │                                                  │
//! │ write.rs → insert: key → sequence → chain fill   │
//! │              |                                   │
//! │              |  (bucket full?)                   │
//! │              v                                   │
//! │           split (+ directory double)             │
//! │              |                                   │
//! │              |  (local depth at maximum?)        │
//! │              v                                   │
//! │           overflow chain prepend                 │
//! │                                                  │
//! │ read.rs  → search: directory slot → chain walk   │
//! │ bootstrap.rs → create_index: primary file scan   │
//! └──────────────────────────────────────────────────┘
//!        |                        |
//!        v                        v
//!   <data>.ehashdir          <data>.ehash
//!   (resident directory)     (bucket heap)
//! ```
//!
//! ## Module responsibilities
//!
//! | Module         | Purpose                                              |
//! |----------------|------------------------------------------------------|
//! | `lib.rs`       | `IndexConfig`, `HashIndex`, open/readiness, persist  |
//! | [`read`]       | `search()`, `contains()`                             |
//! | [`write`]      | `insert()`, `remove()`, split/double/overflow        |
//! | [`bootstrap`]  | `create_index()` bulk build from the primary file    |
//! | [`error`]      | `IndexError` kinds                                   |
//!
//! ## Consistency
//!
//! The facade is single-writer and synchronous. Every bucket touched by an
//! operation is written back before the operation returns, and the directory
//! is persisted (atomically, via tmp-and-rename) at the end of each mutating
//! operation — between top-level calls the two files are always a consistent
//! snapshot. There is no journaling; callers needing atomicity across a
//! crash mid-operation must wrap the index externally.

mod bootstrap;
mod error;
mod read;
mod write;

pub use error::IndexError;

use bucket::{BucketFile, Geometry};
use directory::Directory;
use hashseq::Sequence;
use std::path::{Path, PathBuf};

/// Default maximum address width in bits.
pub const DEFAULT_MAX_DEPTH: u32 = 32;

/// Default bucket block size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Extracts the search key from a record image.
pub type KeyProjection<K> = Box<dyn Fn(&[u8]) -> K>;

/// Caller-supplied key equality.
pub type KeyEquality<K> = Box<dyn Fn(&K, &K) -> bool>;

/// Caller-supplied key hash.
pub type KeyHash<K> = Box<dyn Fn(&K) -> u64>;

/// Reads a record's removed flag.
pub type RemovedFlag = Box<dyn Fn(&[u8]) -> bool>;

/// Construction-time configuration for a [`HashIndex`].
///
/// The required pieces are the primary file path, the record size, and the
/// three key callables; everything else has a default and a chainable
/// setter:
///
/// ```no_run
/// use index::IndexConfig;
///
/// let config = IndexConfig::new(
///     "people.dat",
///     64,
///     |rec: &[u8]| u64::from_le_bytes(rec[..8].try_into().unwrap()),
///     |a, b| a == b,
///     |k| *k,
/// )
/// .block_size(4096)
/// .primary_key(false);
/// ```
pub struct IndexConfig<K> {
    pub(crate) data_path: PathBuf,
    pub(crate) record_size: usize,
    pub(crate) primary_key: bool,
    pub(crate) max_depth: u32,
    pub(crate) block_size: usize,
    pub(crate) sync: bool,
    pub(crate) project: KeyProjection<K>,
    pub(crate) key_eq: KeyEquality<K>,
    pub(crate) key_hash: KeyHash<K>,
    pub(crate) removed_when: RemovedFlag,
}

impl<K> IndexConfig<K> {
    /// A configuration with the defaults: primary-key mode, maximum depth
    /// 32, 1024-byte blocks, no fsync-per-operation, no record ever
    /// considered removed.
    pub fn new<P, Proj, Eq, Hash>(
        data_path: P,
        record_size: usize,
        project: Proj,
        key_eq: Eq,
        key_hash: Hash,
    ) -> Self
    where
        P: AsRef<Path>,
        Proj: Fn(&[u8]) -> K + 'static,
        Eq: Fn(&K, &K) -> bool + 'static,
        Hash: Fn(&K) -> u64 + 'static,
    {
        Self {
            data_path: data_path.as_ref().to_path_buf(),
            record_size,
            primary_key: true,
            max_depth: DEFAULT_MAX_DEPTH,
            block_size: DEFAULT_BLOCK_SIZE,
            sync: false,
            project: Box::new(project),
            key_eq: Box::new(key_eq),
            key_hash: Box::new(key_hash),
            removed_when: Box::new(|_| false),
        }
    }

    /// Primary-key mode rejects duplicate keys; secondary mode accepts them.
    pub fn primary_key(mut self, primary: bool) -> Self {
        self.primary_key = primary;
        self
    }

    /// Maximum address width in bits, `1..=64`.
    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    /// Bucket block size in bytes; must be a power of two.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Fsync the bucket heap at the end of every mutating operation.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Predicate reading a record's removed flag; records matching it are
    /// skipped by [`HashIndex::create_index`].
    pub fn removed_when<F>(mut self, removed: F) -> Self
    where
        F: Fn(&[u8]) -> bool + 'static,
    {
        self.removed_when = Box::new(removed);
        self
    }

    /// Path of the bucket heap: the primary file name plus `.ehash`.
    pub fn hash_path(&self) -> PathBuf {
        side_path(&self.data_path, ".ehash")
    }

    /// Path of the directory file: the primary file name plus `.ehashdir`.
    pub fn directory_path(&self) -> PathBuf {
        side_path(&self.data_path, ".ehashdir")
    }
}

fn side_path(data_path: &Path, suffix: &str) -> PathBuf {
    let mut name = data_path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Length of a file, with a missing file reading as empty.
fn file_len(path: &Path) -> Result<u64, IndexError> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// A disk-resident extendible hash index over a fixed-length record file.
///
/// The index owns its two side files for its lifetime: the bucket heap and
/// the directory file. The directory is fully resident; buckets are read,
/// mutated, and written back within single operations.
pub struct HashIndex<K> {
    pub(crate) config: IndexConfig<K>,
    pub(crate) directory: Directory,
    pub(crate) buckets: BucketFile,
    pub(crate) directory_path: PathBuf,
}

impl<K> HashIndex<K> {
    /// Opens the index described by `config`.
    ///
    /// - Both side files absent or empty: a fresh index is initialized (one
    ///   directory entry at depth 0 referring to a single empty bucket) and
    ///   persisted.
    /// - Both present and non-empty: they are loaded and validated against
    ///   each other.
    /// - One empty, the other not: the pair is corrupt — a previous build
    ///   stopped halfway or a file was lost.
    ///
    /// # Errors
    ///
    /// [`IndexError::InvalidConfig`] for unusable parameters,
    /// [`IndexError::Corrupt`] when validation fails, [`IndexError::Io`]
    /// for file system failures.
    pub fn open(config: IndexConfig<K>) -> Result<Self, IndexError> {
        let geom = validate_config(&config)?;
        let hash_path = config.hash_path();
        let directory_path = config.directory_path();

        let hash_len = file_len(&hash_path)?;
        let dir_len = file_len(&directory_path)?;

        let (directory, buckets) = match (hash_len, dir_len) {
            (0, 0) => {
                let mut buckets = BucketFile::create(&hash_path, geom)?;
                buckets.allocate()?;
                let directory = Directory::new(config.max_depth);
                directory.save(&directory_path)?;
                if config.sync {
                    buckets.sync()?;
                }
                (directory, buckets)
            }
            (h, d) if h > 0 && d > 0 => load_pair(&config, geom)?,
            _ => {
                return Err(IndexError::Corrupt(format!(
                    "index files out of step: {} is {}, {} is {}",
                    hash_path.display(),
                    if hash_len == 0 { "empty" } else { "populated" },
                    directory_path.display(),
                    if dir_len == 0 { "empty" } else { "populated" },
                )));
            }
        };

        Ok(Self {
            config,
            directory,
            buckets,
            directory_path,
        })
    }

    /// The readiness test: whether both side files exist, are non-empty, and
    /// parse as a consistent directory + bucket store pair.
    pub fn is_ready(config: &IndexConfig<K>) -> bool {
        let geom = match validate_config(config) {
            Ok(g) => g,
            Err(_) => return false,
        };
        let probe = || -> Result<(), IndexError> {
            if file_len(&config.hash_path())? == 0 || file_len(&config.directory_path())? == 0 {
                return Err(IndexError::Corrupt("missing or empty side file".to_string()));
            }
            load_pair(config, geom)?;
            Ok(())
        };
        probe().is_ok()
    }

    /// Writes the directory file (atomically) and, when configured, fsyncs
    /// the bucket heap. Called internally after every mutating operation.
    pub fn persist(&mut self) -> Result<(), IndexError> {
        self.directory.save(&self.directory_path)?;
        if self.config.sync {
            self.buckets.sync()?;
        }
        Ok(())
    }

    /// Address width currently in use by the directory.
    pub fn global_depth(&self) -> u32 {
        self.directory.global_depth()
    }

    /// Maximum address width this index can ever reach.
    pub fn max_depth(&self) -> u32 {
        self.config.max_depth
    }

    /// Number of bucket blocks allocated in the heap, holes included.
    pub fn bucket_count(&self) -> u64 {
        self.buckets.block_count()
    }

    /// Records per bucket block.
    pub fn bucket_capacity(&self) -> usize {
        self.buckets.geometry().capacity()
    }

    pub fn is_primary(&self) -> bool {
        self.config.primary_key
    }

    pub fn record_size(&self) -> usize {
        self.config.record_size
    }

    /// Hash sequence of a key, at full width.
    pub(crate) fn sequence_of_key(&self, key: &K) -> Sequence {
        Sequence::from_hash((self.config.key_hash)(key), self.config.max_depth)
    }

    /// Hash sequence of a stored record.
    pub(crate) fn sequence_of_record(&self, record: &[u8]) -> Sequence {
        self.sequence_of_key(&(self.config.project)(record))
    }
}

/// Parameter checks shared by `open` and `is_ready`.
fn validate_config<K>(config: &IndexConfig<K>) -> Result<Geometry, IndexError> {
    if config.max_depth == 0 || config.max_depth > hashseq::MAX_WIDTH {
        return Err(IndexError::InvalidConfig(format!(
            "maximum depth {} outside 1..={}",
            config.max_depth,
            hashseq::MAX_WIDTH
        )));
    }
    Ok(Geometry::new(config.block_size, config.record_size)?)
}

/// Loads both side files and checks them against each other.
fn load_pair<K>(
    config: &IndexConfig<K>,
    geom: Geometry,
) -> Result<(Directory, BucketFile), IndexError> {
    let directory = Directory::load(config.directory_path(), config.max_depth)?;
    let buckets = BucketFile::open(config.hash_path(), geom)?;

    let heap_len = buckets.block_count() * geom.block_size() as u64;
    for entry in directory.entries() {
        let bucket_ref = entry.bucket_ref;
        if bucket_ref as u64 % geom.block_size() as u64 != 0 || bucket_ref as u64 >= heap_len {
            return Err(IndexError::Corrupt(format!(
                "directory entry {} refers to offset {bucket_ref} outside the bucket heap",
                entry.sequence
            )));
        }
    }
    Ok((directory, buckets))
}

impl<K> std::fmt::Debug for HashIndex<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashIndex")
            .field("data_path", &self.config.data_path)
            .field("primary_key", &self.is_primary())
            .field("record_size", &self.record_size())
            .field("block_size", &self.config.block_size)
            .field("bucket_capacity", &self.bucket_capacity())
            .field("max_depth", &self.config.max_depth)
            .field("global_depth", &self.directory.global_depth())
            .field("bucket_count", &self.buckets.block_count())
            .finish()
    }
}

/// Best-effort directory write on teardown.
///
/// Every successful mutating operation already persisted the directory;
/// this covers state left in memory by a failed one. Errors are ignored —
/// `Drop` cannot propagate them, and the previously persisted snapshot is
/// still on disk.
impl<K> Drop for HashIndex<K> {
    fn drop(&mut self) {
        let _ = self.directory.save(&self.directory_path);
    }
}

#[cfg(test)]
mod tests;
