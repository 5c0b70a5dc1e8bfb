//! # Bucket — Fixed-Size Bucket Heap
//!
//! The bucket store: a densely packed heap of fixed-size bucket blocks in the
//! hash file (`.ehash`), addressed by byte offset.
//!
//! ## Block layout
//!
//! Every block is exactly `block_size` bytes:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ size        (i64 LE)   count of live records           │
//! ├────────────────────────────────────────────────────────┤
//! │ record slots           capacity × record_size bytes,   │
//! │                        only the first `size` are live  │
//! ├────────────────────────────────────────────────────────┤
//! │ (zero padding)                                         │
//! ├────────────────────────────────────────────────────────┤
//! │ next        (i64 LE)   offset of the next block in the │
//! │                        overflow chain, -1 = end        │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Block offsets are multiples of
//! `block_size` starting at 0, so the heap carries no header of its own: a
//! valid hash file is simply a non-empty sequence of whole blocks.
//!
//! Buckets are not kept resident. Callers read a block, mutate the in-memory
//! [`Bucket`], and write the full block back within one operation; a
//! one-block buffer is all the memory this layer ever needs.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Chain terminator for the `next` field.
pub const NEXT_SENTINEL: i64 = -1;

/// Bytes of bookkeeping per block: the `size` and `next` fields.
pub const BLOCK_OVERHEAD: usize = 16;

/// Errors from the bucket store.
#[derive(Debug, Error)]
pub enum BucketError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The hash file or a block within it failed validation.
    #[error("corrupt bucket store: {0}")]
    Corrupt(String),

    /// The block size / record size pair is unusable.
    #[error("invalid bucket geometry: {0}")]
    InvalidGeometry(String),
}

/// Block and record sizing for one bucket store.
///
/// The capacity (records per block) is derived, never stored: both files of
/// an index are opened with the same construction-time geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    block_size: usize,
    record_size: usize,
}

impl Geometry {
    /// Validates a block size / record size pair.
    ///
    /// The block size must be a power of two and large enough to hold at
    /// least one record next to the 16 bytes of bookkeeping.
    pub fn new(block_size: usize, record_size: usize) -> Result<Self, BucketError> {
        if block_size == 0 || !block_size.is_power_of_two() {
            return Err(BucketError::InvalidGeometry(format!(
                "block size {block_size} is not a power of two"
            )));
        }
        if record_size == 0 {
            return Err(BucketError::InvalidGeometry(
                "record size must be non-zero".to_string(),
            ));
        }
        if block_size <= BLOCK_OVERHEAD || record_size > block_size - BLOCK_OVERHEAD {
            return Err(BucketError::InvalidGeometry(format!(
                "record size {record_size} does not fit in a {block_size}-byte block \
                 ({BLOCK_OVERHEAD} bytes reserved)"
            )));
        }
        Ok(Self {
            block_size,
            record_size,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Records per block.
    pub fn capacity(&self) -> usize {
        (self.block_size - BLOCK_OVERHEAD) / self.record_size
    }
}

/// One bucket block in memory: its live records and the chain link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Live records, each exactly `record_size` bytes. The on-disk `size`
    /// field is `records.len()`.
    pub records: Vec<Vec<u8>>,
    /// Offset of the next block in the overflow chain, [`NEXT_SENTINEL`] at
    /// the end.
    pub next: i64,
}

impl Bucket {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            next: NEXT_SENTINEL,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self, geom: &Geometry) -> bool {
        self.records.len() >= geom.capacity()
    }

    pub fn push(&mut self, record: Vec<u8>) {
        self.records.push(record);
    }

    /// Removes the record at `i` by swapping the last record into its slot.
    pub fn swap_remove(&mut self, i: usize) -> Vec<u8> {
        self.records.swap_remove(i)
    }

    /// Serializes into a full zero-padded block.
    fn encode(&self, geom: &Geometry) -> Result<Vec<u8>, BucketError> {
        debug_assert!(self.records.len() <= geom.capacity());
        let mut block = vec![0u8; geom.block_size()];
        {
            let mut head = &mut block[0..8];
            head.write_i64::<LittleEndian>(self.records.len() as i64)?;
        }
        for (i, record) in self.records.iter().enumerate() {
            if record.len() != geom.record_size() {
                return Err(BucketError::Corrupt(format!(
                    "record of {} bytes in a store with {}-byte records",
                    record.len(),
                    geom.record_size()
                )));
            }
            let start = 8 + i * geom.record_size();
            block[start..start + geom.record_size()].copy_from_slice(record);
        }
        {
            let mut tail = &mut block[geom.block_size() - 8..];
            tail.write_i64::<LittleEndian>(self.next)?;
        }
        Ok(block)
    }

    /// Parses a full block, validating the bookkeeping fields.
    fn decode(block: &[u8], geom: &Geometry) -> Result<Self, BucketError> {
        debug_assert_eq!(block.len(), geom.block_size());
        let size = (&block[0..8]).read_i64::<LittleEndian>()?;
        if size < 0 || size as usize > geom.capacity() {
            return Err(BucketError::Corrupt(format!(
                "bucket size {size} outside 0..={}",
                geom.capacity()
            )));
        }
        let mut records = Vec::with_capacity(size as usize);
        for i in 0..size as usize {
            let start = 8 + i * geom.record_size();
            records.push(block[start..start + geom.record_size()].to_vec());
        }
        let next = (&block[geom.block_size() - 8..]).read_i64::<LittleEndian>()?;
        if next != NEXT_SENTINEL && (next < 0 || next as usize % geom.block_size() != 0) {
            return Err(BucketError::Corrupt(format!(
                "bucket chain link {next} is not block-aligned"
            )));
        }
        Ok(Self { records, next })
    }
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new()
    }
}

/// The open hash file: allocate, read, and write bucket blocks by offset.
#[derive(Debug)]
pub struct BucketFile {
    file: std::fs::File,
    geom: Geometry,
    path: PathBuf,
    /// Cached number of whole blocks in the file.
    blocks: u64,
}

impl BucketFile {
    /// Creates an empty heap at `path`, truncating anything already there.
    ///
    /// Callers only take this path after deciding the index is being built
    /// fresh; use [`open`](BucketFile::open) for an existing heap.
    pub fn create<P: AsRef<Path>>(path: P, geom: Geometry) -> Result<Self, BucketError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            file,
            geom,
            path,
            blocks: 0,
        })
    }

    /// Opens an existing heap, validating that the file is a non-empty
    /// sequence of whole blocks.
    pub fn open<P: AsRef<Path>>(path: P, geom: Geometry) -> Result<Self, BucketError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Err(BucketError::Corrupt(format!(
                "hash file {} is empty",
                path.display()
            )));
        }
        if len % geom.block_size() as u64 != 0 {
            return Err(BucketError::Corrupt(format!(
                "hash file length {len} is not a multiple of the {}-byte block size",
                geom.block_size()
            )));
        }
        let blocks = len / geom.block_size() as u64;
        Ok(Self {
            file,
            geom,
            path,
            blocks,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geom
    }

    /// Number of blocks currently allocated.
    pub fn block_count(&self) -> u64 {
        self.blocks
    }

    /// Appends a fresh empty bucket (no records, chain terminated) at
    /// end-of-file and returns its offset.
    pub fn allocate(&mut self) -> Result<i64, BucketError> {
        let offset = self.blocks * self.geom.block_size() as u64;
        let block = Bucket::new().encode(&self.geom)?;
        let mut f = &self.file;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(&block)?;
        self.blocks += 1;
        Ok(offset as i64)
    }

    /// Reads one block.
    pub fn read(&self, offset: i64) -> Result<Bucket, BucketError> {
        let offset = self.check_offset(offset)?;
        let mut block = vec![0u8; self.geom.block_size()];
        let mut f = &self.file;
        f.seek(SeekFrom::Start(offset))?;
        f.read_exact(&mut block)?;
        Bucket::decode(&block, &self.geom)
    }

    /// Overwrites one block in place. Writes are always full-block.
    pub fn write(&mut self, offset: i64, bucket: &Bucket) -> Result<(), BucketError> {
        let offset = self.check_offset(offset)?;
        let block = bucket.encode(&self.geom)?;
        let mut f = &self.file;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(&block)?;
        Ok(())
    }

    /// Lazily walks the overflow chain rooted at `head`.
    ///
    /// Each block is read once, in chain order. The walk ends at the
    /// [`NEXT_SENTINEL`] link, stops at the first error, and reports a cycle
    /// as corruption rather than iterating forever.
    pub fn chain(&self, head: i64) -> Chain<'_> {
        Chain {
            store: self,
            next: head,
            steps: 0,
            done: false,
        }
    }

    /// Makes `bucket` the new head of the chain rooted at `head`.
    ///
    /// The block is allocated at end-of-file with its `next` pointing at the
    /// old head; the returned offset becomes the directory's new
    /// `bucket_ref`.
    pub fn prepend(&mut self, head: i64, mut bucket: Bucket) -> Result<i64, BucketError> {
        self.check_offset(head)?;
        bucket.next = head;
        let offset = self.allocate()?;
        self.write(offset, &bucket)?;
        Ok(offset)
    }

    /// Flushes file contents to stable storage.
    pub fn sync(&self) -> Result<(), BucketError> {
        self.file.sync_all()?;
        Ok(())
    }

    fn check_offset(&self, offset: i64) -> Result<u64, BucketError> {
        let block_size = self.geom.block_size() as u64;
        if offset < 0 || offset as u64 % block_size != 0 || offset as u64 >= self.blocks * block_size
        {
            return Err(BucketError::Corrupt(format!(
                "bucket offset {offset} outside the {}-block heap",
                self.blocks
            )));
        }
        Ok(offset as u64)
    }
}

/// Lazy iterator over `(offset, Bucket)` pairs of one overflow chain.
pub struct Chain<'a> {
    store: &'a BucketFile,
    next: i64,
    steps: u64,
    done: bool,
}

impl Iterator for Chain<'_> {
    type Item = Result<(i64, Bucket), BucketError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next == NEXT_SENTINEL {
            return None;
        }
        // A chain longer than the heap itself must revisit a block.
        if self.steps >= self.store.block_count() {
            self.done = true;
            return Some(Err(BucketError::Corrupt(
                "cycle in bucket overflow chain".to_string(),
            )));
        }
        let offset = self.next;
        match self.store.read(offset) {
            Ok(bucket) => {
                self.next = bucket.next;
                self.steps += 1;
                Some(Ok((offset, bucket)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
