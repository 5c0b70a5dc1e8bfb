//! # Directory — Hash Address Table
//!
//! The extendible hash directory: an in-memory table mapping hash sequences
//! to bucket offsets, persisted in the directory file (`.ehashdir`).
//!
//! ## Shape
//!
//! The table is **dense**: exactly `2^global_depth` entries, ordered by
//! address, so the entry for a sequence is found by indexing with its low
//! `global_depth` bits. Each entry carries the number of low-order bits that
//! uniquely identify its bucket (the *local depth*); entries whose addresses
//! agree on those bits alias the same bucket, exactly
//! `2^(global_depth - local_depth)` of them per bucket.
//!
//! ```text
//! global_depth = 2, D = 3
//!
//! addr  entry.sequence  local  bucket_ref
//! 00    000             2      0          ┐ distinct buckets
//! 01    001             1      64         │ 01 and 11 alias one bucket
//! 10    010             2      128        ┘ (local depth 1)
//! 11    011             1      64
//! ```
//!
//! ## Growth
//!
//! [`double`](Directory::double) mirrors the table: every entry is reproduced
//! as a twin with the new high-among-the-significant bit set, pointing at the
//! same bucket with the same local depth — every existing mapping is
//! preserved. Doubling is only ever triggered from inside a bucket split.
//! [`split_refs`](Directory::split_refs) then performs the directory half of
//! a split: the alias class of the overflowing bucket is cut in two along
//! the next hash bit.
//!
//! The directory never shrinks: merge-on-delete is not implemented, so freed
//! capacity stays behind as holes in the bucket heap.

mod format;

use hashseq::Sequence;
use thiserror::Error;

/// Errors from the directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The directory file or the in-memory table failed validation.
    #[error("corrupt directory: {0}")]
    Corrupt(String),
}

/// Mask covering the low `n` bits of a `u64`.
fn low_mask(n: u32) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

/// One directory slot: an address pattern, the local depth of the bucket it
/// refers to, and that bucket's byte offset in the hash file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub local_depth: u32,
    pub sequence: Sequence,
    pub bucket_ref: i64,
}

/// The resident directory table.
#[derive(Debug, Clone)]
pub struct Directory {
    /// Maximum address width in bits; entry sequences are this wide.
    max_depth: u32,
    /// Address width currently in use, `<= max_depth`.
    global_depth: u32,
    /// Dense table of `2^global_depth` entries ordered by address.
    entries: Vec<Entry>,
}

impl Directory {
    /// A fresh directory: one entry at local depth 0, the all-zero sequence,
    /// referring to the bucket at offset 0.
    ///
    /// `max_depth` must be in `1..=hashseq::MAX_WIDTH`; the facade validates
    /// it at construction.
    pub fn new(max_depth: u32) -> Self {
        debug_assert!(max_depth >= 1 && max_depth <= hashseq::MAX_WIDTH);
        Self {
            max_depth,
            global_depth: 0,
            entries: vec![Entry {
                local_depth: 0,
                sequence: Sequence::zero(max_depth),
                bucket_ref: 0,
            }],
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Table position for a sequence: its low `global_depth` bits.
    fn slot(&self, seq: &Sequence) -> usize {
        (seq.value() & low_mask(self.global_depth)) as usize
    }

    /// The entry a sequence addresses.
    pub fn entry_at(&self, seq: &Sequence) -> &Entry {
        &self.entries[self.slot(seq)]
    }

    /// Bucket offset for a sequence.
    ///
    /// The dense table makes this a direct index; by the aliasing invariant
    /// it returns the same bucket a linear scan over `low_bits_equal`
    /// matches would find.
    pub fn lookup(&self, seq: &Sequence) -> i64 {
        self.entry_at(seq).bucket_ref
    }

    /// Local depth of the bucket a sequence addresses.
    pub fn local_depth_of(&self, seq: &Sequence) -> u32 {
        self.entry_at(seq).local_depth
    }

    /// Extends the directory by one address bit.
    ///
    /// Every entry is mirrored into a twin with bit `global_depth` set,
    /// initially sharing its bucket and local depth, so every pre-doubling
    /// lookup resolves identically afterwards.
    pub fn double(&mut self) -> Result<(), DirectoryError> {
        if self.global_depth >= self.max_depth {
            return Err(DirectoryError::Corrupt(format!(
                "directory already at maximum depth {}",
                self.max_depth
            )));
        }
        let old_len = self.entries.len();
        self.entries.reserve(old_len);
        for addr in old_len..2 * old_len {
            let twin = &self.entries[addr - old_len];
            self.entries.push(Entry {
                local_depth: twin.local_depth,
                sequence: Sequence::from_hash(addr as u64, self.max_depth),
                bucket_ref: twin.bucket_ref,
            });
        }
        self.global_depth += 1;
        Ok(())
    }

    /// Directory half of a bucket split: cuts the alias class of `old_ref`
    /// along `bit`.
    ///
    /// Every entry pointing at `old_ref` gets local depth `bit + 1`; the
    /// entries whose address has `bit` set are repointed at `new_ref`.
    pub fn split_refs(&mut self, old_ref: i64, bit: u32, new_ref: i64) {
        for entry in &mut self.entries {
            if entry.bucket_ref != old_ref {
                continue;
            }
            entry.local_depth = bit + 1;
            if entry.sequence.bit(bit) {
                entry.bucket_ref = new_ref;
            }
        }
    }

    /// Retargets every entry pointing at `old_ref` to `new_ref`, leaving
    /// local depths untouched. Used when an overflow chain gains a new head
    /// block.
    pub fn repoint(&mut self, old_ref: i64, new_ref: i64) {
        for entry in &mut self.entries {
            if entry.bucket_ref == old_ref {
                entry.bucket_ref = new_ref;
            }
        }
    }

    /// Checks the structural invariants. Called after loading from disk.
    ///
    /// - depths: every `local_depth <= global_depth <= max_depth`;
    /// - density: entry `i` holds the `max_depth`-wide sequence of value `i`;
    /// - aliasing: entries agreeing on the low `local_depth` bits of a
    ///   bucket's address — and only those — share its `bucket_ref` and
    ///   local depth.
    pub fn validate(&self) -> Result<(), DirectoryError> {
        if self.global_depth > self.max_depth {
            return Err(DirectoryError::Corrupt(format!(
                "global depth {} exceeds maximum {}",
                self.global_depth, self.max_depth
            )));
        }
        let expected = 1usize
            .checked_shl(self.global_depth)
            .ok_or_else(|| DirectoryError::Corrupt("directory too wide".to_string()))?;
        if self.entries.len() != expected {
            return Err(DirectoryError::Corrupt(format!(
                "{} entries for global depth {} (expected {expected})",
                self.entries.len(),
                self.global_depth
            )));
        }

        let mut canonical_of_ref: std::collections::HashMap<i64, usize> =
            std::collections::HashMap::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.local_depth > self.global_depth {
                return Err(DirectoryError::Corrupt(format!(
                    "entry {i}: local depth {} exceeds global depth {}",
                    entry.local_depth, self.global_depth
                )));
            }
            if entry.sequence.width() != self.max_depth || entry.sequence.value() != i as u64 {
                return Err(DirectoryError::Corrupt(format!(
                    "entry {i}: sequence {} out of place",
                    entry.sequence
                )));
            }
            if entry.bucket_ref < 0 {
                return Err(DirectoryError::Corrupt(format!(
                    "entry {i}: negative bucket offset {}",
                    entry.bucket_ref
                )));
            }
            // All aliases of a bucket must collapse onto one canonical slot:
            // the one at the class's lowest address.
            let canonical = (i as u64 & low_mask(entry.local_depth)) as usize;
            let peer = &self.entries[canonical];
            if peer.bucket_ref != entry.bucket_ref || peer.local_depth != entry.local_depth {
                return Err(DirectoryError::Corrupt(format!(
                    "entry {i} disagrees with its alias at {canonical}"
                )));
            }
            match canonical_of_ref.get(&entry.bucket_ref) {
                None => {
                    canonical_of_ref.insert(entry.bucket_ref, canonical);
                }
                Some(&seen) if seen != canonical => {
                    return Err(DirectoryError::Corrupt(format!(
                        "bucket offset {} shared across alias classes {seen} and {canonical}",
                        entry.bucket_ref
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
