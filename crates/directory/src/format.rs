//! On-disk encoding of the directory file.
//!
//! ## File format
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ HEADER                                                   │
//! │   global_depth (u32 LE) | max_depth (u32 LE)             │
//! │   entry_count  (u64 LE)                                  │
//! ├──────────────────────────────────────────────────────────┤
//! │ ENTRIES (entry_count × fixed size, address order)        │
//! │   local_depth (u32 LE)                                   │
//! │   sequence    (max_depth ASCII '0'/'1' chars, MSB first, │
//! │                then one NUL)                             │
//! │   bucket_ref  (i64 LE)                                   │
//! ├──────────────────────────────────────────────────────────┤
//! │ TRAILER                                                  │
//! │   crc32 (u32 LE) over everything above                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The whole file is read and written in one piece — the directory is small
//! and fully resident. Saves go to a `.tmp` sibling which is fsynced and
//! renamed over the live file, so the directory file is never seen partially
//! written.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use hashseq::Sequence;
use std::fs::{rename, File};
use std::io::Write;
use std::path::Path;

use crate::{Directory, DirectoryError, Entry};

/// Fixed header size: two u32 depths plus the u64 entry count.
pub const HEADER_BYTES: usize = 16;

/// CRC32 trailer size.
pub const TRAILER_BYTES: usize = 4;

/// Encoded size of one entry for a given maximum depth.
pub fn entry_bytes(max_depth: u32) -> usize {
    4 + max_depth as usize + 1 + 8
}

impl Directory {
    /// Loads and validates a directory file.
    ///
    /// `max_depth` is the construction-time maximum; a file recorded with a
    /// different maximum is rejected as corrupt rather than silently
    /// re-interpreted.
    pub fn load<P: AsRef<Path>>(path: P, max_depth: u32) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let raw = std::fs::read(path)?;
        if raw.len() < HEADER_BYTES + TRAILER_BYTES {
            return Err(DirectoryError::Corrupt(format!(
                "directory file {} too small ({} bytes)",
                path.display(),
                raw.len()
            )));
        }

        let body_len = raw.len() - TRAILER_BYTES;
        let stored_crc = (&raw[body_len..]).read_u32::<LittleEndian>()?;
        let mut hasher = Crc32::new();
        hasher.update(&raw[..body_len]);
        let computed = hasher.finalize();
        if computed != stored_crc {
            return Err(DirectoryError::Corrupt(format!(
                "directory checksum mismatch: computed {computed:#010x}, stored {stored_crc:#010x}"
            )));
        }

        let mut cursor = &raw[..body_len];
        let global_depth = cursor.read_u32::<LittleEndian>()?;
        let file_max_depth = cursor.read_u32::<LittleEndian>()?;
        let entry_count = cursor.read_u64::<LittleEndian>()?;

        if file_max_depth != max_depth {
            return Err(DirectoryError::Corrupt(format!(
                "directory recorded for maximum depth {file_max_depth}, opened with {max_depth}"
            )));
        }
        let expected_count = 1u64
            .checked_shl(global_depth)
            .filter(|_| global_depth <= max_depth)
            .ok_or_else(|| {
                DirectoryError::Corrupt(format!("implausible global depth {global_depth}"))
            })?;
        if entry_count != expected_count {
            return Err(DirectoryError::Corrupt(format!(
                "{entry_count} entries recorded for global depth {global_depth} \
                 (expected {expected_count})"
            )));
        }
        let expected_len =
            HEADER_BYTES + entry_count as usize * entry_bytes(max_depth) + TRAILER_BYTES;
        if raw.len() != expected_len {
            return Err(DirectoryError::Corrupt(format!(
                "directory file is {} bytes, layout requires {expected_len}",
                raw.len()
            )));
        }

        let mut entries = Vec::with_capacity(entry_count as usize);
        for i in 0..entry_count {
            let local_depth = cursor.read_u32::<LittleEndian>()?;
            let (seq_bytes, rest) = cursor.split_at(max_depth as usize + 1);
            cursor = rest;
            if seq_bytes[max_depth as usize] != 0 {
                return Err(DirectoryError::Corrupt(format!(
                    "entry {i}: sequence missing NUL terminator"
                )));
            }
            let sequence = Sequence::from_wire(&seq_bytes[..max_depth as usize]).ok_or_else(
                || DirectoryError::Corrupt(format!("entry {i}: malformed sequence bytes")),
            )?;
            let bucket_ref = cursor.read_i64::<LittleEndian>()?;
            entries.push(Entry {
                local_depth,
                sequence,
                bucket_ref,
            });
        }

        let dir = Directory {
            max_depth,
            global_depth,
            entries,
        };
        dir.validate()?;
        Ok(dir)
    }

    /// Persists the directory atomically: encode, write to a `.tmp` sibling,
    /// fsync, rename over the live file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), DirectoryError> {
        let path = path.as_ref();
        let mut body = Vec::with_capacity(
            HEADER_BYTES + self.entries.len() * entry_bytes(self.max_depth),
        );
        body.write_u32::<LittleEndian>(self.global_depth)?;
        body.write_u32::<LittleEndian>(self.max_depth)?;
        body.write_u64::<LittleEndian>(self.entries.len() as u64)?;
        for entry in &self.entries {
            body.write_u32::<LittleEndian>(entry.local_depth)?;
            body.write_all(&entry.sequence.to_wire())?;
            body.write_i64::<LittleEndian>(entry.bucket_ref)?;
        }
        let mut hasher = Crc32::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        let mut tmp_name = path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = std::path::PathBuf::from(tmp_name);

        let mut file = File::create(&tmp_path)?;
        file.write_all(&body)?;
        file.write_u32::<LittleEndian>(crc)?;
        file.sync_all()?;
        rename(&tmp_path, path)?;
        Ok(())
    }
}
