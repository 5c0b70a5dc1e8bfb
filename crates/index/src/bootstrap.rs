//! Bulk build: `create_index()`.
//!
//! Scans the primary record file front to back in whole-record steps and
//! inserts every record that is not flagged removed, keyed by its byte
//! offset. The directory is persisted once at the end rather than after
//! every record.

use std::fs::File;
use std::io::{BufReader, Read};

use crate::{HashIndex, IndexError};

impl<K> HashIndex<K> {
    /// Builds the index from the primary record file.
    ///
    /// Every non-removed record is inserted with its byte offset as the
    /// `record_ref`. In primary-key mode a duplicate key in the primary
    /// file aborts the build with [`IndexError::DuplicateKey`] naming the
    /// offending offset.
    ///
    /// A trailing fragment shorter than one record is ignored, the same way
    /// a torn append would be.
    ///
    /// # Errors
    ///
    /// [`IndexError::Io`] if the primary file cannot be read (including
    /// when it does not exist).
    pub fn create_index(&mut self) -> Result<(), IndexError> {
        let file = File::open(&self.config.data_path)?;
        let mut reader = BufReader::new(file);
        let mut record = vec![0u8; self.config.record_size];
        let mut offset = 0u64;

        loop {
            match reader.read_exact(&mut record) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            if !(self.config.removed_when)(&record) {
                self.insert_record(&record, offset)?;
            }
            offset += self.config.record_size as u64;
        }
        self.persist()
    }
}
