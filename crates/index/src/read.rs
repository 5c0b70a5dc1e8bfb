//! Read path: `search()` and `contains()`.
//!
//! A lookup hashes the key, indexes the directory with the low bits of the
//! sequence, and walks the bucket chain rooted there, filtering records
//! through the caller's equality. No state is touched.

use crate::{HashIndex, IndexError};

impl<K> HashIndex<K> {
    /// Returns every stored record whose projected key equals `key`.
    ///
    /// In primary-key mode the result holds at most one record; in secondary
    /// mode it may hold many. An absent key yields an empty vector.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the chain fails (I/O or a corrupt block).
    pub fn search(&self, key: &K) -> Result<Vec<Vec<u8>>, IndexError> {
        let seq = self.sequence_of_key(key);
        let head = self.directory.lookup(&seq);

        let mut matches = Vec::new();
        for block in self.buckets.chain(head) {
            let (_, bucket) = block?;
            for record in bucket.records {
                if (self.config.key_eq)(&(self.config.project)(&record), key) {
                    matches.push(record);
                }
            }
        }
        Ok(matches)
    }

    /// Whether any record with this key is stored. Stops at the first match
    /// instead of collecting the whole chain.
    pub fn contains(&self, key: &K) -> Result<bool, IndexError> {
        let seq = self.sequence_of_key(key);
        let head = self.directory.lookup(&seq);

        for block in self.buckets.chain(head) {
            let (_, bucket) = block?;
            for record in &bucket.records {
                if (self.config.key_eq)(&(self.config.project)(record), key) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
