//! Write path: `insert()`, `remove()`, and the split machinery.
//!
//! An insert lands in the first chain block with room. When the chain is
//! full end to end the bucket is split along the next hash bit — doubling
//! the directory first if the bucket's local depth has caught up with the
//! global depth — and the split recurses on the side the record belongs to
//! until either the record fits or the address width is exhausted, at which
//! point the chain grows a new head block instead.
//!
//! Removal compacts each touched bucket by swapping the last live record
//! into the vacated slot, so live records always occupy a prefix of the
//! block's slots. Emptied buckets stay allocated; the directory never
//! shrinks.

use bucket::Bucket;
use hashseq::Sequence;

use crate::{HashIndex, IndexError};

impl<K> HashIndex<K> {
    /// Inserts a record image, `record_ref` being its byte offset in the
    /// primary file.
    ///
    /// In primary-key mode an already-present key fails with
    /// [`IndexError::DuplicateKey`] and changes nothing. The directory is
    /// persisted before returning.
    pub fn insert(&mut self, record: &[u8], record_ref: u64) -> Result<(), IndexError> {
        self.insert_record(record, record_ref)?;
        self.persist()
    }

    /// Removes every record whose projected key equals `key`.
    ///
    /// Absent keys are a no-op. The directory is persisted before
    /// returning.
    pub fn remove(&mut self, key: &K) -> Result<(), IndexError> {
        let seq = self.sequence_of_key(key);
        let head = self.directory.lookup(&seq);
        let blocks: Vec<(i64, Bucket)> = self.buckets.chain(head).collect::<Result<_, _>>()?;

        for (offset, mut bucket) in blocks {
            let mut dirty = false;
            let mut i = 0;
            while i < bucket.records.len() {
                if (self.config.key_eq)(&(self.config.project)(&bucket.records[i]), key) {
                    bucket.swap_remove(i);
                    dirty = true;
                } else {
                    i += 1;
                }
            }
            if dirty {
                self.buckets.write(offset, &bucket)?;
            }
        }
        self.persist()
    }

    /// Insert without the trailing directory persist; `create_index` runs
    /// many of these and persists once.
    pub(crate) fn insert_record(&mut self, record: &[u8], record_ref: u64) -> Result<(), IndexError> {
        if record.len() != self.config.record_size {
            return Err(IndexError::InvalidConfig(format!(
                "record of {} bytes in an index over {}-byte records",
                record.len(),
                self.config.record_size
            )));
        }
        let geom = *self.buckets.geometry();
        let key = (self.config.project)(record);
        let seq = self.sequence_of_key(&key);
        let head = self.directory.lookup(&seq);
        let mut blocks: Vec<(i64, Bucket)> = self.buckets.chain(head).collect::<Result<_, _>>()?;

        if self.config.primary_key {
            for (_, bucket) in &blocks {
                for stored in &bucket.records {
                    if (self.config.key_eq)(&(self.config.project)(stored), &key) {
                        return Err(IndexError::DuplicateKey(record_ref));
                    }
                }
            }
        }

        // First block with room wins; holes left by removals are refilled
        // before the chain grows.
        if let Some((offset, bucket)) = blocks
            .iter_mut()
            .find(|(_, bucket)| !bucket.is_full(&geom))
        {
            bucket.push(record.to_vec());
            return Ok(self.buckets.write(*offset, bucket)?);
        }

        let depth = self.directory.local_depth_of(&seq);
        if depth < self.config.max_depth {
            // Below the maximum depth there is never an overflow chain: the
            // full head is the whole chain, and it can still be split.
            let (offset, bucket) = match blocks.into_iter().next() {
                Some(block) => block,
                None => {
                    return Err(IndexError::Corrupt(format!(
                        "directory slot for {seq} roots an empty chain"
                    )))
                }
            };
            if bucket.next != bucket::NEXT_SENTINEL {
                return Err(IndexError::Corrupt(format!(
                    "bucket at {offset} is chained below the maximum depth"
                )));
            }
            self.split_insert(offset, bucket, record, &seq)
        } else {
            // Addressing is exhausted along this prefix; grow the chain.
            let head_offset = blocks[0].0;
            let mut chain_head = Bucket::new();
            chain_head.push(record.to_vec());
            let new_head = self.buckets.prepend(head_offset, chain_head)?;
            self.directory.repoint(head_offset, new_head);
            Ok(())
        }
    }

    /// Splits the full bucket at `offset` and places `record`, recursing on
    /// the record's side while it keeps landing in a full half.
    ///
    /// Each round consumes one address bit, so the recursion is bounded by
    /// `max_depth - local_depth`. A round that moves every record to one
    /// side is fine — the empty half is written out and the next round
    /// splits the full one again.
    fn split_insert(
        &mut self,
        offset: i64,
        bucket: Bucket,
        record: &[u8],
        seq: &Sequence,
    ) -> Result<(), IndexError> {
        let geom = *self.buckets.geometry();
        let mut offset = offset;
        let mut records = bucket.records;
        let mut bit = self.directory.local_depth_of(seq);

        loop {
            if bit == self.directory.global_depth() {
                self.directory.double()?;
            }
            let new_offset = self.buckets.allocate()?;
            self.directory.split_refs(offset, bit, new_offset);

            // Partition the resident records along the new bit.
            let mut stays = Bucket::new();
            let mut moves = Bucket::new();
            for rec in records {
                if self.sequence_of_record(&rec).bit(bit) {
                    moves.push(rec);
                } else {
                    stays.push(rec);
                }
            }

            let record_moves = seq.bit(bit);
            bit += 1;

            let (target_offset, mut target, other_offset, other) = if record_moves {
                (new_offset, moves, offset, stays)
            } else {
                (offset, stays, new_offset, moves)
            };
            self.buckets.write(other_offset, &other)?;

            if !target.is_full(&geom) {
                target.push(record.to_vec());
                return Ok(self.buckets.write(target_offset, &target)?);
            }
            self.buckets.write(target_offset, &target)?;

            if bit == self.config.max_depth {
                // All address bits agree with the resident records; the
                // record can only chain.
                let mut chain_head = Bucket::new();
                chain_head.push(record.to_vec());
                let new_head = self.buckets.prepend(target_offset, chain_head)?;
                self.directory.repoint(target_offset, new_head);
                return Ok(());
            }

            offset = target_offset;
            records = target.records;
        }
    }
}
