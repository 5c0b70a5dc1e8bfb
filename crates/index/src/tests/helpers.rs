use crate::{HashIndex, IndexConfig};
use hashseq::Sequence;
use std::path::Path;

/// Test records: 8-byte little-endian key, a tag byte, padding, and the
/// removed flag in the last byte.
pub const RECORD_SIZE: usize = 24;

/// 64-byte blocks hold two 24-byte records next to the 16 bookkeeping bytes.
pub const BLOCK_SIZE: usize = 64;

pub fn record(key: u64, tag: u8) -> Vec<u8> {
    let mut rec = vec![0u8; RECORD_SIZE];
    rec[..8].copy_from_slice(&key.to_le_bytes());
    rec[8] = tag;
    rec
}

pub fn removed_record(key: u64) -> Vec<u8> {
    let mut rec = record(key, 0);
    rec[RECORD_SIZE - 1] = 1;
    rec
}

pub fn key_of(rec: &[u8]) -> u64 {
    u64::from_le_bytes(rec[..8].try_into().unwrap())
}

/// Tiny index: identity hash, three address bits, two records per bucket —
/// small enough that every split and chain is observable.
pub fn tiny_config(data_path: &Path) -> IndexConfig<u64> {
    IndexConfig::new(data_path, RECORD_SIZE, key_of, |a, b| a == b, |k| *k)
        .max_depth(3)
        .block_size(BLOCK_SIZE)
        .removed_when(|rec| rec[RECORD_SIZE - 1] != 0)
}

pub fn open_tiny(data_path: &Path) -> HashIndex<u64> {
    HashIndex::open(tiny_config(data_path)).unwrap()
}

/// The keys stored in each block of the chain addressed by `addr`, in chain
/// order (newest head first).
pub fn chain_key_sets(idx: &HashIndex<u64>, addr: u64) -> Vec<Vec<u64>> {
    let seq = Sequence::from_hash(addr, idx.max_depth());
    let head = idx.directory.lookup(&seq);
    idx.buckets
        .chain(head)
        .map(|block| {
            let (_, bucket) = block.unwrap();
            bucket.records.iter().map(|rec| key_of(rec)).collect()
        })
        .collect()
}

/// Structural invariants over the live index: directory shape, record
/// placement, and chain discipline.
pub fn check_invariants(idx: &HashIndex<u64>) {
    idx.directory.validate().unwrap();
    for entry in idx.directory.entries() {
        let blocks: Vec<_> = idx
            .buckets
            .chain(entry.bucket_ref)
            .collect::<Result<_, _>>()
            .unwrap();
        // Overflow chains only exist once splitting is exhausted.
        if blocks.len() > 1 {
            assert_eq!(entry.local_depth, idx.max_depth());
        }
        // Every stored record hashes back into this bucket's prefix.
        for (_, bucket) in &blocks {
            for rec in &bucket.records {
                let seq = Sequence::from_hash(key_of(rec), idx.max_depth());
                assert!(
                    seq.low_bits_equal(&entry.sequence, entry.local_depth),
                    "record {} stored under prefix {}",
                    seq,
                    entry.sequence
                );
            }
        }
    }
}
