//! End-to-end walks of the split / double / overflow protocol on the tiny
//! geometry (three address bits, two records per bucket, identity hash).

use super::helpers::*;
use crate::HashIndex;
use anyhow::Result;
use tempfile::tempdir;

// -------------------- Growth ladder --------------------

#[test]
fn two_records_fit_the_root_bucket() -> Result<()> {
    let dir = tempdir()?;
    let mut idx = open_tiny(&dir.path().join("data.bin"));

    idx.insert(&record(0, 0), 0)?;
    idx.insert(&record(1, 0), 24)?;

    assert_eq!(idx.global_depth(), 0);
    assert_eq!(idx.bucket_count(), 1);
    assert_eq!(chain_key_sets(&idx, 0), vec![vec![0, 1]]);
    check_invariants(&idx);
    Ok(())
}

#[test]
fn third_record_forces_first_split_and_doubling() -> Result<()> {
    let dir = tempdir()?;
    let mut idx = open_tiny(&dir.path().join("data.bin"));

    for (i, key) in [0u64, 1, 2].iter().enumerate() {
        idx.insert(&record(*key, 0), i as u64 * 24)?;
    }

    assert_eq!(idx.global_depth(), 1);
    assert_eq!(idx.bucket_count(), 2);
    // Records parted along bit 0.
    assert_eq!(chain_key_sets(&idx, 0), vec![vec![0, 2]]);
    assert_eq!(chain_key_sets(&idx, 1), vec![vec![1]]);
    check_invariants(&idx);
    Ok(())
}

#[test]
fn five_records_reach_depth_two() -> Result<()> {
    let dir = tempdir()?;
    let mut idx = open_tiny(&dir.path().join("data.bin"));

    for (i, key) in [0u64, 1, 2, 3, 4].iter().enumerate() {
        idx.insert(&record(*key, 0), i as u64 * 24)?;
    }

    assert_eq!(idx.global_depth(), 2);
    assert_eq!(idx.bucket_count(), 3);
    // The even side split twice; 01 and 11 still alias one depth-1 bucket.
    assert_eq!(chain_key_sets(&idx, 0b00), vec![vec![0, 4]]);
    assert_eq!(chain_key_sets(&idx, 0b10), vec![vec![2]]);
    assert_eq!(chain_key_sets(&idx, 0b01), vec![vec![1, 3]]);
    assert_eq!(chain_key_sets(&idx, 0b11), vec![vec![1, 3]]);

    for key in 0u64..5 {
        let found = idx.search(&key)?;
        assert_eq!(found, vec![record(key, 0)], "key {key}");
    }
    assert!(idx.search(&5)?.is_empty());
    check_invariants(&idx);
    Ok(())
}

// -------------------- Exhausted addressing --------------------

#[test]
fn full_collision_chains_after_splits_exhaust() -> Result<()> {
    let dir = tempdir()?;
    let mut idx = open_tiny(&dir.path().join("data.bin"));

    // 0, 8, and 16 agree on all three address bits.
    idx.insert(&record(0, 0), 0)?;
    idx.insert(&record(8, 0), 24)?;
    idx.insert(&record(16, 0), 48)?;

    assert_eq!(idx.global_depth(), 3);
    // One block per split round plus the chained head.
    assert_eq!(idx.bucket_count(), 5);
    assert_eq!(chain_key_sets(&idx, 0), vec![vec![16], vec![0, 8]]);

    for key in [0u64, 8, 16] {
        assert_eq!(idx.search(&key)?, vec![record(key, 0)]);
    }
    check_invariants(&idx);
    Ok(())
}

// -------------------- Removal compaction --------------------

#[test]
fn removal_compacts_survivor_into_first_slot() -> Result<()> {
    let dir = tempdir()?;
    let mut idx = open_tiny(&dir.path().join("data.bin"));

    idx.insert(&record(5, 0), 0)?;
    idx.insert(&record(13, 0), 24)?;
    idx.remove(&5)?;

    assert!(idx.search(&5)?.is_empty());
    assert_eq!(idx.search(&13)?, vec![record(13, 0)]);
    // 13 was swapped down into slot 0.
    assert_eq!(chain_key_sets(&idx, 5), vec![vec![13]]);
    check_invariants(&idx);
    Ok(())
}

// -------------------- Reopen --------------------

#[test]
fn reopen_finds_previous_insert() -> Result<()> {
    let dir = tempdir()?;
    let data = dir.path().join("data.bin");

    {
        let mut idx = open_tiny(&data);
        idx.insert(&record(7, 42), 0)?;
    }

    let idx = HashIndex::open(tiny_config(&data))?;
    assert_eq!(idx.search(&7)?, vec![record(7, 42)]);
    check_invariants(&idx);
    Ok(())
}
