use super::helpers::*;
use crate::HashIndex;
use anyhow::Result;
use tempfile::tempdir;

// -------------------- Basics --------------------

#[test]
fn remove_absent_key_is_a_no_op() -> Result<()> {
    let dir = tempdir()?;
    let mut idx = open_tiny(&dir.path().join("data.bin"));

    idx.insert(&record(1, 0), 0)?;
    idx.remove(&2)?;

    assert_eq!(idx.search(&1)?, vec![record(1, 0)]);
    Ok(())
}

#[test]
fn removing_sole_record_leaves_bucket_allocated() -> Result<()> {
    let dir = tempdir()?;
    let mut idx = open_tiny(&dir.path().join("data.bin"));

    idx.insert(&record(6, 0), 0)?;
    idx.remove(&6)?;

    assert!(idx.search(&6)?.is_empty());
    assert!(!idx.contains(&6)?);
    // No merge: the emptied bucket stays in the heap.
    assert_eq!(idx.bucket_count(), 1);
    check_invariants(&idx);
    Ok(())
}

#[test]
fn remove_is_idempotent() -> Result<()> {
    let dir = tempdir()?;
    let mut idx = open_tiny(&dir.path().join("data.bin"));

    idx.insert(&record(4, 0), 0)?;
    idx.insert(&record(5, 0), 24)?;

    idx.remove(&4)?;
    let after_first = (
        idx.search(&4)?,
        idx.search(&5)?,
        idx.bucket_count(),
        idx.global_depth(),
    );
    idx.remove(&4)?;
    let after_second = (
        idx.search(&4)?,
        idx.search(&5)?,
        idx.bucket_count(),
        idx.global_depth(),
    );

    assert_eq!(after_first, after_second);
    Ok(())
}

// -------------------- Chains --------------------

#[test]
fn remove_reaches_into_the_chain_tail() -> Result<()> {
    let dir = tempdir()?;
    let data = dir.path().join("data.bin");
    let mut idx = HashIndex::open(tiny_config(&data).max_depth(1)).unwrap();

    for (i, key) in [0u64, 2, 4].iter().enumerate() {
        idx.insert(&record(*key, 0), i as u64 * 24)?;
    }
    // 0 lives in the tail block behind the chained head.
    idx.remove(&0)?;

    assert!(idx.search(&0)?.is_empty());
    assert_eq!(idx.search(&2)?, vec![record(2, 0)]);
    assert_eq!(idx.search(&4)?, vec![record(4, 0)]);
    check_invariants(&idx);
    Ok(())
}

#[test]
fn secondary_mode_remove_takes_every_duplicate() -> Result<()> {
    let dir = tempdir()?;
    let data = dir.path().join("data.bin");
    let mut idx = HashIndex::open(tiny_config(&data).primary_key(false)).unwrap();

    idx.insert(&record(9, 1), 0)?;
    idx.insert(&record(9, 2), 24)?;
    idx.insert(&record(9, 3), 48)?;
    idx.insert(&record(1, 7), 72)?;

    idx.remove(&9)?;

    assert!(idx.search(&9)?.is_empty());
    assert_eq!(idx.search(&1)?, vec![record(1, 7)]);
    check_invariants(&idx);
    Ok(())
}
