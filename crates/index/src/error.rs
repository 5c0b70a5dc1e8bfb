use bucket::BucketError;
use directory::DirectoryError;
use thiserror::Error;

/// Errors surfaced by the index facade.
///
/// Lower layers keep their own error enums; the facade flattens them into
/// these four kinds so callers only ever match on I/O failures, corruption,
/// duplicate keys, and construction-time misconfiguration. Overflow chains
/// are unbounded, so a degenerate key distribution fills chains instead of
/// producing an error.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Failure to open, read, or write one of the index files. Propagated
    /// as-is; the operation is aborted, not retried.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The directory and hash file do not parse as a consistent pair, or an
    /// invariant failed on load.
    #[error("corrupt index: {0}")]
    Corrupt(String),

    /// Primary-key insert of a key already present in the reachable chain.
    /// Carries the record's byte offset in the primary file; no state was
    /// changed.
    #[error("duplicate key for record at primary offset {0}")]
    DuplicateKey(u64),

    /// Unusable construction parameters (record does not fit a block, zero
    /// or oversized depth, block size not a power of two).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<BucketError> for IndexError {
    fn from(err: BucketError) -> Self {
        match err {
            BucketError::Io(e) => IndexError::Io(e),
            BucketError::Corrupt(msg) => IndexError::Corrupt(msg),
            BucketError::InvalidGeometry(msg) => IndexError::InvalidConfig(msg),
        }
    }
}

impl From<DirectoryError> for IndexError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Io(e) => IndexError::Io(e),
            DirectoryError::Corrupt(msg) => IndexError::Corrupt(msg),
        }
    }
}
