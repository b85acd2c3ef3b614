//! The record store abstraction Corkboard mutates through.

use crate::error::RecordResult;

/// A value read from the store, paired with the version a subsequent
/// compare-and-swap or compare-and-delete must present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRecord {
    pub bytes: Vec<u8>,
    pub version: u64,
}

/// Versioned key-value persistence with the conditional operations
/// optimistic concurrency needs.
///
/// Implementations must be internally consistent under concurrent use:
/// two compare-and-swap calls presenting the same version must not both
/// succeed. Keys are logical paths; `list` scans a prefix in key order.
pub trait RecordStore: Send + Sync {
    /// Read the record at `key`. `NotFound` when absent.
    fn get(&self, key: &str) -> RecordResult<VersionedRecord>;

    /// Create the record at `key`, failing with `AlreadyExists` on
    /// collision. Returns the new record's version.
    fn create(&self, key: &str, bytes: &[u8]) -> RecordResult<u64>;

    /// Replace the record at `key` if its version is still
    /// `expected_version`; `VersionConflict` otherwise. Returns the new
    /// version.
    fn compare_and_swap(&self, key: &str, expected_version: u64, bytes: &[u8])
    -> RecordResult<u64>;

    /// Delete the record at `key` if its version is still
    /// `expected_version`; `VersionConflict` otherwise.
    fn compare_and_delete(&self, key: &str, expected_version: u64) -> RecordResult<()>;

    /// Delete the record at `key` unconditionally. `NotFound` when absent.
    fn delete(&self, key: &str) -> RecordResult<()>;

    /// All records whose key starts with `prefix`, in key order.
    fn list(&self, prefix: &str) -> RecordResult<Vec<(String, VersionedRecord)>>;
}
