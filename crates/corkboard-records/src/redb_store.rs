//! RedbRecordStore — embedded record persistence backed by redb.
//!
//! All records live in one table keyed by logical path. Each value is an
//! envelope: an 8-byte big-endian version followed by the payload bytes.
//! Versions start at 1 on create and increment on every compare-and-swap,
//! so a version observed by `get` stays comparable across reopens. redb
//! serializes write transactions, which is what makes the read-check-write
//! inside each conditional operation atomic.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::{RecordError, RecordResult};
use crate::store::{RecordStore, VersionedRecord};

/// All records, keyed by logical path (`v1/actual/{guid}/{index}/instance`).
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Convert any `Display` error into a `RecordError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| RecordError::$variant(e.to_string())
    };
}

fn encode_envelope(version: u64, bytes: &[u8]) -> Vec<u8> {
    let mut value = Vec::with_capacity(8 + bytes.len());
    value.extend_from_slice(&version.to_be_bytes());
    value.extend_from_slice(bytes);
    value
}

fn decode_envelope(key: &str, value: &[u8]) -> RecordResult<VersionedRecord> {
    if value.len() < 8 {
        return Err(RecordError::Corrupt(key.to_string()));
    }
    let (version_bytes, payload) = value.split_at(8);
    let mut version = [0u8; 8];
    version.copy_from_slice(version_bytes);
    Ok(VersionedRecord {
        bytes: payload.to_vec(),
        version: u64::from_be_bytes(version),
    })
}

/// Thread-safe record store backed by redb.
#[derive(Clone)]
pub struct RedbRecordStore {
    db: Arc<Database>,
}

impl RedbRecordStore {
    /// Open (or create) a persistent record store at the given path.
    pub fn open(path: &Path) -> RecordResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!(?path, "record store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory record store (for testing).
    pub fn open_in_memory() -> RecordResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!("in-memory record store opened");
        Ok(store)
    }

    /// Create the records table if it doesn't exist yet.
    fn ensure_table(&self) -> RecordResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RECORDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

impl RecordStore for RedbRecordStore {
    fn get(&self, key: &str) -> RecordResult<VersionedRecord> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => decode_envelope(key, guard.value()),
            None => Err(RecordError::NotFound(key.to_string())),
        }
    }

    fn create(&self, key: &str, bytes: &[u8]) -> RecordResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            if table.get(key).map_err(map_err!(Read))?.is_some() {
                return Err(RecordError::AlreadyExists(key.to_string()));
            }
            table
                .insert(key, encode_envelope(1, bytes).as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "record created");
        Ok(1)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected_version: u64,
        bytes: &[u8],
    ) -> RecordResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let next_version;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            let current = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => decode_envelope(key, guard.value())?,
                None => return Err(RecordError::NotFound(key.to_string())),
            };
            if current.version != expected_version {
                return Err(RecordError::VersionConflict {
                    key: key.to_string(),
                    expected: expected_version,
                    actual: current.version,
                });
            }
            next_version = current.version + 1;
            table
                .insert(key, encode_envelope(next_version, bytes).as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, version = next_version, "record swapped");
        Ok(next_version)
    }

    fn compare_and_delete(&self, key: &str, expected_version: u64) -> RecordResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            let current = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => decode_envelope(key, guard.value())?,
                None => return Err(RecordError::NotFound(key.to_string())),
            };
            if current.version != expected_version {
                return Err(RecordError::VersionConflict {
                    key: key.to_string(),
                    expected: expected_version,
                    actual: current.version,
                });
            }
            table.remove(key).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "record deleted");
        Ok(())
    }

    fn delete(&self, key: &str) -> RecordResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if !existed {
            return Err(RecordError::NotFound(key.to_string()));
        }
        debug!(%key, "record deleted");
        Ok(())
    }

    fn list(&self, prefix: &str) -> RecordResult<Vec<(String, VersionedRecord)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let record = decode_envelope(key.value(), value.value())?;
                results.push((key.value().to_string(), record));
            }
        }
        Ok(results)
    }
}
