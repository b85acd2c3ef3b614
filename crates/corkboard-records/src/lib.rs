//! corkboard-records — the versioned record store underneath Corkboard.
//!
//! A minimal key-value abstraction with the four properties optimistic
//! concurrency needs: versioned reads, creates that fail on collision,
//! compare-and-swap writes, and compare-and-delete. Keys are logical paths
//! (`v1/actual/{guid}/{index}/instance`) so related records scan as a
//! prefix range.
//!
//! The `RecordStore` trait keeps the orchestration layer storage-agnostic
//! and lets tests inject conflicts; `RedbRecordStore` is the production
//! implementation, embedded via [redb](https://docs.rs/redb) with on-disk
//! and in-memory backends. It is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks.

pub mod error;
pub mod redb_store;
pub mod store;

pub use error::{RecordError, RecordResult};
pub use redb_store::RedbRecordStore;
pub use store::{RecordStore, VersionedRecord};
