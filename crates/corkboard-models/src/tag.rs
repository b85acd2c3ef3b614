//! Modification tags — the client-visible version counter inside a record.
//!
//! The record store's per-key version protects writers (compare-and-swap);
//! the modification tag inside the value protects readers, letting them ask
//! "has this record changed since I looked?" across store generations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version marker carried inside every persisted ActualLRP record.
///
/// `epoch` identifies one record lineage (assigned at creation, never
/// changed); `index` increments by exactly one on every successful write.
/// Tags from different epochs are not ordered relative to each other.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModificationTag {
    pub epoch: String,
    pub index: u32,
}

impl ModificationTag {
    pub fn new(epoch: impl Into<String>, index: u32) -> Self {
        Self { epoch: epoch.into(), index }
    }

    /// Tag for a brand-new record lineage: fresh random epoch, index 0.
    pub fn fresh() -> Self {
        Self { epoch: Uuid::new_v4().to_string(), index: 0 }
    }

    /// Bump the index after a successful mutation.
    pub fn increment(&mut self) {
        self.index += 1;
    }

    /// Whether `other` describes a strictly newer revision than `self`.
    ///
    /// An empty epoch on either side means "unknown lineage" and compares as
    /// succeeded, so stale readers always refresh. Within one epoch only a
    /// strictly greater index counts; a different epoch always counts.
    pub fn succeeded_by(&self, other: &ModificationTag) -> bool {
        if self.epoch.is_empty() || other.epoch.is_empty() {
            return true;
        }
        self.epoch != other.epoch || self.index < other.index
    }
}
