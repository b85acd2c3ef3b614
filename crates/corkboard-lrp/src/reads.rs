//! Read-side operations: group lookups, desired LRPs, and domain
//! freshness.
//!
//! Reads never mutate records. Group listings merge the instance and
//! evacuating records of each `(process_guid, index)` pair and come back
//! ordered by process guid and index, so repeated listings of an unchanged
//! store are identical.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use corkboard_models::{
    ActualLrpFilter, ActualLrpGroup, DesiredLrp, DesiredLrpFilter, Error, Result,
};
use corkboard_records::RecordError;

use crate::paths;
use crate::store::{LrpStore, decode, storage_error};

/// Persisted freshness marker for one domain. `expires_at` is absolute
/// nanoseconds; zero means the domain never expires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct DomainRecord {
    domain: String,
    expires_at: i64,
}

impl LrpStore {
    /// Both records, instance and evacuating, for one slot. Fails with
    /// `ResourceNotFound` when neither exists.
    pub async fn actual_lrp_group_by_process_guid_and_index(
        &self,
        process_guid: &str,
        index: u32,
    ) -> Result<ActualLrpGroup> {
        let mut group = ActualLrpGroup::default();

        match self.records().get(&paths::actual_lrp_instance_path(process_guid, index)) {
            Ok(record) => group.instance = Some(decode(&record.bytes)?),
            Err(RecordError::NotFound(_)) => {}
            Err(err) => return Err(storage_error(err)),
        }
        match self.records().get(&paths::actual_lrp_evacuating_path(process_guid, index)) {
            Ok(record) => group.evacuating = Some(decode(&record.bytes)?),
            Err(RecordError::NotFound(_)) => {}
            Err(err) => return Err(storage_error(err)),
        }

        if group.instance.is_none() && group.evacuating.is_none() {
            return Err(Error::ResourceNotFound);
        }
        Ok(group)
    }

    /// Every group of one process, ordered by index.
    pub async fn actual_lrp_groups_by_process_guid(
        &self,
        process_guid: &str,
    ) -> Result<Vec<ActualLrpGroup>> {
        self.collect_groups(
            &paths::actual_lrp_process_dir(process_guid),
            &ActualLrpFilter::default(),
        )
    }

    /// Every group in the store matching `filter`, ordered by process guid
    /// and index.
    pub async fn actual_lrp_groups(&self, filter: &ActualLrpFilter) -> Result<Vec<ActualLrpGroup>> {
        self.collect_groups(paths::ACTUAL_LRP_DIR, filter)
    }

    /// The desired LRP for a process. `ResourceNotFound` when absent.
    pub async fn desired_lrp_by_process_guid(&self, process_guid: &str) -> Result<DesiredLrp> {
        let record = match self.records().get(&paths::desired_lrp_path(process_guid)) {
            Ok(record) => record,
            Err(RecordError::NotFound(_)) => return Err(Error::ResourceNotFound),
            Err(err) => return Err(storage_error(err)),
        };
        Ok(serde_json::from_slice(&record.bytes)?)
    }

    /// Every desired LRP matching `filter`, ordered by process guid.
    pub async fn desired_lrps(&self, filter: &DesiredLrpFilter) -> Result<Vec<DesiredLrp>> {
        let entries = self.records().list(paths::DESIRED_LRP_DIR).map_err(storage_error)?;
        let mut desireds = Vec::new();
        for (_, record) in entries {
            let desired: DesiredLrp = serde_json::from_slice(&record.bytes)?;
            if filter.matches(&desired) {
                desireds.push(desired);
            }
        }
        Ok(desireds)
    }

    /// Every domain whose freshness has not lapsed, in name order.
    ///
    /// Expiry is lazy: stale records are skipped here, not deleted.
    pub async fn domains(&self) -> Result<Vec<String>> {
        let now_ns = self.now_ns();
        let entries = self.records().list(paths::DOMAIN_DIR).map_err(storage_error)?;
        let mut domains = Vec::new();
        for (_, record) in entries {
            let domain: DomainRecord = serde_json::from_slice(&record.bytes)?;
            if domain.expires_at == 0 || domain.expires_at > now_ns {
                domains.push(domain.domain);
            } else {
                debug!(domain = %domain.domain, "skipping expired domain");
            }
        }
        Ok(domains)
    }

    /// Mark `domain` fresh for `ttl` from now. A zero `ttl` never expires.
    pub async fn upsert_domain(&self, domain: &str, ttl: Duration) -> Result<()> {
        if domain.is_empty() {
            return Err(Error::InvalidDomain);
        }

        let expires_at = if ttl.is_zero() {
            0
        } else {
            self.now_ns() + ttl.as_nanos() as i64
        };
        let record = DomainRecord { domain: domain.to_string(), expires_at };
        let bytes = serde_json::to_vec(&record).map_err(|e| Error::Serialize(e.to_string()))?;
        let path = paths::domain_path(domain);

        for _ in 0..crate::store::CAS_RETRY_ATTEMPTS {
            let existing = match self.records().get(&path) {
                Ok(record) => Some(record.version),
                Err(RecordError::NotFound(_)) => None,
                Err(err) => return Err(storage_error(err)),
            };
            let written = match existing {
                Some(version) => self.records().compare_and_swap(&path, version, &bytes).map(|_| ()),
                None => self.records().create(&path, &bytes).map(|_| ()),
            };
            match written {
                Ok(()) => {
                    debug!(%domain, expires_at, "upserted domain");
                    return Ok(());
                }
                // Another writer refreshed the domain concurrently; read
                // its version and try again.
                Err(RecordError::VersionConflict { .. }) | Err(RecordError::AlreadyExists(_)) => {}
                Err(err) => return Err(storage_error(err)),
            }
        }

        Err(Error::ResourceConflict(path))
    }

    fn collect_groups(&self, prefix: &str, filter: &ActualLrpFilter) -> Result<Vec<ActualLrpGroup>> {
        let entries = self.records().list(prefix).map_err(storage_error)?;
        let mut groups: BTreeMap<(String, u32), ActualLrpGroup> = BTreeMap::new();

        for (key, record) in entries {
            let lrp = decode(&record.bytes)?;
            if !filter.matches(&lrp) {
                continue;
            }
            let slot = groups
                .entry((lrp.key.process_guid.clone(), lrp.key.index))
                .or_default();
            if paths::is_evacuating_path(&key) {
                slot.evacuating = Some(lrp);
            } else {
                slot.instance = Some(lrp);
            }
        }

        Ok(groups.into_values().collect())
    }
}
