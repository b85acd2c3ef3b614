//! ActualLRP records — the canonical state of one process instance slot.
//!
//! An ActualLRP tracks a single `(process_guid, index)` slot through its
//! lifecycle: Unclaimed (awaiting placement), Claimed (a cell accepted it),
//! Running (started, with network info), and Crashed (parked after repeated
//! failures). All types serialize to the JSON shape persisted in the record
//! store and carried in events: key structs flatten into the record.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::tag::ModificationTag;

// ── Keys ──────────────────────────────────────────────────────────

/// Identity of one desired slot of a process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActualLrpKey {
    pub process_guid: String,
    pub index: u32,
    pub domain: String,
}

/// Identity of one concrete placement: which container on which cell.
///
/// The default (both fields empty) is the canonical "no placement" value
/// carried by Unclaimed and Crashed records.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActualLrpInstanceKey {
    #[serde(default)]
    pub instance_guid: String,
    #[serde(default)]
    pub cell_id: String,
}

/// One container-to-host port mapping.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u32,
    pub host_port: u32,
}

/// Network reachability of a Running instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActualLrpNetInfo {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
}

impl ActualLrpKey {
    pub fn new(process_guid: impl Into<String>, index: u32, domain: impl Into<String>) -> Self {
        Self { process_guid: process_guid.into(), index, domain: domain.into() }
    }

    fn collect_invalid_fields(&self, fields: &mut Vec<&'static str>) {
        if self.process_guid.is_empty() {
            fields.push("process_guid");
        }
        if self.domain.is_empty() {
            fields.push("domain");
        }
    }
}

impl ActualLrpInstanceKey {
    pub fn new(instance_guid: impl Into<String>, cell_id: impl Into<String>) -> Self {
        Self { instance_guid: instance_guid.into(), cell_id: cell_id.into() }
    }

    /// True for the canonical "no placement" value.
    pub fn is_empty(&self) -> bool {
        self.instance_guid.is_empty() && self.cell_id.is_empty()
    }

    fn collect_invalid_fields(&self, fields: &mut Vec<&'static str>) {
        if self.instance_guid.is_empty() {
            fields.push("instance_guid");
        }
        if self.cell_id.is_empty() {
            fields.push("cell_id");
        }
    }
}

impl PortMapping {
    pub fn new(container_port: u32, host_port: u32) -> Self {
        Self { container_port, host_port }
    }
}

impl ActualLrpNetInfo {
    pub fn new(address: impl Into<String>, ports: Vec<PortMapping>) -> Self {
        Self { address: address.into(), ports }
    }

    /// True for the canonical "no network" value.
    pub fn is_empty(&self) -> bool {
        self.address.is_empty() && self.ports.is_empty()
    }

    fn collect_invalid_fields(&self, fields: &mut Vec<&'static str>) {
        if self.address.is_empty() {
            fields.push("address");
        }
    }
}

// ── State ─────────────────────────────────────────────────────────

/// Lifecycle state of an ActualLRP record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActualLrpState {
    Unclaimed,
    Claimed,
    Running,
    Crashed,
}

impl ActualLrpState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActualLrpState::Unclaimed => "UNCLAIMED",
            ActualLrpState::Claimed => "CLAIMED",
            ActualLrpState::Running => "RUNNING",
            ActualLrpState::Crashed => "CRASHED",
        }
    }
}

impl fmt::Display for ActualLrpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Record ────────────────────────────────────────────────────────

/// The persisted record of one instance slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActualLrp {
    #[serde(flatten)]
    pub key: ActualLrpKey,
    #[serde(flatten)]
    pub instance_key: ActualLrpInstanceKey,
    #[serde(flatten)]
    pub net_info: ActualLrpNetInfo,
    pub state: ActualLrpState,
    /// Wall-clock nanoseconds, set whenever `state` changes.
    #[serde(default)]
    pub since: i64,
    #[serde(default)]
    pub crash_count: u32,
    #[serde(default)]
    pub crash_reason: String,
    /// Why placement failed; set only while Unclaimed.
    #[serde(default)]
    pub placement_error: String,
    #[serde(default)]
    pub modification_tag: ModificationTag,
}

impl ActualLrp {
    /// A freshly created record: Unclaimed, unplaced, new tag lineage.
    pub fn unclaimed(key: ActualLrpKey, since: i64) -> Self {
        Self {
            key,
            instance_key: ActualLrpInstanceKey::default(),
            net_info: ActualLrpNetInfo::default(),
            state: ActualLrpState::Unclaimed,
            since,
            crash_count: 0,
            crash_reason: String::new(),
            placement_error: String::new(),
            modification_tag: ModificationTag::fresh(),
        }
    }

    /// State-dependent structural validation, run before any write.
    ///
    /// Unclaimed and Crashed records must be unplaced; Claimed records carry
    /// an instance key but no network info; Running records carry both.
    pub fn validate(&self) -> Result<(), Error> {
        let mut fields = Vec::new();
        self.key.collect_invalid_fields(&mut fields);
        match self.state {
            ActualLrpState::Unclaimed | ActualLrpState::Crashed => {
                if !self.instance_key.is_empty() {
                    fields.push("instance_key");
                }
                if !self.net_info.is_empty() {
                    fields.push("net_info");
                }
            }
            ActualLrpState::Claimed => {
                self.instance_key.collect_invalid_fields(&mut fields);
                if !self.net_info.is_empty() {
                    fields.push("net_info");
                }
            }
            ActualLrpState::Running => {
                self.instance_key.collect_invalid_fields(&mut fields);
                self.net_info.collect_invalid_fields(&mut fields);
            }
        }
        if fields.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidRecord(format!("invalid fields: {}", fields.join(", "))))
        }
    }

    /// Whether a request bearing `key`/`instance_key` may move this record
    /// to `target`.
    ///
    /// The key must always match. While the record is placed (Claimed or
    /// Running), only the placing instance may re-claim or re-start it;
    /// every other transition is open.
    pub fn allows_transition_to(
        &self,
        key: &ActualLrpKey,
        instance_key: &ActualLrpInstanceKey,
        target: ActualLrpState,
    ) -> bool {
        if self.key != *key {
            return false;
        }
        let placed = matches!(self.state, ActualLrpState::Claimed | ActualLrpState::Running);
        let placing = matches!(target, ActualLrpState::Claimed | ActualLrpState::Running);
        if placed && placing && self.instance_key != *instance_key {
            return false;
        }
        true
    }

    /// Whether a crash report bearing `key`/`instance_key` applies to this
    /// record. Unplaced records (Unclaimed, Crashed) cannot crash; placed
    /// records accept the report only from their own instance.
    pub fn allows_crash(&self, key: &ActualLrpKey, instance_key: &ActualLrpInstanceKey) -> bool {
        match self.state {
            ActualLrpState::Unclaimed | ActualLrpState::Crashed => false,
            ActualLrpState::Claimed | ActualLrpState::Running => {
                self.key == *key && self.instance_key == *instance_key
            }
        }
    }
}

// ── Group ─────────────────────────────────────────────────────────

/// The pair of records that may exist for one `(process_guid, index)`:
/// the authoritative instance record and, while a cell drains, a temporary
/// evacuating copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActualLrpGroup {
    pub instance: Option<ActualLrp>,
    pub evacuating: Option<ActualLrp>,
}

impl ActualLrpGroup {
    pub fn with_instance(instance: ActualLrp) -> Self {
        Self { instance: Some(instance), evacuating: None }
    }

    pub fn with_evacuating(evacuating: ActualLrp) -> Self {
        Self { instance: None, evacuating: Some(evacuating) }
    }

    /// The record a consumer should treat as authoritative: the evacuating
    /// copy while the instance record is absent or unplaced, otherwise the
    /// instance record. `None` only for the empty group, which reads never
    /// return.
    pub fn resolve(&self) -> Option<&ActualLrp> {
        match (&self.instance, &self.evacuating) {
            (None, None) => None,
            (None, Some(evacuating)) => Some(evacuating),
            (Some(instance), None) => Some(instance),
            (Some(instance), Some(evacuating)) => match instance.state {
                ActualLrpState::Unclaimed | ActualLrpState::Crashed => Some(evacuating),
                _ => Some(instance),
            },
        }
    }
}
