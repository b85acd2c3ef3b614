//! Desired-LRP projection consulted by crash and auction paths.
//!
//! Corkboard only reads desired records that something else wrote; the full
//! desired-LRP definition and its CRUD surface live outside this core.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The slice of a desired-LRP definition the consistency core needs:
/// identity, freshness domain, and how many instances should exist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DesiredLrp {
    pub process_guid: String,
    pub domain: String,
    #[serde(default)]
    pub instances: u32,
}

impl DesiredLrp {
    pub fn new(process_guid: impl Into<String>, domain: impl Into<String>, instances: u32) -> Self {
        Self { process_guid: process_guid.into(), domain: domain.into(), instances }
    }

    pub fn validate(&self) -> Result<(), Error> {
        let mut fields = Vec::new();
        if self.process_guid.is_empty() {
            fields.push("process_guid");
        }
        if self.domain.is_empty() {
            fields.push("domain");
        }
        if fields.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidRecord(format!("invalid fields: {}", fields.join(", "))))
        }
    }
}
