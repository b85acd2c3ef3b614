//! Persisted key layout for the record store.
//!
//! All LRP state lives under a small fixed hierarchy:
//!
//! - `v1/actual/{process_guid}/{index}/instance`
//! - `v1/actual/{process_guid}/{index}/evacuating`
//! - `v1/desired/{process_guid}`
//! - `v1/domain/{domain}`

/// Prefix covering every actual LRP record.
pub const ACTUAL_LRP_DIR: &str = "v1/actual/";

/// Prefix covering every desired LRP record.
pub const DESIRED_LRP_DIR: &str = "v1/desired/";

/// Prefix covering every domain freshness record.
pub const DOMAIN_DIR: &str = "v1/domain/";

const INSTANCE_SUFFIX: &str = "instance";
const EVACUATING_SUFFIX: &str = "evacuating";

/// Prefix covering both records of every index of one process.
pub fn actual_lrp_process_dir(process_guid: &str) -> String {
    format!("{ACTUAL_LRP_DIR}{process_guid}/")
}

/// Key of the instance record for one index of a process.
pub fn actual_lrp_instance_path(process_guid: &str, index: u32) -> String {
    format!("{ACTUAL_LRP_DIR}{process_guid}/{index}/{INSTANCE_SUFFIX}")
}

/// Key of the evacuating record for one index of a process.
pub fn actual_lrp_evacuating_path(process_guid: &str, index: u32) -> String {
    format!("{ACTUAL_LRP_DIR}{process_guid}/{index}/{EVACUATING_SUFFIX}")
}

/// Whether `key` names an evacuating record rather than an instance record.
pub fn is_evacuating_path(key: &str) -> bool {
    key.ends_with(EVACUATING_SUFFIX)
}

/// Key of the desired LRP record for a process.
pub fn desired_lrp_path(process_guid: &str) -> String {
    format!("{DESIRED_LRP_DIR}{process_guid}")
}

/// Key of the freshness record for a domain.
pub fn domain_path(domain: &str) -> String {
    format!("{DOMAIN_DIR}{domain}")
}
