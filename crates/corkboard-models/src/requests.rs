//! Request and filter types carried into store operations.

use serde::{Deserialize, Serialize};

use crate::actual_lrp::{ActualLrp, ActualLrpInstanceKey, ActualLrpKey};
use crate::desired_lrp::DesiredLrp;

/// A cell's report that an instance crashed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrashActualLrpRequest {
    pub actual_lrp_key: ActualLrpKey,
    pub actual_lrp_instance_key: ActualLrpInstanceKey,
    #[serde(default)]
    pub error_message: String,
}

impl CrashActualLrpRequest {
    pub fn new(
        key: ActualLrpKey,
        instance_key: ActualLrpInstanceKey,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            actual_lrp_key: key,
            actual_lrp_instance_key: instance_key,
            error_message: error_message.into(),
        }
    }
}

/// An auction request: place these indices of this desired LRP.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LrpStartRequest {
    pub desired_lrp: DesiredLrp,
    pub indices: Vec<u32>,
}

impl LrpStartRequest {
    pub fn new(desired_lrp: DesiredLrp, indices: Vec<u32>) -> Self {
        Self { desired_lrp, indices }
    }
}

/// Narrows group listings by freshness domain and/or hosting cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActualLrpFilter {
    pub domain: Option<String>,
    pub cell_id: Option<String>,
}

impl ActualLrpFilter {
    pub fn matches(&self, lrp: &ActualLrp) -> bool {
        if let Some(domain) = &self.domain
            && lrp.key.domain != *domain
        {
            return false;
        }
        if let Some(cell_id) = &self.cell_id
            && lrp.instance_key.cell_id != *cell_id
        {
            return false;
        }
        true
    }
}

/// Narrows desired-LRP listings by freshness domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredLrpFilter {
    pub domain: Option<String>,
}

impl DesiredLrpFilter {
    pub fn matches(&self, desired: &DesiredLrp) -> bool {
        match &self.domain {
            Some(domain) => desired.domain == *domain,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actual_lrp::ActualLrpState;

    fn running_lrp(domain: &str, cell_id: &str) -> ActualLrp {
        let mut lrp = ActualLrp::unclaimed(ActualLrpKey::new("guid", 0, domain), 0);
        lrp.state = ActualLrpState::Running;
        lrp.instance_key = ActualLrpInstanceKey::new("instance", cell_id);
        lrp
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = ActualLrpFilter::default();
        assert!(filter.matches(&running_lrp("domain-a", "cell-1")));
    }

    #[test]
    fn filters_narrow_by_domain_and_cell() {
        let filter = ActualLrpFilter {
            domain: Some("domain-a".into()),
            cell_id: Some("cell-1".into()),
        };
        assert!(filter.matches(&running_lrp("domain-a", "cell-1")));
        assert!(!filter.matches(&running_lrp("domain-b", "cell-1")));
        assert!(!filter.matches(&running_lrp("domain-a", "cell-2")));
    }

    #[test]
    fn desired_filter_narrows_by_domain() {
        let filter = DesiredLrpFilter { domain: Some("fresh".into()) };
        assert!(filter.matches(&DesiredLrp::new("guid", "fresh", 1)));
        assert!(!filter.matches(&DesiredLrp::new("guid", "stale", 1)));
    }
}
