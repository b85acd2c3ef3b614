//! Outbound collaborator interfaces.
//!
//! The store talks to the rest of the cluster through two narrow traits:
//! the auctioneer (to place unclaimed work) and the cell registry (to ask
//! whether a cell is still alive). Both are trait objects so tests can
//! substitute the fakes in [`crate::fakes`].

use async_trait::async_trait;

use corkboard_models::LrpStartRequest;

/// Client for the auction service that places unclaimed LRP instances.
#[async_trait]
pub trait AuctioneerClient: Send + Sync {
    /// Submit start requests for auctioning. Each request names a desired
    /// LRP and the indices that need placement.
    async fn request_lrp_auctions(&self, starts: &[LrpStartRequest]) -> anyhow::Result<()>;
}

/// Client for the cell presence registry.
#[async_trait]
pub trait CellPresenceClient: Send + Sync {
    /// Whether the cell with `cell_id` currently maintains a presence.
    async fn cell_present(&self, cell_id: &str) -> anyhow::Result<bool>;
}
