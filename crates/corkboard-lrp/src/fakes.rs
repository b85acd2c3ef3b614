//! Recording fakes for the collaborator traits.
//!
//! Each fake records the arguments of every call and can be primed to
//! return an error, so store tests can assert exactly what went over the
//! wire without a live auctioneer or cell registry.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use anyhow::anyhow;

use corkboard_models::LrpStartRequest;

use crate::clients::{AuctioneerClient, CellPresenceClient};

/// In-memory [`AuctioneerClient`] that records every batch of start requests.
#[derive(Debug, Default)]
pub struct FakeAuctioneerClient {
    calls: Mutex<Vec<Vec<LrpStartRequest>>>,
    fail_with: Mutex<Option<String>>,
}

impl FakeAuctioneerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `request_lrp_auctions` has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// The start requests passed to the `i`th call (zero-based).
    pub fn requests_for_call(&self, i: usize) -> Vec<LrpStartRequest> {
        self.calls.lock().unwrap()[i].clone()
    }

    /// Make every subsequent call fail with `message`.
    pub fn set_error(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl AuctioneerClient for FakeAuctioneerClient {
    async fn request_lrp_auctions(&self, starts: &[LrpStartRequest]) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(starts.to_vec());
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(anyhow!(message));
        }
        Ok(())
    }
}

/// In-memory [`CellPresenceClient`] backed by a set of present cell ids.
#[derive(Debug, Default)]
pub struct FakeCellPresenceClient {
    present: Mutex<HashSet<String>>,
    queries: Mutex<Vec<String>>,
    fail_with: Mutex<Option<String>>,
}

impl FakeCellPresenceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `cell_id` as present.
    pub fn add_cell(&self, cell_id: &str) {
        self.present.lock().unwrap().insert(cell_id.to_string());
    }

    /// Every cell id that has been queried, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// Make every subsequent lookup fail with `message`.
    pub fn set_error(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl CellPresenceClient for FakeCellPresenceClient {
    async fn cell_present(&self, cell_id: &str) -> anyhow::Result<bool> {
        self.queries.lock().unwrap().push(cell_id.to_string());
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(anyhow!(message));
        }
        Ok(self.present.lock().unwrap().contains(cell_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use corkboard_models::{DesiredLrp, LrpStartRequest};

    #[tokio::test]
    async fn auctioneer_fake_records_calls_in_order() {
        let fake = FakeAuctioneerClient::new();
        assert_eq!(fake.call_count(), 0);

        let desired = DesiredLrp {
            process_guid: "some-process-guid".to_string(),
            domain: "tests".to_string(),
            instances: 2,
        };
        let start = LrpStartRequest::new(desired, vec![1]);
        fake.request_lrp_auctions(&[start.clone()]).await.unwrap();

        assert_eq!(fake.call_count(), 1);
        assert_eq!(fake.requests_for_call(0), vec![start]);
    }

    #[tokio::test]
    async fn auctioneer_fake_returns_primed_error() {
        let fake = FakeAuctioneerClient::new();
        fake.set_error("boom");

        let err = fake.request_lrp_auctions(&[]).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        // The failed call is still recorded.
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn presence_fake_answers_from_its_cell_set() {
        let fake = FakeCellPresenceClient::new();
        fake.add_cell("some-cell");

        assert!(fake.cell_present("some-cell").await.unwrap());
        assert!(!fake.cell_present("other-cell").await.unwrap());
        assert_eq!(fake.queries(), vec!["some-cell", "other-cell"]);
    }
}
