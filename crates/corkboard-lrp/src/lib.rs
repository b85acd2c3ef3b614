//! corkboard-lrp — ActualLRP lifecycle orchestration.
//!
//! `LrpStore` is the write path for instance state: every claim, start,
//! crash, failure, removal, and retirement runs as a read, a transition
//! decision against that snapshot, and a compare-and-swap write, retried a
//! bounded number of times under contention. Committed changes publish an
//! event on the hub; crashes and retirements then hand unclaimed slots to
//! the auctioneer, or reap them when their desired LRP is gone.
//!
//! Collaborators sit behind narrow traits (`AuctioneerClient`,
//! `CellPresenceClient`, `Clock`) with recording fakes in [`fakes`], so
//! lifecycle behavior tests can drive the real store against an in-memory
//! record store.

pub mod clients;
pub mod clock;
pub mod fakes;
pub mod machine;
pub mod paths;
pub mod reads;
pub mod store;

pub use clients::{AuctioneerClient, CellPresenceClient};
pub use clock::{Clock, FakeClock, SystemClock};
pub use machine::{
    CRASH_RESET_TIMEOUT, CrashOutcome, DEFAULT_IMMEDIATE_RESTARTS, RestartPolicy, apply_crash,
    evaluate_crash,
};
pub use store::{CAS_RETRY_ATTEMPTS, LrpStore, RETIRE_RETRY_ATTEMPTS};
