//! The LRP store — every ActualLRP lifecycle mutation goes through here.
//!
//! Each operation follows the same shape: read the current record, decide
//! the transition against that snapshot, write back with compare-and-swap,
//! publish an event for the committed change, then run post-commit side
//! effects (auction requests, reaping). A lost CAS race re-reads and
//! re-decides, up to a bounded number of attempts.
//!
//! Refused transitions and no-op writes leave the record untouched and
//! publish nothing.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use corkboard_events::Hub;
use corkboard_models::{
    ActualLrp, ActualLrpGroup, ActualLrpInstanceKey, ActualLrpKey, ActualLrpNetInfo,
    ActualLrpState, CrashActualLrpRequest, DesiredLrp, Error, Event, LrpStartRequest, Result,
};
use corkboard_records::{RecordError, RecordStore};

use crate::clients::{AuctioneerClient, CellPresenceClient};
use crate::clock::{Clock, SystemClock};
use crate::machine::{self, RestartPolicy};
use crate::paths;

/// Attempts a lifecycle write makes before giving up on a contended record.
pub const CAS_RETRY_ATTEMPTS: usize = 3;

/// Attempts retirement makes. Retirement races with evacuating cells, so
/// it tolerates more contention than ordinary writes.
pub const RETIRE_RETRY_ATTEMPTS: usize = 5;

// ── Store ─────────────────────────────────────────────────────────

/// Orchestrates ActualLRP lifecycle transitions over a [`RecordStore`],
/// publishing an event for every committed change.
///
/// Cloning is cheap; clones share the same backing store, hub, and
/// collaborator clients.
#[derive(Clone)]
pub struct LrpStore {
    records: Arc<dyn RecordStore>,
    hub: Hub,
    auctioneer: Arc<dyn AuctioneerClient>,
    cells: Arc<dyn CellPresenceClient>,
    clock: Arc<dyn Clock>,
    restart_policy: RestartPolicy,
    cas_retries: usize,
    retire_retries: usize,
}

impl LrpStore {
    pub fn new(
        records: Arc<dyn RecordStore>,
        hub: Hub,
        auctioneer: Arc<dyn AuctioneerClient>,
        cells: Arc<dyn CellPresenceClient>,
    ) -> Self {
        Self {
            records,
            hub,
            auctioneer,
            cells,
            clock: Arc::new(SystemClock),
            restart_policy: RestartPolicy::default(),
            cas_retries: CAS_RETRY_ATTEMPTS,
            retire_retries: RETIRE_RETRY_ATTEMPTS,
        }
    }

    /// Replace the time source. Crash-loop detection and `since` stamps
    /// read through this clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the crash restart policy.
    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// The hub this store publishes record-change events to.
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    // ── Lifecycle operations ──────────────────────────────────────

    /// Create the Unclaimed instance record for one index of a desired LRP
    /// and request an auction for it.
    ///
    /// Fails with `ResourceNotFound` when no desired LRP exists for the
    /// process, and `ResourceConflict` when the record already exists.
    pub async fn create_unclaimed_actual_lrp(&self, key: &ActualLrpKey) -> Result<ActualLrpGroup> {
        let desired = self.desired_lrp_by_process_guid(&key.process_guid).await?;

        let lrp = ActualLrp::unclaimed(key.clone(), self.clock.now_ns());
        lrp.validate()?;

        let path = paths::actual_lrp_instance_path(&key.process_guid, key.index);
        self.records
            .create(&path, &encode(&lrp)?)
            .map_err(storage_error)?;
        info!(
            process_guid = %key.process_guid,
            index = key.index,
            "created unclaimed actual LRP"
        );

        let group = ActualLrpGroup::with_instance(lrp);
        self.publish(Event::created(group.clone()));
        self.request_auction(desired, key.index).await?;
        Ok(group)
    }

    /// Record that `instance_key`'s cell accepted this slot.
    ///
    /// Claiming an already-Claimed record with the same instance key is a
    /// no-op; any placement error from a failed auction round is cleared.
    pub async fn claim_actual_lrp(
        &self,
        key: &ActualLrpKey,
        instance_key: &ActualLrpInstanceKey,
    ) -> Result<ActualLrpGroup> {
        let path = paths::actual_lrp_instance_path(&key.process_guid, key.index);

        for attempt in 1..=self.cas_retries {
            let (before, version) = self.fetch_actual(&path)?;

            if !before.allows_transition_to(key, instance_key, ActualLrpState::Claimed) {
                info!(
                    process_guid = %key.process_guid,
                    index = key.index,
                    state = %before.state,
                    "refusing claim of actual LRP"
                );
                return Err(Error::ActualLrpCannotBeClaimed);
            }
            if before.state == ActualLrpState::Claimed && before.instance_key == *instance_key {
                return Ok(ActualLrpGroup::with_instance(before));
            }

            let mut after = before.clone();
            after.state = ActualLrpState::Claimed;
            after.instance_key = instance_key.clone();
            after.net_info = ActualLrpNetInfo::default();
            after.placement_error.clear();
            after.since = self.clock.now_ns();
            after.modification_tag.increment();
            after.validate()?;

            match self.records.compare_and_swap(&path, version, &encode(&after)?) {
                Ok(_) => {
                    info!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        cell_id = %instance_key.cell_id,
                        "claimed actual LRP"
                    );
                    let group = ActualLrpGroup::with_instance(after);
                    self.publish(Event::changed(
                        ActualLrpGroup::with_instance(before),
                        group.clone(),
                    ));
                    return Ok(group);
                }
                Err(RecordError::VersionConflict { .. }) => {
                    warn!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        attempt,
                        "lost claim race; retrying against a fresh read"
                    );
                }
                Err(err) => return Err(storage_error(err)),
            }
        }

        Err(Error::ResourceConflict(path))
    }

    /// Record that the instance is up and reachable at `net_info`.
    ///
    /// Creates a Running record when none exists, so a cell's report
    /// survives a lost or reaped record. A report identical to the current
    /// record is a no-op. A successful start wipes crash bookkeeping.
    pub async fn start_actual_lrp(
        &self,
        key: &ActualLrpKey,
        instance_key: &ActualLrpInstanceKey,
        net_info: &ActualLrpNetInfo,
    ) -> Result<ActualLrpGroup> {
        let path = paths::actual_lrp_instance_path(&key.process_guid, key.index);

        for attempt in 1..=self.cas_retries {
            let record = match self.records.get(&path) {
                Ok(record) => Some(record),
                Err(RecordError::NotFound(_)) => None,
                Err(err) => return Err(storage_error(err)),
            };
            let Some(record) = record else {
                match self.create_running_record(key, instance_key, net_info) {
                    // A concurrent create beat us; re-read and treat it as
                    // a transition.
                    Err(Error::ResourceConflict(_)) => continue,
                    other => return other,
                }
            };

            let before: ActualLrp = decode(&record.bytes)?;
            if before.state == ActualLrpState::Running
                && before.instance_key == *instance_key
                && before.net_info == *net_info
            {
                return Ok(ActualLrpGroup::with_instance(before));
            }
            if !before.allows_transition_to(key, instance_key, ActualLrpState::Running) {
                info!(
                    process_guid = %key.process_guid,
                    index = key.index,
                    state = %before.state,
                    "refusing start of actual LRP"
                );
                return Err(Error::ActualLrpCannotBeStarted);
            }

            let mut after = before.clone();
            after.state = ActualLrpState::Running;
            after.instance_key = instance_key.clone();
            after.net_info = net_info.clone();
            after.crash_count = 0;
            after.crash_reason.clear();
            after.placement_error.clear();
            after.since = self.clock.now_ns();
            after.modification_tag.increment();
            after.validate()?;

            match self
                .records
                .compare_and_swap(&path, record.version, &encode(&after)?)
            {
                Ok(_) => {
                    info!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        cell_id = %instance_key.cell_id,
                        address = %net_info.address,
                        "started actual LRP"
                    );
                    let group = ActualLrpGroup::with_instance(after);
                    self.publish(Event::changed(
                        ActualLrpGroup::with_instance(before),
                        group.clone(),
                    ));
                    return Ok(group);
                }
                Err(RecordError::VersionConflict { .. }) => {
                    warn!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        attempt,
                        "lost start race; retrying against a fresh read"
                    );
                }
                Err(err) => return Err(storage_error(err)),
            }
        }

        Err(Error::ResourceConflict(path))
    }

    /// Process a cell's crash report: either return the slot to the
    /// auction pool or park it as Crashed, per the restart policy.
    ///
    /// When the slot restarts but its desired LRP is gone, the record is
    /// reaped instead of auctioned.
    pub async fn crash_actual_lrp(&self, request: &CrashActualLrpRequest) -> Result<()> {
        let key = &request.actual_lrp_key;
        let instance_key = &request.actual_lrp_instance_key;
        let path = paths::actual_lrp_instance_path(&key.process_guid, key.index);

        for attempt in 1..=self.cas_retries {
            let (before, version) = self.fetch_actual(&path)?;

            let now_ns = self.clock.now_ns();
            let outcome = machine::evaluate_crash(
                &before,
                key,
                instance_key,
                now_ns,
                &self.restart_policy,
            )?;

            let mut after = before.clone();
            machine::apply_crash(&mut after, outcome, &request.error_message, now_ns);
            after.validate()?;

            match self.records.compare_and_swap(&path, version, &encode(&after)?) {
                Ok(_) => {
                    info!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        crash_count = after.crash_count,
                        state = %after.state,
                        reason = %request.error_message,
                        "crashed actual LRP"
                    );
                    self.publish(Event::changed(
                        ActualLrpGroup::with_instance(before),
                        ActualLrpGroup::with_instance(after),
                    ));
                    if outcome.requests_auction() {
                        self.auction_or_reap(key).await?;
                    }
                    return Ok(());
                }
                Err(RecordError::VersionConflict { .. }) => {
                    warn!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        attempt,
                        "lost crash race; retrying against a fresh read"
                    );
                }
                Err(err) => return Err(storage_error(err)),
            }
        }

        Err(Error::ResourceConflict(path))
    }

    /// Record why placement of an Unclaimed slot failed. The record stays
    /// Unclaimed and keeps its `since` stamp; only the error and tag move.
    pub async fn fail_actual_lrp(&self, key: &ActualLrpKey, error_message: &str) -> Result<()> {
        let path = paths::actual_lrp_instance_path(&key.process_guid, key.index);

        for attempt in 1..=self.cas_retries {
            let (before, version) = self.fetch_actual(&path)?;

            if before.state != ActualLrpState::Unclaimed {
                info!(
                    process_guid = %key.process_guid,
                    index = key.index,
                    state = %before.state,
                    "refusing placement failure for actual LRP"
                );
                return Err(Error::ActualLrpCannotBeFailed);
            }

            let mut after = before.clone();
            after.placement_error = error_message.to_string();
            after.modification_tag.increment();
            after.validate()?;

            match self.records.compare_and_swap(&path, version, &encode(&after)?) {
                Ok(_) => {
                    info!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        placement_error = %error_message,
                        "marked actual LRP as failed to place"
                    );
                    self.publish(Event::changed(
                        ActualLrpGroup::with_instance(before),
                        ActualLrpGroup::with_instance(after),
                    ));
                    return Ok(());
                }
                Err(RecordError::VersionConflict { .. }) => {
                    warn!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        attempt,
                        "lost fail race; retrying against a fresh read"
                    );
                }
                Err(err) => return Err(storage_error(err)),
            }
        }

        Err(Error::ResourceConflict(path))
    }

    /// Delete the instance record. With an instance key the deletion is
    /// guarded: a record placed by someone else is refused.
    pub async fn remove_actual_lrp(
        &self,
        key: &ActualLrpKey,
        instance_key: Option<&ActualLrpInstanceKey>,
    ) -> Result<()> {
        let path = paths::actual_lrp_instance_path(&key.process_guid, key.index);

        for attempt in 1..=self.cas_retries {
            let (before, version) = self.fetch_actual(&path)?;

            if let Some(instance_key) = instance_key
                && before.instance_key != *instance_key
            {
                info!(
                    process_guid = %key.process_guid,
                    index = key.index,
                    "refusing removal of actual LRP held by another instance"
                );
                return Err(Error::ActualLrpCannotBeRemoved);
            }

            match self.records.compare_and_delete(&path, version) {
                Ok(()) => {
                    info!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        "removed actual LRP"
                    );
                    self.publish(Event::removed(ActualLrpGroup::with_instance(before)));
                    return Ok(());
                }
                Err(RecordError::VersionConflict { .. }) => {
                    warn!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        attempt,
                        "lost remove race; retrying against a fresh read"
                    );
                }
                Err(RecordError::NotFound(_)) => return Err(Error::ResourceNotFound),
                Err(err) => return Err(storage_error(err)),
            }
        }

        Err(Error::ResourceConflict(path))
    }

    /// Take a placed slot out of service: unclaim it and hand it back to
    /// the auctioneer. The hosting cell's presence is consulted first so a
    /// registry outage aborts rather than double-scheduling.
    pub async fn retire_actual_lrp(&self, key: &ActualLrpKey) -> Result<()> {
        let path = paths::actual_lrp_instance_path(&key.process_guid, key.index);

        for attempt in 1..=self.retire_retries {
            let (before, version) = self.fetch_actual(&path)?;

            match before.state {
                ActualLrpState::Unclaimed | ActualLrpState::Crashed => {
                    info!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        state = %before.state,
                        "refusing retirement of unplaced actual LRP"
                    );
                    return Err(Error::ActualLrpCannotBeStopped);
                }
                ActualLrpState::Claimed | ActualLrpState::Running => {}
            }

            let cell_id = before.instance_key.cell_id.clone();
            let present = match self.cells.cell_present(&cell_id).await {
                Ok(present) => present,
                Err(err) => {
                    error!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        %cell_id,
                        error = %err,
                        "presence lookup failed; aborting retirement"
                    );
                    return Err(Error::UnknownError(err.to_string()));
                }
            };
            debug!(%cell_id, present, "consulted cell presence before retiring");

            let mut after = before.clone();
            after.state = ActualLrpState::Unclaimed;
            after.instance_key = ActualLrpInstanceKey::default();
            after.net_info = ActualLrpNetInfo::default();
            after.since = self.clock.now_ns();
            after.modification_tag.increment();
            after.validate()?;

            match self.records.compare_and_swap(&path, version, &encode(&after)?) {
                Ok(_) => {
                    info!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        %cell_id,
                        "retired actual LRP"
                    );
                    self.publish(Event::changed(
                        ActualLrpGroup::with_instance(before),
                        ActualLrpGroup::with_instance(after),
                    ));
                    self.auction_or_reap(key).await?;
                    return Ok(());
                }
                Err(RecordError::VersionConflict { .. }) => {
                    warn!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        attempt,
                        "lost retire race; retrying against a fresh read"
                    );
                }
                Err(err) => return Err(storage_error(err)),
            }
        }

        Err(Error::ResourceConflict(path))
    }

    // ── Evacuation ────────────────────────────────────────────────

    /// Create the evacuating record for a slot whose cell is draining. The
    /// copy runs beside the instance record until the replacement is up.
    pub async fn create_evacuating_actual_lrp(
        &self,
        key: &ActualLrpKey,
        instance_key: &ActualLrpInstanceKey,
        net_info: &ActualLrpNetInfo,
    ) -> Result<ActualLrpGroup> {
        let mut lrp = ActualLrp::unclaimed(key.clone(), self.clock.now_ns());
        lrp.state = ActualLrpState::Running;
        lrp.instance_key = instance_key.clone();
        lrp.net_info = net_info.clone();
        lrp.validate()?;

        let path = paths::actual_lrp_evacuating_path(&key.process_guid, key.index);
        self.records
            .create(&path, &encode(&lrp)?)
            .map_err(storage_error)?;
        info!(
            process_guid = %key.process_guid,
            index = key.index,
            cell_id = %instance_key.cell_id,
            "created evacuating actual LRP"
        );

        let group = ActualLrpGroup::with_evacuating(lrp);
        self.publish(Event::created(group.clone()));
        Ok(group)
    }

    /// Delete the evacuating record once its cell finishes draining. Only
    /// the instance that wrote the record may remove it.
    pub async fn remove_evacuating_actual_lrp(
        &self,
        key: &ActualLrpKey,
        instance_key: &ActualLrpInstanceKey,
    ) -> Result<()> {
        let path = paths::actual_lrp_evacuating_path(&key.process_guid, key.index);

        for attempt in 1..=self.cas_retries {
            let (before, version) = self.fetch_actual(&path)?;

            if before.instance_key != *instance_key {
                info!(
                    process_guid = %key.process_guid,
                    index = key.index,
                    "refusing removal of evacuating actual LRP held by another instance"
                );
                return Err(Error::ActualLrpCannotBeRemoved);
            }

            match self.records.compare_and_delete(&path, version) {
                Ok(()) => {
                    info!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        "removed evacuating actual LRP"
                    );
                    self.publish(Event::removed(ActualLrpGroup::with_evacuating(before)));
                    return Ok(());
                }
                Err(RecordError::VersionConflict { .. }) => {
                    warn!(
                        process_guid = %key.process_guid,
                        index = key.index,
                        attempt,
                        "lost evacuating remove race; retrying against a fresh read"
                    );
                }
                Err(RecordError::NotFound(_)) => return Err(Error::ResourceNotFound),
                Err(err) => return Err(storage_error(err)),
            }
        }

        Err(Error::ResourceConflict(path))
    }

    // ── Shared plumbing ───────────────────────────────────────────

    fn fetch_actual(&self, path: &str) -> Result<(ActualLrp, u64)> {
        let record = match self.records.get(path) {
            Ok(record) => record,
            Err(RecordError::NotFound(_)) => return Err(Error::ResourceNotFound),
            Err(err) => return Err(storage_error(err)),
        };
        Ok((decode(&record.bytes)?, record.version))
    }

    fn create_running_record(
        &self,
        key: &ActualLrpKey,
        instance_key: &ActualLrpInstanceKey,
        net_info: &ActualLrpNetInfo,
    ) -> Result<ActualLrpGroup> {
        let mut lrp = ActualLrp::unclaimed(key.clone(), self.clock.now_ns());
        lrp.state = ActualLrpState::Running;
        lrp.instance_key = instance_key.clone();
        lrp.net_info = net_info.clone();
        lrp.validate()?;

        let path = paths::actual_lrp_instance_path(&key.process_guid, key.index);
        self.records
            .create(&path, &encode(&lrp)?)
            .map_err(storage_error)?;
        info!(
            process_guid = %key.process_guid,
            index = key.index,
            cell_id = %instance_key.cell_id,
            "started actual LRP from a missing record"
        );

        let group = ActualLrpGroup::with_instance(lrp);
        self.publish(Event::created(group.clone()));
        Ok(group)
    }

    /// Hand an unclaimed slot to the auctioneer, or reap its record when
    /// the desired LRP no longer exists.
    async fn auction_or_reap(&self, key: &ActualLrpKey) -> Result<()> {
        match self.desired_lrp_by_process_guid(&key.process_guid).await {
            Ok(desired) => self.request_auction(desired, key.index).await,
            Err(Error::ResourceNotFound) => {
                info!(
                    process_guid = %key.process_guid,
                    index = key.index,
                    "desired LRP is gone; reaping actual LRP"
                );
                self.reap_actual(key)
            }
            Err(err) => Err(err),
        }
    }

    async fn request_auction(&self, desired: DesiredLrp, index: u32) -> Result<()> {
        let process_guid = desired.process_guid.clone();
        let start = LrpStartRequest::new(desired, vec![index]);
        if let Err(err) = self.auctioneer.request_lrp_auctions(&[start]).await {
            error!(%process_guid, index, error = %err, "auction request failed");
            return Err(Error::UnknownError(err.to_string()));
        }
        debug!(%process_guid, index, "requested auction");
        Ok(())
    }

    /// Delete an orphaned instance record. A racing delete is fine; the
    /// record being gone is the goal.
    fn reap_actual(&self, key: &ActualLrpKey) -> Result<()> {
        let path = paths::actual_lrp_instance_path(&key.process_guid, key.index);
        let record = match self.records.get(&path) {
            Ok(record) => record,
            Err(RecordError::NotFound(_)) => return Ok(()),
            Err(err) => return Err(storage_error(err)),
        };
        let lrp: ActualLrp = decode(&record.bytes)?;
        match self.records.delete(&path) {
            Ok(()) => {
                self.publish(Event::removed(ActualLrpGroup::with_instance(lrp)));
                Ok(())
            }
            Err(RecordError::NotFound(_)) => Ok(()),
            Err(err) => Err(storage_error(err)),
        }
    }

    pub(crate) fn publish(&self, event: Event) {
        if let Err(err) = self.hub.publish(event) {
            debug!(error = %err, "dropping record-change event");
        }
    }

    pub(crate) fn now_ns(&self) -> i64 {
        self.clock.now_ns()
    }

    pub(crate) fn records(&self) -> &dyn RecordStore {
        self.records.as_ref()
    }
}

pub(crate) fn encode(lrp: &ActualLrp) -> Result<Vec<u8>> {
    serde_json::to_vec(lrp).map_err(|e| Error::Serialize(e.to_string()))
}

pub(crate) fn decode(bytes: &[u8]) -> Result<ActualLrp> {
    Ok(serde_json::from_slice(bytes)?)
}

pub(crate) fn storage_error(err: RecordError) -> Error {
    match err {
        RecordError::NotFound(_) => Error::ResourceNotFound,
        RecordError::AlreadyExists(key) => Error::ResourceConflict(key),
        RecordError::VersionConflict { key, .. } => Error::ResourceConflict(key),
        other => Error::UnknownError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use corkboard_models::PortMapping;
    use corkboard_records::{RecordResult, RedbRecordStore, VersionedRecord};

    use crate::clock::FakeClock;
    use crate::fakes::{FakeAuctioneerClient, FakeCellPresenceClient};

    const START_NS: i64 = 1138;

    struct TestStore {
        store: LrpStore,
        records: Arc<RedbRecordStore>,
        auctioneer: Arc<FakeAuctioneerClient>,
        cells: Arc<FakeCellPresenceClient>,
        clock: Arc<FakeClock>,
        hub: Hub,
    }

    fn test_store() -> TestStore {
        let records = Arc::new(RedbRecordStore::open_in_memory().unwrap());
        let hub = Hub::new();
        let auctioneer = Arc::new(FakeAuctioneerClient::new());
        let cells = Arc::new(FakeCellPresenceClient::new());
        let clock = Arc::new(FakeClock::new(START_NS));
        let store = LrpStore::new(
            records.clone(),
            hub.clone(),
            auctioneer.clone(),
            cells.clone(),
        )
        .with_clock(clock.clone());
        TestStore { store, records, auctioneer, cells, clock, hub }
    }

    fn test_key() -> ActualLrpKey {
        ActualLrpKey::new("some-process-guid", 1, "tests")
    }

    fn test_instance_key() -> ActualLrpInstanceKey {
        ActualLrpInstanceKey::new("some-instance-guid", "some-cell")
    }

    fn test_net_info() -> ActualLrpNetInfo {
        ActualLrpNetInfo::new("1.2.3.4", vec![PortMapping::new(1234, 5678)])
    }

    fn test_desired() -> DesiredLrp {
        DesiredLrp::new("some-process-guid", "tests", 2)
    }

    fn lrp_in_state(ts: &TestStore, state: ActualLrpState) -> ActualLrp {
        let mut lrp = ActualLrp::unclaimed(test_key(), ts.clock.now_ns());
        lrp.state = state;
        match state {
            ActualLrpState::Unclaimed => {}
            ActualLrpState::Crashed => lrp.crash_reason = "crashed".to_string(),
            ActualLrpState::Claimed => lrp.instance_key = test_instance_key(),
            ActualLrpState::Running => {
                lrp.instance_key = test_instance_key();
                lrp.net_info = test_net_info();
            }
        }
        lrp
    }

    fn instance_path() -> String {
        paths::actual_lrp_instance_path("some-process-guid", 1)
    }

    fn seed_instance(ts: &TestStore, lrp: &ActualLrp) {
        ts.records
            .create(&instance_path(), &serde_json::to_vec(lrp).unwrap())
            .unwrap();
    }

    fn seed_desired(ts: &TestStore) {
        ts.records
            .create(
                &paths::desired_lrp_path("some-process-guid"),
                &serde_json::to_vec(&test_desired()).unwrap(),
            )
            .unwrap();
    }

    fn stored_instance(ts: &TestStore) -> ActualLrp {
        serde_json::from_slice(&ts.records.get(&instance_path()).unwrap().bytes).unwrap()
    }

    fn raw_instance(ts: &TestStore) -> Vec<u8> {
        ts.records.get(&instance_path()).unwrap().bytes
    }

    // ── Claiming ──────────────────────────────────────────────────

    #[tokio::test]
    async fn claim_moves_an_unclaimed_record_to_claimed() {
        let ts = test_store();
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Unclaimed));
        let mut sub = ts.hub.subscribe().unwrap();
        ts.clock.advance(Duration::from_nanos(600));

        let group = ts
            .store
            .claim_actual_lrp(&test_key(), &test_instance_key())
            .await
            .unwrap();

        let stored = stored_instance(&ts);
        assert_eq!(stored.state, ActualLrpState::Claimed);
        assert_eq!(stored.instance_key, test_instance_key());
        assert!(stored.net_info.is_empty());
        assert_eq!(stored.since, START_NS + 600);
        assert_eq!(stored.modification_tag.index, 1);
        assert_eq!(group.instance.as_ref(), Some(&stored));

        let Event::ActualLrpChanged(payload) = sub.next().await.unwrap() else {
            panic!("expected a changed event");
        };
        assert_eq!(payload.before.instance.as_ref().unwrap().state, ActualLrpState::Unclaimed);
        assert_eq!(payload.after.instance.as_ref(), Some(&stored));
    }

    #[tokio::test]
    async fn claim_again_by_the_same_instance_is_a_no_op() {
        let ts = test_store();
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Unclaimed));
        ts.store
            .claim_actual_lrp(&test_key(), &test_instance_key())
            .await
            .unwrap();
        let tag_after_first = stored_instance(&ts).modification_tag.clone();

        let mut sub = ts.hub.subscribe().unwrap();
        let group = ts
            .store
            .claim_actual_lrp(&test_key(), &test_instance_key())
            .await
            .unwrap();

        assert_eq!(group.instance.unwrap().modification_tag, tag_after_first);
        assert_eq!(stored_instance(&ts).modification_tag, tag_after_first);

        // The next event on the hub is the removal, proving the repeat
        // claim published nothing.
        ts.store.remove_actual_lrp(&test_key(), None).await.unwrap();
        assert!(matches!(sub.next().await.unwrap(), Event::ActualLrpRemoved(_)));
    }

    #[tokio::test]
    async fn claim_refuses_a_record_placed_by_another_instance() {
        let ts = test_store();
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Claimed));
        let before = raw_instance(&ts);

        let other = ActualLrpInstanceKey::new("other-instance-guid", "other-cell");
        let err = ts.store.claim_actual_lrp(&test_key(), &other).await.unwrap_err();

        assert_eq!(err, Error::ActualLrpCannotBeClaimed);
        assert_eq!(raw_instance(&ts), before);
    }

    #[tokio::test]
    async fn claim_demotes_a_running_record_of_the_same_instance() {
        let ts = test_store();
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Running));
        let mut sub = ts.hub.subscribe().unwrap();

        ts.store
            .claim_actual_lrp(&test_key(), &test_instance_key())
            .await
            .unwrap();

        let stored = stored_instance(&ts);
        assert_eq!(stored.state, ActualLrpState::Claimed);
        assert!(stored.net_info.is_empty());
        assert_eq!(stored.modification_tag.index, 1);

        let Event::ActualLrpChanged(payload) = sub.next().await.unwrap() else {
            panic!("expected a changed event");
        };
        assert_eq!(payload.before.instance.as_ref().unwrap().state, ActualLrpState::Running);
        assert_eq!(payload.after.instance.as_ref(), Some(&stored));
    }

    #[tokio::test]
    async fn claim_clears_any_placement_error() {
        let ts = test_store();
        let mut lrp = lrp_in_state(&ts, ActualLrpState::Unclaimed);
        lrp.placement_error = "insufficient resources".to_string();
        seed_instance(&ts, &lrp);

        ts.store
            .claim_actual_lrp(&test_key(), &test_instance_key())
            .await
            .unwrap();

        assert!(stored_instance(&ts).placement_error.is_empty());
    }

    #[tokio::test]
    async fn claim_can_take_a_crashed_record() {
        let ts = test_store();
        let mut lrp = lrp_in_state(&ts, ActualLrpState::Crashed);
        lrp.crash_count = 4;
        seed_instance(&ts, &lrp);

        ts.store
            .claim_actual_lrp(&test_key(), &test_instance_key())
            .await
            .unwrap();

        let stored = stored_instance(&ts);
        assert_eq!(stored.state, ActualLrpState::Claimed);
        // The streak survives until a successful start.
        assert_eq!(stored.crash_count, 4);
    }

    #[tokio::test]
    async fn operations_on_missing_records_report_not_found() {
        let ts = test_store();
        let key = test_key();
        let instance_key = test_instance_key();

        let claim = ts.store.claim_actual_lrp(&key, &instance_key).await;
        assert_eq!(claim.unwrap_err(), Error::ResourceNotFound);

        let fail = ts.store.fail_actual_lrp(&key, "no room").await;
        assert_eq!(fail.unwrap_err(), Error::ResourceNotFound);

        let remove = ts.store.remove_actual_lrp(&key, None).await;
        assert_eq!(remove.unwrap_err(), Error::ResourceNotFound);

        let request = CrashActualLrpRequest::new(key.clone(), instance_key, "crashed");
        let crash = ts.store.crash_actual_lrp(&request).await;
        assert_eq!(crash.unwrap_err(), Error::ResourceNotFound);

        let retire = ts.store.retire_actual_lrp(&key).await;
        assert_eq!(retire.unwrap_err(), Error::ResourceNotFound);
    }

    // ── Starting ──────────────────────────────────────────────────

    #[tokio::test]
    async fn start_creates_a_running_record_when_none_exists() {
        let ts = test_store();
        let mut sub = ts.hub.subscribe().unwrap();

        let group = ts
            .store
            .start_actual_lrp(&test_key(), &test_instance_key(), &test_net_info())
            .await
            .unwrap();

        let stored = stored_instance(&ts);
        assert_eq!(stored.state, ActualLrpState::Running);
        assert_eq!(stored.net_info, test_net_info());
        assert_eq!(stored.modification_tag.index, 0);
        assert_eq!(group.instance.as_ref(), Some(&stored));

        let Event::ActualLrpCreated(payload) = sub.next().await.unwrap() else {
            panic!("expected a created event");
        };
        assert_eq!(payload.actual_lrp_group.instance.as_ref(), Some(&stored));
    }

    #[tokio::test]
    async fn start_promotes_a_claimed_record_and_wipes_crash_bookkeeping() {
        let ts = test_store();
        let mut lrp = lrp_in_state(&ts, ActualLrpState::Claimed);
        lrp.crash_count = 2;
        lrp.crash_reason = "crashed".to_string();
        seed_instance(&ts, &lrp);
        let mut sub = ts.hub.subscribe().unwrap();
        ts.clock.advance(Duration::from_nanos(600));

        ts.store
            .start_actual_lrp(&test_key(), &test_instance_key(), &test_net_info())
            .await
            .unwrap();

        let stored = stored_instance(&ts);
        assert_eq!(stored.state, ActualLrpState::Running);
        assert_eq!(stored.crash_count, 0);
        assert!(stored.crash_reason.is_empty());
        assert_eq!(stored.since, START_NS + 600);
        assert_eq!(stored.modification_tag.index, 1);
        assert!(matches!(sub.next().await.unwrap(), Event::ActualLrpChanged(_)));
    }

    #[tokio::test]
    async fn start_is_a_no_op_when_nothing_changed() {
        let ts = test_store();
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Running));
        let before = raw_instance(&ts);

        let group = ts
            .store
            .start_actual_lrp(&test_key(), &test_instance_key(), &test_net_info())
            .await
            .unwrap();

        assert_eq!(raw_instance(&ts), before);
        assert_eq!(group.instance.unwrap().modification_tag.index, 0);
    }

    #[tokio::test]
    async fn start_updates_net_info_in_place() {
        let ts = test_store();
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Running));

        let moved = ActualLrpNetInfo::new("5.6.7.8", vec![PortMapping::new(1234, 5678)]);
        ts.store
            .start_actual_lrp(&test_key(), &test_instance_key(), &moved)
            .await
            .unwrap();

        let stored = stored_instance(&ts);
        assert_eq!(stored.net_info, moved);
        assert_eq!(stored.modification_tag.index, 1);
    }

    #[tokio::test]
    async fn start_refuses_another_instances_record() {
        let ts = test_store();
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Claimed));
        let before = raw_instance(&ts);

        let other = ActualLrpInstanceKey::new("other-instance-guid", "other-cell");
        let err = ts
            .store
            .start_actual_lrp(&test_key(), &other, &test_net_info())
            .await
            .unwrap_err();

        assert_eq!(err, Error::ActualLrpCannotBeStarted);
        assert_eq!(raw_instance(&ts), before);
    }

    #[tokio::test]
    async fn start_recovers_a_parked_record() {
        let ts = test_store();
        let mut lrp = lrp_in_state(&ts, ActualLrpState::Crashed);
        lrp.crash_count = 4;
        seed_instance(&ts, &lrp);

        ts.store
            .start_actual_lrp(&test_key(), &test_instance_key(), &test_net_info())
            .await
            .unwrap();

        let stored = stored_instance(&ts);
        assert_eq!(stored.state, ActualLrpState::Running);
        assert_eq!(stored.crash_count, 0);
        assert!(stored.crash_reason.is_empty());
    }

    // ── Crashing ──────────────────────────────────────────────────

    fn crash_request(message: &str) -> CrashActualLrpRequest {
        CrashActualLrpRequest::new(test_key(), test_instance_key(), message)
    }

    #[tokio::test]
    async fn crash_unclaims_and_auctions_below_the_threshold() {
        let ts = test_store();
        seed_desired(&ts);
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Running));
        let mut sub = ts.hub.subscribe().unwrap();
        ts.clock.advance(Duration::from_nanos(600));

        ts.store.crash_actual_lrp(&crash_request("out of memory")).await.unwrap();

        let stored = stored_instance(&ts);
        assert_eq!(stored.state, ActualLrpState::Unclaimed);
        assert_eq!(stored.crash_count, 1);
        assert_eq!(stored.crash_reason, "out of memory");
        assert!(stored.instance_key.is_empty());
        assert!(stored.net_info.is_empty());
        assert_eq!(stored.since, START_NS + 600);
        assert_eq!(stored.modification_tag.index, 1);

        assert_eq!(ts.auctioneer.call_count(), 1);
        let starts = ts.auctioneer.requests_for_call(0);
        assert_eq!(starts, vec![LrpStartRequest::new(test_desired(), vec![1])]);

        assert!(matches!(sub.next().await.unwrap(), Event::ActualLrpChanged(_)));
    }

    #[tokio::test]
    async fn crash_parks_the_record_past_the_threshold() {
        let ts = test_store();
        seed_desired(&ts);
        let mut lrp = lrp_in_state(&ts, ActualLrpState::Running);
        lrp.crash_count = 3;
        seed_instance(&ts, &lrp);

        ts.store.crash_actual_lrp(&crash_request("crashed")).await.unwrap();

        let stored = stored_instance(&ts);
        assert_eq!(stored.state, ActualLrpState::Crashed);
        assert_eq!(stored.crash_count, 4);
        assert_eq!(ts.auctioneer.call_count(), 0);
    }

    #[tokio::test]
    async fn crash_resets_the_streak_for_long_running_instances() {
        let ts = test_store();
        seed_desired(&ts);
        let mut lrp = lrp_in_state(&ts, ActualLrpState::Running);
        lrp.crash_count = 4;
        lrp.since = ts.clock.now_ns() - Duration::from_secs(6 * 60).as_nanos() as i64;
        seed_instance(&ts, &lrp);

        ts.store.crash_actual_lrp(&crash_request("crashed")).await.unwrap();

        let stored = stored_instance(&ts);
        assert_eq!(stored.state, ActualLrpState::Unclaimed);
        assert_eq!(stored.crash_count, 1);
        assert_eq!(ts.auctioneer.call_count(), 1);
    }

    #[tokio::test]
    async fn crash_never_resets_a_claimed_streak() {
        let ts = test_store();
        seed_desired(&ts);
        let mut lrp = lrp_in_state(&ts, ActualLrpState::Claimed);
        lrp.crash_count = 3;
        lrp.since = ts.clock.now_ns() - Duration::from_secs(6 * 60).as_nanos() as i64;
        seed_instance(&ts, &lrp);

        ts.store.crash_actual_lrp(&crash_request("crashed")).await.unwrap();

        let stored = stored_instance(&ts);
        assert_eq!(stored.state, ActualLrpState::Crashed);
        assert_eq!(stored.crash_count, 4);
        assert_eq!(ts.auctioneer.call_count(), 0);
    }

    #[tokio::test]
    async fn crash_refuses_unplaced_records() {
        for state in [ActualLrpState::Unclaimed, ActualLrpState::Crashed] {
            let ts = test_store();
            seed_desired(&ts);
            seed_instance(&ts, &lrp_in_state(&ts, state));
            let before = raw_instance(&ts);

            let err = ts.store.crash_actual_lrp(&crash_request("crashed")).await.unwrap_err();

            assert_eq!(err, Error::ActualLrpCannotBeCrashed);
            assert_eq!(raw_instance(&ts), before);
            assert_eq!(ts.auctioneer.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn crash_ignores_reports_from_other_instances() {
        let ts = test_store();
        seed_desired(&ts);
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Running));
        let before = raw_instance(&ts);

        let request = CrashActualLrpRequest::new(
            test_key(),
            ActualLrpInstanceKey::new("other-instance-guid", "other-cell"),
            "crashed",
        );
        let err = ts.store.crash_actual_lrp(&request).await.unwrap_err();

        assert_eq!(err, Error::ActualLrpCannotBeCrashed);
        assert_eq!(raw_instance(&ts), before);
    }

    #[tokio::test]
    async fn crash_reaps_the_record_when_desired_is_gone() {
        let ts = test_store();
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Running));
        let mut sub = ts.hub.subscribe().unwrap();

        ts.store.crash_actual_lrp(&crash_request("crashed")).await.unwrap();

        let missing = ts.records.get(&instance_path());
        assert!(matches!(missing, Err(RecordError::NotFound(_))));
        assert_eq!(ts.auctioneer.call_count(), 0);

        assert!(matches!(sub.next().await.unwrap(), Event::ActualLrpChanged(_)));
        let Event::ActualLrpRemoved(payload) = sub.next().await.unwrap() else {
            panic!("expected a removed event");
        };
        let reaped = payload.actual_lrp_group.instance.unwrap();
        assert_eq!(reaped.state, ActualLrpState::Unclaimed);
        assert_eq!(reaped.crash_count, 1);
    }

    #[tokio::test]
    async fn crash_surfaces_auctioneer_failures_after_committing() {
        let ts = test_store();
        seed_desired(&ts);
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Running));
        ts.auctioneer.set_error("auctioneer unreachable");

        let err = ts.store.crash_actual_lrp(&crash_request("crashed")).await.unwrap_err();

        assert!(matches!(err, Error::UnknownError(_)));
        // The crash itself committed before the side effect failed.
        assert_eq!(stored_instance(&ts).state, ActualLrpState::Unclaimed);
    }

    // ── Failing and removing ──────────────────────────────────────

    #[tokio::test]
    async fn fail_records_the_placement_error_without_touching_since() {
        let ts = test_store();
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Unclaimed));
        let mut sub = ts.hub.subscribe().unwrap();
        ts.clock.advance(Duration::from_nanos(600));

        ts.store
            .fail_actual_lrp(&test_key(), "insufficient resources")
            .await
            .unwrap();

        let stored = stored_instance(&ts);
        assert_eq!(stored.state, ActualLrpState::Unclaimed);
        assert_eq!(stored.placement_error, "insufficient resources");
        assert_eq!(stored.since, START_NS);
        assert_eq!(stored.modification_tag.index, 1);
        assert!(matches!(sub.next().await.unwrap(), Event::ActualLrpChanged(_)));
    }

    #[tokio::test]
    async fn fail_refuses_placed_and_parked_records() {
        for state in [ActualLrpState::Claimed, ActualLrpState::Running, ActualLrpState::Crashed] {
            let ts = test_store();
            seed_instance(&ts, &lrp_in_state(&ts, state));

            let err = ts.store.fail_actual_lrp(&test_key(), "no room").await.unwrap_err();
            assert_eq!(err, Error::ActualLrpCannotBeFailed);
        }
    }

    #[tokio::test]
    async fn remove_deletes_with_a_matching_instance_key() {
        let ts = test_store();
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Running));
        let mut sub = ts.hub.subscribe().unwrap();

        ts.store
            .remove_actual_lrp(&test_key(), Some(&test_instance_key()))
            .await
            .unwrap();

        assert!(matches!(ts.records.get(&instance_path()), Err(RecordError::NotFound(_))));
        let Event::ActualLrpRemoved(payload) = sub.next().await.unwrap() else {
            panic!("expected a removed event");
        };
        assert_eq!(
            payload.actual_lrp_group.instance.unwrap().instance_key,
            test_instance_key()
        );
    }

    #[tokio::test]
    async fn remove_without_an_instance_key_is_unconditional() {
        let ts = test_store();
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Claimed));

        ts.store.remove_actual_lrp(&test_key(), None).await.unwrap();

        assert!(matches!(ts.records.get(&instance_path()), Err(RecordError::NotFound(_))));
    }

    #[tokio::test]
    async fn remove_refuses_a_mismatched_instance_key() {
        let ts = test_store();
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Running));
        let before = raw_instance(&ts);

        let other = ActualLrpInstanceKey::new("other-instance-guid", "other-cell");
        let err = ts
            .store
            .remove_actual_lrp(&test_key(), Some(&other))
            .await
            .unwrap_err();

        assert_eq!(err, Error::ActualLrpCannotBeRemoved);
        assert_eq!(raw_instance(&ts), before);
    }

    // ── Retiring ──────────────────────────────────────────────────

    #[tokio::test]
    async fn retire_refuses_unplaced_records() {
        for state in [ActualLrpState::Unclaimed, ActualLrpState::Crashed] {
            let ts = test_store();
            seed_instance(&ts, &lrp_in_state(&ts, state));

            let err = ts.store.retire_actual_lrp(&test_key()).await.unwrap_err();
            assert_eq!(err, Error::ActualLrpCannotBeStopped);
        }
    }

    #[tokio::test]
    async fn retire_unclaims_a_running_record_and_reauctions() {
        let ts = test_store();
        seed_desired(&ts);
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Running));
        ts.cells.add_cell("some-cell");

        ts.store.retire_actual_lrp(&test_key()).await.unwrap();

        let stored = stored_instance(&ts);
        assert_eq!(stored.state, ActualLrpState::Unclaimed);
        assert!(stored.instance_key.is_empty());
        assert_eq!(ts.cells.queries(), vec!["some-cell"]);
        assert_eq!(ts.auctioneer.call_count(), 1);
    }

    #[tokio::test]
    async fn retire_proceeds_when_the_cell_is_gone() {
        let ts = test_store();
        seed_desired(&ts);
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Claimed));

        ts.store.retire_actual_lrp(&test_key()).await.unwrap();

        assert_eq!(stored_instance(&ts).state, ActualLrpState::Unclaimed);
        assert_eq!(ts.cells.queries(), vec!["some-cell"]);
        assert_eq!(ts.auctioneer.call_count(), 1);
    }

    #[tokio::test]
    async fn retire_aborts_when_the_presence_lookup_fails() {
        let ts = test_store();
        seed_desired(&ts);
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Running));
        ts.cells.set_error("registry unreachable");
        let before = raw_instance(&ts);

        let err = ts.store.retire_actual_lrp(&test_key()).await.unwrap_err();

        assert!(matches!(err, Error::UnknownError(_)));
        assert_eq!(raw_instance(&ts), before);
        assert_eq!(ts.auctioneer.call_count(), 0);
    }

    // ── Creating and evacuating ───────────────────────────────────

    #[tokio::test]
    async fn create_unclaimed_records_and_requests_an_auction() {
        let ts = test_store();
        seed_desired(&ts);
        let mut sub = ts.hub.subscribe().unwrap();

        let group = ts.store.create_unclaimed_actual_lrp(&test_key()).await.unwrap();

        let stored = stored_instance(&ts);
        assert_eq!(stored.state, ActualLrpState::Unclaimed);
        assert_eq!(stored.modification_tag.index, 0);
        assert_eq!(group.instance.as_ref(), Some(&stored));

        assert!(matches!(sub.next().await.unwrap(), Event::ActualLrpCreated(_)));
        assert_eq!(ts.auctioneer.call_count(), 1);
        assert_eq!(
            ts.auctioneer.requests_for_call(0),
            vec![LrpStartRequest::new(test_desired(), vec![1])]
        );
    }

    #[tokio::test]
    async fn create_unclaimed_requires_the_desired_lrp() {
        let ts = test_store();

        let err = ts.store.create_unclaimed_actual_lrp(&test_key()).await.unwrap_err();

        assert_eq!(err, Error::ResourceNotFound);
        assert!(matches!(ts.records.get(&instance_path()), Err(RecordError::NotFound(_))));
        assert_eq!(ts.auctioneer.call_count(), 0);
    }

    #[tokio::test]
    async fn create_unclaimed_refuses_a_duplicate_record() {
        let ts = test_store();
        seed_desired(&ts);
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Unclaimed));

        let err = ts.store.create_unclaimed_actual_lrp(&test_key()).await.unwrap_err();

        assert!(matches!(err, Error::ResourceConflict(_)));
        assert_eq!(ts.auctioneer.call_count(), 0);
    }

    #[tokio::test]
    async fn evacuating_records_live_beside_the_instance_record() {
        let ts = test_store();
        seed_instance(&ts, &lrp_in_state(&ts, ActualLrpState::Running));
        let mut sub = ts.hub.subscribe().unwrap();

        let evac_key = ActualLrpInstanceKey::new("evac-instance-guid", "evac-cell");
        let group = ts
            .store
            .create_evacuating_actual_lrp(&test_key(), &evac_key, &test_net_info())
            .await
            .unwrap();

        assert!(group.instance.is_none());
        assert_eq!(group.evacuating.as_ref().unwrap().instance_key, evac_key);
        let evac_path = paths::actual_lrp_evacuating_path("some-process-guid", 1);
        assert!(ts.records.get(&evac_path).is_ok());
        assert!(ts.records.get(&instance_path()).is_ok());

        let Event::ActualLrpCreated(payload) = sub.next().await.unwrap() else {
            panic!("expected a created event");
        };
        assert!(payload.actual_lrp_group.evacuating.is_some());
    }

    #[tokio::test]
    async fn remove_evacuating_requires_the_matching_instance_key() {
        let ts = test_store();
        let evac_key = ActualLrpInstanceKey::new("evac-instance-guid", "evac-cell");
        ts.store
            .create_evacuating_actual_lrp(&test_key(), &evac_key, &test_net_info())
            .await
            .unwrap();
        let mut sub = ts.hub.subscribe().unwrap();

        let err = ts
            .store
            .remove_evacuating_actual_lrp(&test_key(), &test_instance_key())
            .await
            .unwrap_err();
        assert_eq!(err, Error::ActualLrpCannotBeRemoved);

        ts.store
            .remove_evacuating_actual_lrp(&test_key(), &evac_key)
            .await
            .unwrap();
        let evac_path = paths::actual_lrp_evacuating_path("some-process-guid", 1);
        assert!(matches!(ts.records.get(&evac_path), Err(RecordError::NotFound(_))));

        let Event::ActualLrpRemoved(payload) = sub.next().await.unwrap() else {
            panic!("expected a removed event");
        };
        assert_eq!(payload.actual_lrp_group.evacuating.unwrap().instance_key, evac_key);
    }

    #[tokio::test]
    async fn remove_evacuating_reports_missing_records_as_not_found() {
        let ts = test_store();
        let err = ts
            .store
            .remove_evacuating_actual_lrp(&test_key(), &test_instance_key())
            .await
            .unwrap_err();
        assert_eq!(err, Error::ResourceNotFound);
    }

    // ── Contention ────────────────────────────────────────────────

    /// Wraps the real store and fails the first `conflicts` conditional
    /// writes, as if another writer kept winning the race.
    struct ContendedStore {
        inner: RedbRecordStore,
        conflicts: AtomicUsize,
        reads: AtomicUsize,
    }

    impl ContendedStore {
        fn new(conflicts: usize) -> Self {
            Self {
                inner: RedbRecordStore::open_in_memory().unwrap(),
                conflicts: AtomicUsize::new(conflicts),
                reads: AtomicUsize::new(0),
            }
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        fn steal_conflict(&self, key: &str, expected: u64) -> Option<RecordError> {
            self.conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .ok()
                .map(|_| RecordError::VersionConflict {
                    key: key.to_string(),
                    expected,
                    actual: expected + 1,
                })
        }
    }

    impl RecordStore for ContendedStore {
        fn get(&self, key: &str) -> RecordResult<VersionedRecord> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key)
        }

        fn create(&self, key: &str, bytes: &[u8]) -> RecordResult<u64> {
            self.inner.create(key, bytes)
        }

        fn compare_and_swap(
            &self,
            key: &str,
            expected_version: u64,
            bytes: &[u8],
        ) -> RecordResult<u64> {
            if let Some(err) = self.steal_conflict(key, expected_version) {
                return Err(err);
            }
            self.inner.compare_and_swap(key, expected_version, bytes)
        }

        fn compare_and_delete(&self, key: &str, expected_version: u64) -> RecordResult<()> {
            if let Some(err) = self.steal_conflict(key, expected_version) {
                return Err(err);
            }
            self.inner.compare_and_delete(key, expected_version)
        }

        fn delete(&self, key: &str) -> RecordResult<()> {
            self.inner.delete(key)
        }

        fn list(&self, prefix: &str) -> RecordResult<Vec<(String, VersionedRecord)>> {
            self.inner.list(prefix)
        }
    }

    fn contended_store(conflicts: usize) -> (LrpStore, Arc<ContendedStore>) {
        let records = Arc::new(ContendedStore::new(conflicts));
        let store = LrpStore::new(
            records.clone(),
            Hub::new(),
            Arc::new(FakeAuctioneerClient::new()),
            Arc::new(FakeCellPresenceClient::new()),
        )
        .with_clock(Arc::new(FakeClock::new(START_NS)));
        (store, records)
    }

    #[tokio::test]
    async fn a_lost_race_re_reads_before_retrying() {
        let (store, records) = contended_store(1);
        let lrp = ActualLrp::unclaimed(test_key(), START_NS);
        records.create(&instance_path(), &serde_json::to_vec(&lrp).unwrap()).unwrap();

        store.claim_actual_lrp(&test_key(), &test_instance_key()).await.unwrap();

        assert_eq!(records.reads(), 2);
        let stored: ActualLrp =
            serde_json::from_slice(&records.get(&instance_path()).unwrap().bytes).unwrap();
        assert_eq!(stored.state, ActualLrpState::Claimed);
        assert_eq!(stored.modification_tag.index, 1);
    }

    #[tokio::test]
    async fn persistent_contention_exhausts_the_retry_budget() {
        let (store, records) = contended_store(usize::MAX);
        let lrp = ActualLrp::unclaimed(test_key(), START_NS);
        records.create(&instance_path(), &serde_json::to_vec(&lrp).unwrap()).unwrap();

        let err = store
            .claim_actual_lrp(&test_key(), &test_instance_key())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ResourceConflict(_)));
        assert_eq!(records.reads(), CAS_RETRY_ATTEMPTS);
    }
}
