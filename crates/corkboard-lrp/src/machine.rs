//! Crash restart policy.
//!
//! When a cell reports a crash, the store either returns the instance to
//! the auction pool (Unclaimed) or parks it (Crashed) based on how many
//! times it has crashed recently. The decision is pure: [`evaluate_crash`]
//! inspects the current record and the clock, [`apply_crash`] rewrites the
//! record accordingly.

use std::time::Duration;

use corkboard_models::{
    ActualLrp, ActualLrpInstanceKey, ActualLrpKey, ActualLrpNetInfo, ActualLrpState, Error,
};

/// A Running instance that stayed up longer than this before crashing is
/// treated as a fresh failure, not part of a crash loop.
pub const CRASH_RESET_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Crashes beyond this count park the record instead of re-auctioning it.
pub const DEFAULT_IMMEDIATE_RESTARTS: u32 = 3;

/// Tunable knobs for crash-loop detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Uptime after which a Running instance's crash count resets.
    pub reset_timeout: Duration,
    /// Maximum crash count that still restarts immediately.
    pub immediate_restarts: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            reset_timeout: CRASH_RESET_TIMEOUT,
            immediate_restarts: DEFAULT_IMMEDIATE_RESTARTS,
        }
    }
}

/// What a crash report does to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashOutcome {
    /// Unclaim the record and request a new auction.
    Restart { crash_count: u32 },
    /// Park the record as Crashed; no auction.
    Park { crash_count: u32 },
}

impl CrashOutcome {
    pub fn crash_count(&self) -> u32 {
        match self {
            CrashOutcome::Restart { crash_count } | CrashOutcome::Park { crash_count } => {
                *crash_count
            }
        }
    }

    /// Whether this outcome puts the instance back up for auction.
    pub fn requests_auction(&self) -> bool {
        matches!(self, CrashOutcome::Restart { .. })
    }
}

/// Decide what a crash report does to `lrp`.
///
/// The report must come from the placing instance of a Claimed or Running
/// record; anything else is refused. A Running record that stayed up for
/// the reset timeout or longer starts a new crash streak at 1. Only
/// Running records reset: a Claimed instance never reached steady state,
/// so its streak keeps growing no matter how long the claim sat.
pub fn evaluate_crash(
    lrp: &ActualLrp,
    key: &ActualLrpKey,
    instance_key: &ActualLrpInstanceKey,
    now_ns: i64,
    policy: &RestartPolicy,
) -> Result<CrashOutcome, Error> {
    if !lrp.allows_crash(key, instance_key) {
        return Err(Error::ActualLrpCannotBeCrashed);
    }

    let uptime = now_ns.saturating_sub(lrp.since);
    let outlived_reset_timeout = uptime >= policy.reset_timeout.as_nanos() as i64;

    let crash_count = if lrp.state == ActualLrpState::Running && outlived_reset_timeout {
        1
    } else {
        lrp.crash_count + 1
    };

    if crash_count > policy.immediate_restarts {
        Ok(CrashOutcome::Park { crash_count })
    } else {
        Ok(CrashOutcome::Restart { crash_count })
    }
}

/// Rewrite `lrp` per `outcome`: unplace it, record the crash, bump the tag.
pub fn apply_crash(lrp: &mut ActualLrp, outcome: CrashOutcome, crash_reason: &str, now_ns: i64) {
    lrp.state = if outcome.requests_auction() {
        ActualLrpState::Unclaimed
    } else {
        ActualLrpState::Crashed
    };
    lrp.instance_key = ActualLrpInstanceKey::default();
    lrp.net_info = ActualLrpNetInfo::default();
    lrp.crash_count = outcome.crash_count();
    lrp.crash_reason = crash_reason.to_string();
    lrp.since = now_ns;
    lrp.modification_tag.increment();
}
