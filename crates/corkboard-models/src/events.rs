//! Typed events broadcast when ActualLRP records change.
//!
//! Every event carries full groups — Changed events carry both the before
//! and after images — so consumers never need a follow-up read to interpret
//! what happened. The wire names tie each payload to its frame type for the
//! event source.

use serde::{Deserialize, Serialize};

use crate::actual_lrp::ActualLrpGroup;

pub const EVENT_TYPE_ACTUAL_LRP_CREATED: &str = "actual_lrp_created";
pub const EVENT_TYPE_ACTUAL_LRP_CHANGED: &str = "actual_lrp_changed";
pub const EVENT_TYPE_ACTUAL_LRP_REMOVED: &str = "actual_lrp_removed";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActualLrpCreatedEvent {
    pub actual_lrp_group: ActualLrpGroup,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActualLrpChangedEvent {
    pub before: ActualLrpGroup,
    pub after: ActualLrpGroup,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActualLrpRemovedEvent {
    pub actual_lrp_group: ActualLrpGroup,
}

/// A record-change notification, as published on the hub and carried in
/// wire frames.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ActualLrpCreated(ActualLrpCreatedEvent),
    ActualLrpChanged(ActualLrpChangedEvent),
    ActualLrpRemoved(ActualLrpRemovedEvent),
}

impl Event {
    pub fn created(group: ActualLrpGroup) -> Self {
        Event::ActualLrpCreated(ActualLrpCreatedEvent { actual_lrp_group: group })
    }

    pub fn changed(before: ActualLrpGroup, after: ActualLrpGroup) -> Self {
        Event::ActualLrpChanged(ActualLrpChangedEvent { before, after })
    }

    pub fn removed(group: ActualLrpGroup) -> Self {
        Event::ActualLrpRemoved(ActualLrpRemovedEvent { actual_lrp_group: group })
    }

    /// The stable wire name for this event's frame.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::ActualLrpCreated(_) => EVENT_TYPE_ACTUAL_LRP_CREATED,
            Event::ActualLrpChanged(_) => EVENT_TYPE_ACTUAL_LRP_CHANGED,
            Event::ActualLrpRemoved(_) => EVENT_TYPE_ACTUAL_LRP_REMOVED,
        }
    }
}
