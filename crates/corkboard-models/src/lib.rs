//! corkboard-models — domain model for the Corkboard consistency core.
//!
//! ActualLRP records and their component keys, modification tags for
//! optimistic concurrency, the typed events broadcast on record changes,
//! and the shared error taxonomy. All persisted types are JSON-serializable
//! with the wire field names consumers already depend on (snake_case fields,
//! flattened key structs, SCREAMING_SNAKE_CASE states).

pub mod actual_lrp;
pub mod desired_lrp;
pub mod error;
pub mod events;
pub mod requests;
pub mod tag;

pub use actual_lrp::{
    ActualLrp, ActualLrpGroup, ActualLrpInstanceKey, ActualLrpKey, ActualLrpNetInfo,
    ActualLrpState, PortMapping,
};
pub use desired_lrp::DesiredLrp;
pub use error::{Error, Result};
pub use events::{
    ActualLrpCreatedEvent, ActualLrpChangedEvent, ActualLrpRemovedEvent, Event,
    EVENT_TYPE_ACTUAL_LRP_CHANGED, EVENT_TYPE_ACTUAL_LRP_CREATED, EVENT_TYPE_ACTUAL_LRP_REMOVED,
};
pub use requests::{ActualLrpFilter, CrashActualLrpRequest, DesiredLrpFilter, LrpStartRequest};
pub use tag::ModificationTag;
