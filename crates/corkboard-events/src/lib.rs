//! corkboard-events — fan-out of record-change events.
//!
//! The `Hub` broadcasts committed record changes to in-process subscribers,
//! each behind its own bounded FIFO queue: publishing never blocks, and a
//! subscriber that stops draining is evicted rather than stalling the rest.
//! `EventSource` is the consumer-side adapter that turns a stream of wire
//! frames (event name + JSON payload) back into typed events, sharing one
//! frame codec with producers.

pub mod error;
pub mod hub;
pub mod source;

pub use error::{HubError, SourceError};
pub use hub::{Hub, Subscription, DEFAULT_BUFFER_CAPACITY};
pub use source::{decode_event, encode_event, EventFrame, EventSource, FrameSource};
