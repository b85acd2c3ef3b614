//! Error types for the event hub and event sources.
//!
//! Subscriptions and decoding event sources fail the same way — both are
//! "sources" to their consumer — so they share `SourceError`. Hub-level
//! lifecycle failures get their own enum and never reach subscribers.

use thiserror::Error;

/// Errors surfaced by `Hub` operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("hub already closed")]
    AlreadyClosed,

    #[error("subscribed to closed hub")]
    SubscribedToClosedHub,
}

/// Errors surfaced when reading from a subscription or event source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("slow consumer")]
    SlowConsumer,

    #[error("read from closed source")]
    ReadFromClosedSource,

    #[error("source already closed")]
    SourceAlreadyClosed,

    #[error("end of event source")]
    EndOfSource,

    #[error("unrecognized event type: {0}")]
    UnrecognizedEventType(String),

    #[error("could not serialize event payload: {0}")]
    Serialize(String),

    #[error("could not deserialize event payload: {0}")]
    Deserialize(String),
}
