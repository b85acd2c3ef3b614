//! EventSource — decoding record-change events from wire frames.
//!
//! A frame is the transport-agnostic unit: the event's wire name plus its
//! JSON payload. Producers build frames with `encode_event`; `EventSource`
//! wraps any `FrameSource` (an SSE body, a message queue, a replay log) and
//! yields typed events, staying open across frames it cannot decode.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use corkboard_models::{
    ActualLrpChangedEvent, ActualLrpCreatedEvent, ActualLrpRemovedEvent, Event,
    EVENT_TYPE_ACTUAL_LRP_CHANGED, EVENT_TYPE_ACTUAL_LRP_CREATED, EVENT_TYPE_ACTUAL_LRP_REMOVED,
};

use crate::error::SourceError;

/// One event on the wire: its stable name and JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventFrame {
    pub name: String,
    pub data: Vec<u8>,
}

/// Encode an event into the frame producers put on the wire.
pub fn encode_event(event: &Event) -> Result<EventFrame, SourceError> {
    let data = match event {
        Event::ActualLrpCreated(payload) => serde_json::to_vec(payload),
        Event::ActualLrpChanged(payload) => serde_json::to_vec(payload),
        Event::ActualLrpRemoved(payload) => serde_json::to_vec(payload),
    }
    .map_err(|e| SourceError::Serialize(e.to_string()))?;
    Ok(EventFrame { name: event.event_type().to_string(), data })
}

/// Decode a frame back into a typed event.
///
/// Fails with `UnrecognizedEventType` for names this core does not know and
/// `Deserialize` for payloads that do not parse; neither is terminal for
/// the source that read the frame.
pub fn decode_event(frame: &EventFrame) -> Result<Event, SourceError> {
    let deserialize_err = |e: serde_json::Error| SourceError::Deserialize(e.to_string());
    match frame.name.as_str() {
        EVENT_TYPE_ACTUAL_LRP_CREATED => {
            let payload: ActualLrpCreatedEvent =
                serde_json::from_slice(&frame.data).map_err(deserialize_err)?;
            Ok(Event::ActualLrpCreated(payload))
        }
        EVENT_TYPE_ACTUAL_LRP_CHANGED => {
            let payload: ActualLrpChangedEvent =
                serde_json::from_slice(&frame.data).map_err(deserialize_err)?;
            Ok(Event::ActualLrpChanged(payload))
        }
        EVENT_TYPE_ACTUAL_LRP_REMOVED => {
            let payload: ActualLrpRemovedEvent =
                serde_json::from_slice(&frame.data).map_err(deserialize_err)?;
            Ok(Event::ActualLrpRemoved(payload))
        }
        other => Err(SourceError::UnrecognizedEventType(other.to_string())),
    }
}

/// A stream of wire frames from some transport.
#[async_trait]
pub trait FrameSource: Send {
    /// The next frame, or `None` once the underlying stream has ended.
    async fn next_frame(&mut self) -> Option<EventFrame>;
}

/// Consumer-side adapter from frames to typed events.
pub struct EventSource<S> {
    frames: S,
    closed: bool,
    ended: bool,
}

impl<S: FrameSource> EventSource<S> {
    pub fn new(frames: S) -> Self {
        Self { frames, closed: false, ended: false }
    }

    /// Await and decode the next event.
    ///
    /// Decode failures leave the source open; the end of the underlying
    /// stream is terminal and sticky.
    pub async fn next(&mut self) -> Result<Event, SourceError> {
        if self.closed {
            return Err(SourceError::ReadFromClosedSource);
        }
        if self.ended {
            return Err(SourceError::EndOfSource);
        }
        match self.frames.next_frame().await {
            Some(frame) => {
                debug!(name = %frame.name, "decoding event frame");
                decode_event(&frame)
            }
            None => {
                self.ended = true;
                Err(SourceError::EndOfSource)
            }
        }
    }

    /// Stop reading. Later `next` calls fail with `ReadFromClosedSource`;
    /// a second `close` fails with `SourceAlreadyClosed`.
    pub fn close(&mut self) -> Result<(), SourceError> {
        if self.closed {
            return Err(SourceError::SourceAlreadyClosed);
        }
        self.closed = true;
        Ok(())
    }
}
