//! Hub — in-process publish/subscribe for record-change events.
//!
//! Each subscriber owns a bounded FIFO queue. `publish` appends to every
//! live queue without ever blocking: a queue that is full marks its
//! subscriber evicted and removes it, so one stalled consumer cannot slow
//! the store or its other subscribers. Closing the hub drops every queue,
//! which wakes pending readers with the closed-source error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use corkboard_models::Event;

use crate::error::{HubError, SourceError};

/// Default per-subscriber queue capacity.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

#[derive(Debug)]
struct SubscriberSlot {
    tx: mpsc::Sender<Event>,
    evicted: Arc<AtomicBool>,
}

#[derive(Debug)]
struct HubInner {
    closed: bool,
    capacity: usize,
    next_id: u64,
    slots: HashMap<u64, SubscriberSlot>,
}

/// Shared fan-out point for record-change events.
///
/// `Clone` hands out another handle to the same hub; publishers and the
/// subscribing side may live on different tasks.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<Mutex<HubInner>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// A hub whose subscriber queues hold at most `capacity` undelivered
    /// events. Tests use small capacities to exercise eviction.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                closed: false,
                capacity,
                next_id: 0,
                slots: HashMap::new(),
            })),
        }
    }

    /// Register a new subscriber and hand back its queue.
    pub fn subscribe(&self) -> Result<Subscription, HubError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(HubError::SubscribedToClosedHub);
        }
        let (tx, rx) = mpsc::channel(inner.capacity);
        let evicted = Arc::new(AtomicBool::new(false));
        let id = inner.next_id;
        inner.next_id += 1;
        inner.slots.insert(id, SubscriberSlot { tx, evicted: evicted.clone() });
        debug!(subscriber = id, "event subscriber registered");
        Ok(Subscription { id, rx, evicted, closed: false, hub: self.inner.clone() })
    }

    /// Append `event` to every live subscriber queue, without blocking.
    ///
    /// A subscriber whose queue is full is evicted; a subscriber whose
    /// receiving half was dropped is pruned.
    pub fn publish(&self, event: Event) -> Result<(), HubError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(HubError::AlreadyClosed);
        }
        let mut dead = Vec::new();
        for (id, slot) in &inner.slots {
            match slot.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    slot.evicted.store(true, Ordering::SeqCst);
                    warn!(subscriber = id, "evicting slow event consumer");
                    dead.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = id, "pruning dropped event subscriber");
                    dead.push(*id);
                }
            }
        }
        for id in dead {
            inner.slots.remove(&id);
        }
        Ok(())
    }

    /// Close the hub: reject further subscribes and publishes, and wake
    /// every outstanding read with the closed-source error.
    pub fn close(&self) -> Result<(), HubError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(HubError::AlreadyClosed);
        }
        inner.closed = true;
        // Dropping the senders wakes pending `recv` calls with `None`.
        inner.slots.clear();
        debug!("event hub closed");
        Ok(())
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().unwrap().slots.len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's end of the hub: a bounded FIFO of events.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Event>,
    evicted: Arc<AtomicBool>,
    closed: bool,
    hub: Arc<Mutex<HubInner>>,
}

impl Subscription {
    /// Await the next event.
    ///
    /// Reports `SlowConsumer` once this subscriber has been evicted,
    /// `ReadFromClosedSource` after `close` (the subscriber's or the
    /// hub's).
    pub async fn next(&mut self) -> Result<Event, SourceError> {
        if self.closed {
            return Err(SourceError::ReadFromClosedSource);
        }
        if self.evicted.load(Ordering::SeqCst) {
            return Err(SourceError::SlowConsumer);
        }
        match self.rx.recv().await {
            Some(event) => Ok(event),
            None => {
                if self.evicted.load(Ordering::SeqCst) {
                    Err(SourceError::SlowConsumer)
                } else {
                    Err(SourceError::ReadFromClosedSource)
                }
            }
        }
    }

    /// Detach from the hub. Later `next` calls fail with
    /// `ReadFromClosedSource`; a second `close` fails with
    /// `SourceAlreadyClosed`.
    pub fn close(&mut self) -> Result<(), SourceError> {
        if self.closed {
            return Err(SourceError::SourceAlreadyClosed);
        }
        self.closed = true;
        self.rx.close();
        let mut inner = self.hub.lock().unwrap();
        inner.slots.remove(&self.id);
        Ok(())
    }
}
