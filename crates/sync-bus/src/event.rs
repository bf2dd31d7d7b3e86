//! # Event Data Model
//!
//! Defines the facts that flow through the synchronization bus.
//!
//! Event names follow the `<owner>:<category>:<action>` convention chosen
//! by the publishing module, e.g. `graphicalContainer:metrics:updated`.
//! Payloads are `serde_json::Value`: the structurally-copyable currency
//! between modules that never reference each other directly. Cloning a
//! `Value` is a deep copy, so every delivery hands the receiver its own
//! object graph.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Milliseconds since the Unix epoch, as produced by a
/// [`TimeSource`](crate::clock::TimeSource).
pub type Timestamp = u64;

/// A named, immutable fact broadcast once by its publishing module.
///
/// Events are immutable after creation: the bus owns the payload from the
/// moment `publish` is called, and every subscriber receives its own deep
/// copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Identifier chosen by the publisher, conventionally
    /// `<owner>:<category>:<action>`.
    pub name: String,

    /// Opaque payload, owned exclusively by the event.
    pub payload: Value,

    /// Publish instant, stamped by the bus.
    pub timestamp: Timestamp,
}

impl Event {
    /// Creates an event stamped with the given publish instant.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Value, timestamp: Timestamp) -> Self {
        Self {
            name: name.into(),
            payload,
            timestamp,
        }
    }

    /// Returns the `<owner>` segment of the event name, if the name
    /// follows the segmented convention.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.name.split_once(':').map(|(owner, _)| owner)
    }
}

/// An [`Event`] plus its per-bus sequence number.
///
/// `seq` increases monotonically per bus instance and is the ordering
/// tie-breaker for entries whose timestamps collide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEntry {
    /// Monotonic sequence number assigned at append time.
    pub seq: u64,

    /// The buffered event.
    pub event: Event,
}

/// Where a delivered payload came from.
///
/// An explicit provenance marker instead of the duck-typed "guess where
/// this value originated" probing the bus replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryKind {
    /// Dispatched from a `publish` call while the subscription was live.
    Live,
    /// Caught up from the replay buffer at subscribe time.
    Replayed,
    /// Pulled from a module's state provider at subscribe time.
    Snapshot,
}

/// What a subscriber callback receives.
///
/// For `Live` and `Replayed` deliveries, `name` and `timestamp` are the
/// event's. For a `Snapshot` delivery, `name` is the provider's owner id
/// and `timestamp` is the fetch instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    /// Event name, or provider owner id for snapshots.
    pub name: String,

    /// A deep copy owned by the receiving callback.
    pub payload: Value,

    /// Publish instant, or fetch instant for snapshots.
    pub timestamp: Timestamp,

    /// Provenance of this delivery.
    pub kind: DeliveryKind,
}

impl Delivery {
    /// Builds a live delivery: a fresh copy of the event for one subscriber.
    pub(crate) fn live(event: &Event) -> Self {
        Self {
            name: event.name.clone(),
            payload: event.payload.clone(),
            timestamp: event.timestamp,
            kind: DeliveryKind::Live,
        }
    }

    /// Builds a catch-up delivery from a buffered entry.
    pub(crate) fn replayed(entry: &ReplayEntry) -> Self {
        Self {
            name: entry.event.name.clone(),
            payload: entry.event.payload.clone(),
            timestamp: entry.event.timestamp,
            kind: DeliveryKind::Replayed,
        }
    }

    /// Builds a snapshot delivery from a provider's pulled value.
    pub(crate) fn snapshot(owner: &str, value: Value, now: Timestamp) -> Self {
        Self {
            name: owner.to_owned(),
            payload: value,
            timestamp: now,
            kind: DeliveryKind::Snapshot,
        }
    }
}

/// Opaque identifier for one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
