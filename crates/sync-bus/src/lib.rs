//! # Sync Bus - Cross-Module Event Synchronization Core
//!
//! Publish/subscribe coordinator for a shell composed of independently
//! deployed, asynchronously loaded modules that must exchange live state
//! without direct references to each other.
//!
//! ## The late-join problem
//!
//! Modules load in non-deterministic relative order. A module that
//! attaches *after* others have already published state must still
//! observe that state correctly, exactly once per relevant fact, without
//! unbounded memory growth or stale-data leakage.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │   Module A   │                    │   Module B   │
//! │  (loaded 1st)│    publish()       │ (loaded late)│
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │ subscribe()
//!                  │   Sync Bus   │ ─────────┘
//!                  │              │   snapshot → replay → wait
//!                  └──────────────┘
//! ```
//!
//! ## Hybrid initialization
//!
//! At subscribe time, exactly one source seeds the new subscription:
//!
//! 1. **Snapshot** - the named module's pull-based state provider
//! 2. **Replay** - matching entries from the bounded, TTL-bound history
//! 3. **Nothing** - wait for the next live event
//!
//! Sources are exclusive-first, never additive: a pulled snapshot and a
//! replayed event for the same fact are never both delivered to the same
//! initializing subscription.
//!
//! ## Isolation
//!
//! Payloads are deep-copied per delivery, faulting callbacks are
//! contained per subscriber, and a middleware veto stops a publish
//! silently. Only configuration faults surface to a caller.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod middleware;
pub mod replay;
pub mod resolver;
pub mod snapshot;

// Re-export main types
pub use bus::{Callback, EventPublisher, EventSubscriber, SubscriptionHandle, SyncBus};
pub use clock::{ManualClock, SystemTimeSource, TimeSource};
pub use config::BusConfig;
pub use diagnostics::{DiagnosticsSink, Fault, MemorySink, TracingSink};
pub use error::{ConfigError, SnapshotUnavailable};
pub use event::{Delivery, DeliveryKind, Event, ReplayEntry, SubscriptionId, Timestamp};
pub use middleware::{DebounceMiddleware, Middleware, MiddlewareDecision};
pub use replay::ReplayBuffer;
pub use resolver::{Pattern, SubscribeOptions, WILDCARD};
pub use snapshot::SnapshotRegistry;

/// Default replay-buffer capacity in entries.
pub const DEFAULT_REPLAY_CAPACITY: usize = 50;

/// Default replay TTL in milliseconds.
pub const DEFAULT_REPLAY_TTL_MS: Timestamp = 30_000;
