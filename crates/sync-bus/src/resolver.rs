//! # Subscription Resolver
//!
//! Pattern matching plus the hybrid initialization policy applied once at
//! subscribe time, before the subscription is registered for future
//! delivery:
//!
//! 1. A named state provider is tried first; a usable value is delivered
//!    once and the replay step is skipped entirely.
//! 2. Otherwise, with `use_replay` set, matching buffered history is
//!    delivered oldest first.
//! 3. Otherwise, nothing: the subscriber waits for the next live event.
//!
//! Snapshots are fresher than buffered history, but buffered history is
//! better than nothing when no snapshot exists.

use crate::clock::TimeSource;
use crate::diagnostics::{DiagnosticsSink, Fault};
use crate::event::{Delivery, SubscriptionId};
use crate::replay::ReplayBuffer;
use crate::snapshot::SnapshotRegistry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Marker ending a prefix pattern.
pub const WILDCARD: char = '*';

/// A subscription pattern: an exact event name, or a prefix ending in
/// [`WILDCARD`].
///
/// Only a trailing wildcard is recognized; `*` anywhere else is a literal
/// character of an exact name. No mid-string or multi-segment wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pattern {
    /// Matches only the identical event name.
    Exact(String),
    /// Matches any event name sharing this prefix.
    Prefix(String),
}

impl Pattern {
    /// Parses a pattern string.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix(WILDCARD) {
            Some(prefix) => Self::Prefix(prefix.to_owned()),
            None => Self::Exact(pattern.to_owned()),
        }
    }

    /// Whether this pattern matches an event name.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(exact) => name == exact,
            Self::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }
}

impl From<&str> for Pattern {
    fn from(pattern: &str) -> Self {
        Self::parse(pattern)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(exact) => f.write_str(exact),
            Self::Prefix(prefix) => write!(f, "{prefix}{WILDCARD}"),
        }
    }
}

/// Initialization policy for one `subscribe` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Owner id whose state provider seeds the subscription, if any.
    pub state_provider: Option<String>,

    /// Whether to fall back to buffered history.
    pub use_replay: bool,

    /// Module owning this subscription, for bulk teardown.
    pub owner: Option<String>,
}

impl SubscribeOptions {
    /// Future events only: no initialization delivery.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catch up from the replay buffer.
    #[must_use]
    pub fn replay() -> Self {
        Self {
            use_replay: true,
            ..Self::default()
        }
    }

    /// Seed from `owner`'s state provider, falling back to replay.
    #[must_use]
    pub fn snapshot(owner: impl Into<String>) -> Self {
        Self {
            state_provider: Some(owner.into()),
            use_replay: true,
            owner: None,
        }
    }

    /// Seed from `owner`'s state provider with no replay fallback.
    #[must_use]
    pub fn snapshot_only(owner: impl Into<String>) -> Self {
        Self {
            state_provider: Some(owner.into()),
            use_replay: false,
            owner: None,
        }
    }

    /// Tags the subscription as owned by a module, so
    /// `teardown_module` removes it.
    #[must_use]
    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// Borrowed view of the bus internals the resolver needs.
pub(crate) struct InitContext<'a> {
    pub snapshots: &'a SnapshotRegistry,
    pub replay: &'a Mutex<ReplayBuffer>,
    pub clock: &'a dyn TimeSource,
    pub sink: &'a dyn DiagnosticsSink,
}

/// Runs the hybrid initialization for a new subscription.
///
/// Callback faults are contained per delivery: a failing replay delivery
/// is reported and the remaining entries still flow. A callback fault on
/// a successfully pulled snapshot does not fall through to replay; the
/// snapshot was the chosen source of truth.
pub(crate) fn run_initialization(
    ctx: &InitContext<'_>,
    subscription: SubscriptionId,
    pattern: &Pattern,
    opts: &SubscribeOptions,
    callback: &(dyn Fn(Delivery) -> anyhow::Result<()> + Send + Sync),
) {
    if let Some(owner) = opts.state_provider.as_deref() {
        match ctx.snapshots.fetch(owner) {
            Ok(value) => {
                let delivery = Delivery::snapshot(owner, value, ctx.clock.now());
                debug!(
                    subscription = %subscription,
                    owner = %owner,
                    "Subscription seeded from state snapshot"
                );
                if let Err(error) = callback(delivery) {
                    ctx.sink.report(Fault::Subscriber {
                        subscription,
                        event: owner.to_owned(),
                        error: error.to_string(),
                    });
                }
                return;
            }
            Err(reason) => {
                ctx.sink.report(Fault::Provider {
                    owner: owner.to_owned(),
                    reason,
                });
                // Fall through to the replay path.
            }
        }
    }

    if opts.use_replay {
        let entries = {
            let mut replay = ctx.replay.lock();
            replay.query(pattern, ctx.clock.now())
        };
        debug!(
            subscription = %subscription,
            pattern = %pattern,
            replayed = entries.len(),
            "Subscription caught up from replay buffer"
        );
        for entry in &entries {
            if let Err(error) = callback(Delivery::replayed(entry)) {
                ctx.sink.report(Fault::Subscriber {
                    subscription,
                    event: entry.event.name.clone(),
                    error: error.to_string(),
                });
            }
        }
    }
}
