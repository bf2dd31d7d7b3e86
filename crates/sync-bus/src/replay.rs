//! # Replay Buffer
//!
//! Bounded, time-decaying ordered history of published events, letting a
//! module that attaches late catch up on what it missed.
//!
//! ## Eviction
//!
//! - Capacity: appending past `capacity` evicts from the head, oldest
//!   first, until at or below capacity.
//! - TTL: on every `append` and every `query`, entries whose age exceeds
//!   `ttl_ms` are trimmed from the head. Entries are time-ordered, so
//!   expiry is always a prefix trim.
//!
//! The buffer holds no clock of its own; the bus passes the current
//! instant in, which keeps expiry deterministic under test.

use crate::event::{Event, ReplayEntry, Timestamp};
use crate::resolver::Pattern;
use std::collections::VecDeque;

/// Ordered history bounded by entry count and age.
///
/// All operations are synchronous and bounded by the configured capacity.
#[derive(Debug)]
pub struct ReplayBuffer {
    /// Live entries, oldest at the front.
    entries: VecDeque<ReplayEntry>,

    /// Next sequence number to assign.
    next_seq: u64,

    /// Maximum live entries.
    capacity: usize,

    /// Maximum entry age in milliseconds.
    ttl_ms: Timestamp,
}

impl ReplayBuffer {
    /// Creates an empty buffer with the given limits.
    #[must_use]
    pub fn new(capacity: usize, ttl_ms: Timestamp) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            next_seq: 0,
            capacity,
            ttl_ms,
        }
    }

    /// Appends an event at the tail and returns its sequence number.
    ///
    /// Expired entries are trimmed first, then the oldest entries are
    /// evicted until the buffer is back at or below capacity.
    pub fn append(&mut self, event: Event, now: Timestamp) -> u64 {
        self.evict_expired(now);

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(ReplayEntry { seq, event });

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }

        seq
    }

    /// Returns copies of the still-live entries matching `pattern`,
    /// oldest first, as of `now`.
    ///
    /// A filtered view of the moment, not a subscription.
    pub fn query(&mut self, pattern: &Pattern, now: Timestamp) -> Vec<ReplayEntry> {
        self.evict_expired(now);

        self.entries
            .iter()
            .filter(|entry| pattern.matches(&entry.event.name))
            .cloned()
            .collect()
    }

    /// Applies new limits.
    ///
    /// A capacity shrink evicts oldest entries immediately so the size
    /// bound holds at all times. Already-evicted entries never come back.
    pub fn set_limits(&mut self, capacity: usize, ttl_ms: Timestamp) {
        self.capacity = capacity;
        self.ttl_ms = ttl_ms;

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Number of live entries (expiry not yet applied).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Configured TTL in milliseconds.
    #[must_use]
    pub fn ttl_ms(&self) -> Timestamp {
        self.ttl_ms
    }

    /// Trims the expired prefix.
    fn evict_expired(&mut self, now: Timestamp) {
        while let Some(front) = self.entries.front() {
            if now.saturating_sub(front.event.timestamp) > self.ttl_ms {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }
}
