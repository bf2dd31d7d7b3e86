//! Bus configuration.

use crate::error::ConfigError;
use crate::event::Timestamp;
use crate::{DEFAULT_REPLAY_CAPACITY, DEFAULT_REPLAY_TTL_MS};
use serde::{Deserialize, Serialize};

/// Replay-buffer sizing for one bus instance.
///
/// Reconfiguration affects the replay buffer only and is never
/// retroactive: entries already evicted stay evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Maximum buffered entries before head eviction.
    pub replay_capacity: usize,

    /// Age in milliseconds past which an entry is expired.
    pub replay_ttl_ms: Timestamp,
}

impl BusConfig {
    /// Creates a configuration with explicit limits.
    #[must_use]
    pub fn new(replay_capacity: usize, replay_ttl_ms: Timestamp) -> Self {
        Self {
            replay_capacity,
            replay_ttl_ms,
        }
    }

    /// Rejects non-positive limits.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidCapacity`] when `replay_capacity` is zero
    /// - [`ConfigError::InvalidTtl`] when `replay_ttl_ms` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replay_capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        if self.replay_ttl_ms == 0 {
            return Err(ConfigError::InvalidTtl);
        }
        Ok(())
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
            replay_ttl_ms: DEFAULT_REPLAY_TTL_MS,
        }
    }
}
