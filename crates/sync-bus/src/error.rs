//! Typed errors for the synchronization bus.
//!
//! Only configuration faults surface synchronously to a caller. Every
//! fault inside the publish/initialization path is contained locally and
//! routed to the [`DiagnosticsSink`](crate::diagnostics::DiagnosticsSink).

use thiserror::Error;

/// Rejected `configure` input. Prior configuration remains in effect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Replay capacity must be a positive entry count.
    #[error("replay capacity must be positive")]
    InvalidCapacity,

    /// Replay TTL must be a positive duration.
    #[error("replay ttl must be positive")]
    InvalidTtl,
}

/// Why a state snapshot could not be produced.
///
/// Never raised to the caller of `subscribe`; the resolver reports it and
/// falls through to the replay path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotUnavailable {
    /// No provider is registered for this owner id.
    #[error("no state provider registered for `{0}`")]
    Missing(String),

    /// A pull for this owner is already on the call stack; the nested
    /// call is refused instead of recursing.
    #[error("state provider for `{0}` is already mid-pull (reentrant fetch)")]
    Reentrant(String),

    /// The provider's pull function returned an error.
    #[error("state provider for `{owner}` failed: {reason}")]
    Failed {
        /// Owner id of the failing provider.
        owner: String,
        /// Stringified provider error.
        reason: String,
    },
}

impl SnapshotUnavailable {
    /// Owner id the failure refers to.
    #[must_use]
    pub fn owner(&self) -> &str {
        match self {
            Self::Missing(owner) | Self::Reentrant(owner) => owner,
            Self::Failed { owner, .. } => owner,
        }
    }
}
