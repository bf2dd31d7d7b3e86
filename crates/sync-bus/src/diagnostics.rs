//! Fault reporting for the dispatch and initialization paths.
//!
//! The bus favors "deliver to everyone who can be delivered to" over
//! failing a publish on one bad subscriber, so contained faults are
//! routed here instead of propagating. A vetoed publish is control flow,
//! not a fault, and never reaches the sink.

use crate::error::SnapshotUnavailable;
use crate::event::SubscriptionId;
use parking_lot::Mutex;
use tracing::warn;

/// A contained fault from inside the publish or initialization path.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// A subscriber callback returned an error during dispatch.
    Subscriber {
        /// The faulting subscription.
        subscription: SubscriptionId,
        /// Name of the event (or owner id of the snapshot) being delivered.
        event: String,
        /// Stringified callback error.
        error: String,
    },

    /// A state provider pull was missing, reentrant, or failed.
    Provider {
        /// Owner id of the provider.
        owner: String,
        /// The typed unavailability.
        reason: SnapshotUnavailable,
    },

    /// A middleware returned an error (as opposed to vetoing).
    Middleware {
        /// Name of the event passing through the chain.
        event: String,
        /// Stringified middleware error.
        error: String,
    },
}

/// Destination for contained faults.
///
/// Injected at bus construction; the default is [`TracingSink`].
pub trait DiagnosticsSink: Send + Sync {
    /// Records one fault.
    fn report(&self, fault: Fault);
}

/// Reports faults as structured `tracing` warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(&self, fault: Fault) {
        match fault {
            Fault::Subscriber {
                subscription,
                event,
                error,
            } => {
                warn!(
                    subscription = %subscription,
                    event = %event,
                    error = %error,
                    "Subscriber callback failed during dispatch"
                );
            }
            Fault::Provider { owner, reason } => {
                warn!(
                    owner = %owner,
                    reason = %reason,
                    "State provider unavailable"
                );
            }
            Fault::Middleware { event, error } => {
                warn!(
                    event = %event,
                    error = %error,
                    "Middleware failed; chain continued with unmodified event"
                );
            }
        }
    }
}

/// Captures faults in memory for tests and host-shell probes.
#[derive(Debug, Default)]
pub struct MemorySink {
    faults: Mutex<Vec<Fault>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far.
    #[must_use]
    pub fn faults(&self) -> Vec<Fault> {
        self.faults.lock().clone()
    }

    /// Number of recorded faults.
    #[must_use]
    pub fn len(&self) -> usize {
        self.faults.lock().len()
    }

    /// True when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faults.lock().is_empty()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<Fault> {
        std::mem::take(&mut *self.faults.lock())
    }
}

impl DiagnosticsSink for MemorySink {
    fn report(&self, fault: Fault) {
        self.faults.lock().push(fault);
    }
}
