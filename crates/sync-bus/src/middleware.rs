//! # Publish Middleware
//!
//! Ordered interceptors that run before an event reaches the replay
//! buffer and subscribers. A middleware may pass an event through,
//! transform it, or veto it; a veto is normal control flow and stops the
//! publish silently.
//!
//! Chain order is registration order and is immutable except by a full
//! chain reset on the bus.

use crate::clock::{SystemTimeSource, TimeSource};
use crate::diagnostics::{DiagnosticsSink, Fault};
use crate::event::{Event, Timestamp};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Outcome of one middleware step.
#[derive(Debug, Clone, PartialEq)]
pub enum MiddlewareDecision {
    /// Pass the event through unchanged.
    Proceed,
    /// Replace the event and continue the chain with the replacement.
    Replace(Event),
    /// Stop the publish: no buffering, no dispatch, no error.
    Veto,
}

/// An interceptor in the publish path.
///
/// Returning `Err` is a fault, not a veto: it is reported to the
/// diagnostics sink and the chain continues with the unmodified event.
pub trait Middleware: Send + Sync {
    /// Inspects the event and decides how the publish proceeds.
    ///
    /// # Errors
    ///
    /// Any error the interceptor hits; contained by the bus.
    fn handle(&self, event: &Event) -> anyhow::Result<MiddlewareDecision>;
}

impl<F> Middleware for F
where
    F: Fn(&Event) -> anyhow::Result<MiddlewareDecision> + Send + Sync,
{
    fn handle(&self, event: &Event) -> anyhow::Result<MiddlewareDecision> {
        self(event)
    }
}

/// Runs `event` through the chain in order.
///
/// Returns the event to buffer and dispatch, or `None` when a middleware
/// vetoed.
pub(crate) fn run_chain(
    chain: &[Arc<dyn Middleware>],
    mut event: Event,
    sink: &dyn DiagnosticsSink,
) -> Option<Event> {
    for middleware in chain {
        match middleware.handle(&event) {
            Ok(MiddlewareDecision::Proceed) => {}
            Ok(MiddlewareDecision::Replace(replacement)) => event = replacement,
            Ok(MiddlewareDecision::Veto) => {
                trace!(event = %event.name, "Publish vetoed by middleware");
                return None;
            }
            Err(error) => {
                sink.report(Fault::Middleware {
                    event: event.name.clone(),
                    error: error.to_string(),
                });
            }
        }
    }
    Some(event)
}

/// Stock coalescing middleware: vetoes an event whose name was already
/// published within the window.
///
/// The bus itself never coalesces; installing this middleware is the
/// explicit opt-in. The last-seen map is time-bounded: entries older than
/// the window are garbage-collected on a fixed interval, so memory stays
/// proportional to the set of names active within one window.
pub struct DebounceMiddleware {
    /// Veto window in milliseconds.
    window_ms: Timestamp,

    /// Garbage collection interval in milliseconds.
    gc_interval_ms: Timestamp,

    /// Clock shared with the bus under test.
    clock: Arc<dyn TimeSource>,

    /// Map of event name -> last accepted publish instant.
    state: Mutex<DebounceState>,
}

#[derive(Debug, Default)]
struct DebounceState {
    last_seen: HashMap<String, Timestamp>,
    last_gc: Timestamp,
}

impl DebounceMiddleware {
    /// Default garbage collection interval.
    pub const DEFAULT_GC_INTERVAL_MS: Timestamp = 10_000;

    /// Creates a debounce window over the system clock.
    #[must_use]
    pub fn new(window_ms: Timestamp) -> Self {
        Self::with_clock(window_ms, Arc::new(SystemTimeSource))
    }

    /// Creates a debounce window over an injected clock.
    #[must_use]
    pub fn with_clock(window_ms: Timestamp, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            window_ms,
            gc_interval_ms: Self::DEFAULT_GC_INTERVAL_MS,
            clock,
            state: Mutex::new(DebounceState::default()),
        }
    }

    /// Overrides the garbage collection interval.
    #[must_use]
    pub fn with_gc_interval(mut self, gc_interval_ms: Timestamp) -> Self {
        self.gc_interval_ms = gc_interval_ms;
        self
    }

    /// Number of names currently tracked.
    #[must_use]
    pub fn tracked_names(&self) -> usize {
        self.state.lock().last_seen.len()
    }
}

impl Middleware for DebounceMiddleware {
    fn handle(&self, event: &Event) -> anyhow::Result<MiddlewareDecision> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if now.saturating_sub(state.last_gc) > self.gc_interval_ms {
            let horizon = now.saturating_sub(self.window_ms);
            state.last_seen.retain(|_, &mut seen| seen > horizon);
            state.last_gc = now;
        }

        if let Some(&seen) = state.last_seen.get(&event.name) {
            if now.saturating_sub(seen) < self.window_ms {
                return Ok(MiddlewareDecision::Veto);
            }
        }

        state.last_seen.insert(event.name.clone(), now);
        Ok(MiddlewareDecision::Proceed)
    }
}
