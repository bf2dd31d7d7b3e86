//! # Event Bus Core
//!
//! Single point of publish and subscribe; owns the ordering and isolation
//! guarantees and composes the replay buffer, the snapshot registry, and
//! the subscription resolver.
//!
//! ## Publish path
//!
//! ```text
//! publish(name, payload)
//!     │
//!     ▼
//! [middleware chain] ── veto ──→ (silent stop)
//!     │
//!     ▼
//! [replay buffer] append
//!     │
//!     ▼
//! [subscribers matching name] invoked in registration order,
//! each with its own deep copy; faults contained per subscriber
//! ```
//!
//! No lock is held while user code (middleware, provider, callback) runs,
//! so callbacks may reenter the bus: publish, subscribe, and unsubscribe
//! from inside a callback are all legal. Dispatch operates on a snapshot
//! of the registration list, so a reentrant unsubscribe takes effect
//! starting with the next publish.

use crate::clock::{SystemTimeSource, TimeSource};
use crate::config::BusConfig;
use crate::diagnostics::{DiagnosticsSink, Fault, TracingSink};
use crate::error::ConfigError;
use crate::event::{Delivery, Event, SubscriptionId};
use crate::middleware::{run_chain, Middleware};
use crate::replay::ReplayBuffer;
use crate::resolver::{run_initialization, InitContext, Pattern, SubscribeOptions};
use crate::snapshot::SnapshotRegistry;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Boxed subscriber callback, for the object-safe [`EventSubscriber`] seam.
pub type Callback = Box<dyn Fn(Delivery) -> anyhow::Result<()> + Send + Sync>;

pub(crate) type CallbackFn = dyn Fn(Delivery) -> anyhow::Result<()> + Send + Sync;

/// Publishing seam modules depend on instead of the concrete bus.
pub trait EventPublisher: Send + Sync {
    /// Broadcasts a named fact. Fire-and-forget; a middleware veto is
    /// silent.
    fn publish(&self, name: &str, payload: Value);

    /// Total publish attempts on this bus.
    fn events_published(&self) -> u64;
}

/// Subscribing seam modules depend on instead of the concrete bus.
pub trait EventSubscriber: Send + Sync {
    /// Subscribes `callback` to names matching `pattern`, running the
    /// hybrid initialization synchronously before returning.
    fn subscribe(
        &self,
        pattern: &str,
        callback: Callback,
        opts: SubscribeOptions,
    ) -> SubscriptionHandle;
}

/// One registered subscription.
struct SubscriberEntry {
    id: SubscriptionId,
    pattern: Pattern,
    owner: Option<String>,
    callback: Arc<CallbackFn>,
}

struct BusInner {
    /// Subscriptions in registration order; dispatch order follows it.
    subscribers: RwLock<Vec<SubscriberEntry>>,

    /// Middleware chain in registration order.
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,

    /// Bounded, time-decaying event history.
    replay: Mutex<ReplayBuffer>,

    /// Pull-based state providers.
    snapshots: SnapshotRegistry,

    /// Clock stamping events and driving expiry.
    clock: Arc<dyn TimeSource>,

    /// Destination for contained faults.
    sink: Arc<dyn DiagnosticsSink>,

    /// Total publish attempts.
    events_published: AtomicU64,
}

impl BusInner {
    fn remove_subscription(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|entry| entry.id != id);
        before != subscribers.len()
    }
}

/// The synchronization bus shared by the shell and its modules.
///
/// Cloning is cheap and yields another handle to the same bus instance.
#[derive(Clone)]
pub struct SyncBus {
    inner: Arc<BusInner>,
}

impl SyncBus {
    /// Creates a bus with default limits, the system clock, and the
    /// tracing diagnostics sink.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default()).unwrap_or_else(|_| unreachable!())
    }

    /// Creates a bus with explicit replay limits.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when a limit is non-positive.
    pub fn with_config(config: BusConfig) -> Result<Self, ConfigError> {
        Self::with_parts(config, Arc::new(SystemTimeSource), Arc::new(TracingSink))
    }

    /// Creates a bus with an injected clock and diagnostics sink.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when a limit is non-positive.
    pub fn with_parts(
        config: BusConfig,
        clock: Arc<dyn TimeSource>,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(Vec::new()),
                middleware: RwLock::new(Vec::new()),
                replay: Mutex::new(ReplayBuffer::new(
                    config.replay_capacity,
                    config.replay_ttl_ms,
                )),
                snapshots: SnapshotRegistry::new(),
                clock,
                sink,
                events_published: AtomicU64::new(0),
            }),
        })
    }

    /// Broadcasts a named fact to every matching subscription.
    ///
    /// The payload is owned by the event from here on; every subscriber
    /// receives its own deep copy. A middleware veto stops the publish
    /// silently. A faulting callback is reported to the diagnostics sink
    /// and cannot affect delivery to the remaining subscribers or the
    /// publisher.
    pub fn publish(&self, name: &str, payload: Value) {
        let now = self.inner.clock.now();
        let event = Event::new(name, payload, now);

        // Counts the attempt even when a middleware vetoes it.
        self.inner.events_published.fetch_add(1, Ordering::Relaxed);

        let chain: Vec<Arc<dyn Middleware>> = self.inner.middleware.read().clone();
        let Some(event) = run_chain(&chain, event, &*self.inner.sink) else {
            return;
        };

        let seq = self.inner.replay.lock().append(event.clone(), now);

        let targets: Vec<(SubscriptionId, Arc<CallbackFn>)> = self
            .inner
            .subscribers
            .read()
            .iter()
            .filter(|entry| entry.pattern.matches(&event.name))
            .map(|entry| (entry.id, Arc::clone(&entry.callback)))
            .collect();

        debug!(
            event = %event.name,
            seq,
            receivers = targets.len(),
            "Event published"
        );

        for (id, callback) in targets {
            if let Err(error) = callback(Delivery::live(&event)) {
                self.inner.sink.report(Fault::Subscriber {
                    subscription: id,
                    event: event.name.clone(),
                    error: error.to_string(),
                });
            }
        }
    }

    /// Subscribes `callback` to names matching `pattern`.
    ///
    /// The hybrid initialization (snapshot → replay → nothing) runs
    /// synchronously before this call returns; the subscription then
    /// receives every future matching publish. Subscribing twice with
    /// the same pattern yields two independent deliveries.
    pub fn subscribe<F>(
        &self,
        pattern: &str,
        callback: F,
        opts: SubscribeOptions,
    ) -> SubscriptionHandle
    where
        F: Fn(Delivery) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let pattern = Pattern::parse(pattern);
        let id = SubscriptionId::new();
        let callback: Arc<CallbackFn> = Arc::new(callback);

        run_initialization(
            &InitContext {
                snapshots: &self.inner.snapshots,
                replay: &self.inner.replay,
                clock: &*self.inner.clock,
                sink: &*self.inner.sink,
            },
            id,
            &pattern,
            &opts,
            &*callback,
        );

        debug!(subscription = %id, pattern = %pattern, "Subscription registered");
        self.inner.subscribers.write().push(SubscriberEntry {
            id,
            pattern,
            owner: opts.owner,
            callback,
        });

        SubscriptionHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Removes a subscription. Idempotent; takes effect starting with
    /// the next publish (a dispatch round already in flight completes).
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if self.inner.remove_subscription(handle.id) {
            debug!(subscription = %handle.id, "Subscription removed");
        }
    }

    /// Registers `pull` as `owner`'s state provider, replacing any
    /// previous registration for that id.
    pub fn register_state_provider(
        &self,
        owner: impl Into<String>,
        pull: impl Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    ) {
        self.inner.snapshots.register(owner, pull);
    }

    /// Removes `owner`'s state provider. No-op if absent.
    pub fn unregister_state_provider(&self, owner: &str) {
        self.inner.snapshots.unregister(owner);
    }

    /// Appends a middleware to the chain. Chain order is registration
    /// order; the only other mutation is [`reset_middleware`].
    ///
    /// [`reset_middleware`]: Self::reset_middleware
    pub fn register_middleware(&self, middleware: impl Middleware + 'static) {
        self.inner.middleware.write().push(Arc::new(middleware));
    }

    /// Clears the middleware chain.
    pub fn reset_middleware(&self) {
        self.inner.middleware.write().clear();
    }

    /// Applies new replay limits.
    ///
    /// Affects the replay buffer only; never retroactive to entries
    /// already evicted. On rejection the prior configuration remains in
    /// effect.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when a limit is non-positive.
    pub fn configure(&self, config: BusConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.inner
            .replay
            .lock()
            .set_limits(config.replay_capacity, config.replay_ttl_ms);
        debug!(
            capacity = config.replay_capacity,
            ttl_ms = config.replay_ttl_ms,
            "Replay limits reconfigured"
        );
        Ok(())
    }

    /// Removes every subscription tagged as owned by `owner` and
    /// unregisters `owner`'s state provider.
    pub fn teardown_module(&self, owner: &str) {
        let removed = {
            let mut subscribers = self.inner.subscribers.write();
            let before = subscribers.len();
            subscribers.retain(|entry| entry.owner.as_deref() != Some(owner));
            before - subscribers.len()
        };
        let had_provider = self.inner.snapshots.unregister(owner);
        debug!(
            owner = %owner,
            subscriptions_removed = removed,
            had_provider,
            "Module torn down"
        );
    }

    /// Current replay limits.
    #[must_use]
    pub fn config(&self) -> BusConfig {
        let replay = self.inner.replay.lock();
        BusConfig::new(replay.capacity(), replay.ttl_ms())
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Total publish attempts on this bus.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.inner.events_published.load(Ordering::Relaxed)
    }
}

impl Default for SyncBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for SyncBus {
    fn publish(&self, name: &str, payload: Value) {
        SyncBus::publish(self, name, payload);
    }

    fn events_published(&self) -> u64 {
        SyncBus::events_published(self)
    }
}

impl EventSubscriber for SyncBus {
    fn subscribe(
        &self,
        pattern: &str,
        callback: Callback,
        opts: SubscribeOptions,
    ) -> SubscriptionHandle {
        SyncBus::subscribe(self, pattern, callback, opts)
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle does not cancel the subscription; removal is
/// explicit via [`unsubscribe`](Self::unsubscribe) or the bus's
/// `teardown_module`.
#[must_use = "keep the handle to be able to unsubscribe later"]
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    inner: Weak<BusInner>,
}

impl SubscriptionHandle {
    /// Identifier of the subscription this handle controls.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Removes the subscription. Idempotent; a no-op once the bus is
    /// gone.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            if inner.remove_subscription(self.id) {
                debug!(subscription = %self.id, "Subscription removed");
            }
        }
    }

    /// Whether the subscription is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.upgrade().is_some_and(|inner| {
            inner
                .subscribers
                .read()
                .iter()
                .any(|entry| entry.id == self.id)
        })
    }
}
