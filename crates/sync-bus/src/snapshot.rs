//! # State Snapshot Registry
//!
//! Lets a module expose a pull-based "current truth" that a late
//! subscriber can fetch without waiting for a future event.
//!
//! Presence of a provider is a registry lookup, never a runtime probe of
//! the module object; modules opt in with an explicit [`register`] call.
//!
//! ## Reentrancy
//!
//! A provider may, directly or through a chain of other providers, end up
//! triggering another fetch of itself. The registry refuses the nested
//! call with [`SnapshotUnavailable::Reentrant`] instead of recursing: each
//! owner id carries an in-flight marker for the duration of its pull,
//! released by an RAII guard whether the pull returns normally or fails.
//!
//! [`register`]: SnapshotRegistry::register

use crate::error::SnapshotUnavailable;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// A module's pull function. Must be side-effect-free from the bus's
/// perspective; the returned value is owned by the caller.
pub type ProviderFn = dyn Fn() -> anyhow::Result<Value> + Send + Sync;

/// Registry of pull-based state providers, at most one per owner id.
#[derive(Default)]
pub struct SnapshotRegistry {
    /// Registered providers by owner id.
    providers: RwLock<HashMap<String, Arc<ProviderFn>>>,

    /// Owner ids with a pull currently on the call stack.
    in_flight: Mutex<HashSet<String>>,
}

impl SnapshotRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pull` for `owner`, replacing any previous provider.
    pub fn register(
        &self,
        owner: impl Into<String>,
        pull: impl Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    ) {
        let owner = owner.into();
        let replaced = self
            .providers
            .write()
            .insert(owner.clone(), Arc::new(pull))
            .is_some();
        debug!(owner = %owner, replaced, "State provider registered");
    }

    /// Removes the provider for `owner`. Returns whether one existed.
    pub fn unregister(&self, owner: &str) -> bool {
        let removed = self.providers.write().remove(owner).is_some();
        if removed {
            debug!(owner = %owner, "State provider unregistered");
        }
        removed
    }

    /// Whether a provider is registered for `owner`.
    #[must_use]
    pub fn contains(&self, owner: &str) -> bool {
        self.providers.read().contains_key(owner)
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    /// True when no providers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// Pulls the current value for `owner`.
    ///
    /// The pull runs with no registry lock held, so a provider is free to
    /// use the bus; only a nested fetch of an owner already mid-pull is
    /// refused.
    ///
    /// # Errors
    ///
    /// - [`SnapshotUnavailable::Missing`] - no provider for `owner`
    /// - [`SnapshotUnavailable::Reentrant`] - `owner` is already mid-pull
    /// - [`SnapshotUnavailable::Failed`] - the pull returned an error
    pub fn fetch(&self, owner: &str) -> Result<Value, SnapshotUnavailable> {
        let provider = self
            .providers
            .read()
            .get(owner)
            .cloned()
            .ok_or_else(|| SnapshotUnavailable::Missing(owner.to_owned()))?;

        if !self.in_flight.lock().insert(owner.to_owned()) {
            return Err(SnapshotUnavailable::Reentrant(owner.to_owned()));
        }
        let _release = InFlightRelease {
            registry: self,
            owner,
        };

        provider().map_err(|error| SnapshotUnavailable::Failed {
            owner: owner.to_owned(),
            reason: error.to_string(),
        })
    }
}

impl std::fmt::Debug for SnapshotRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotRegistry")
            .field("providers", &self.providers.read().len())
            .field("in_flight", &*self.in_flight.lock())
            .finish()
    }
}

/// Clears the in-flight marker when the pull unwinds, normally or not.
struct InFlightRelease<'a> {
    registry: &'a SnapshotRegistry,
    owner: &'a str,
}

impl Drop for InFlightRelease<'_> {
    fn drop(&mut self) {
        self.registry.in_flight.lock().remove(self.owner);
    }
}
