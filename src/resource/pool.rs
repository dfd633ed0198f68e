use std::{
    cell::{Ref, RefCell, RefMut},
    collections::HashMap,
    rc::Rc,
};

use crate::{
    foundation::core::ResourceId,
    foundation::error::{EngineError, EngineResult},
    resource::order::EvictionOrder,
};

/// Hooks a pooled backend object provides to the [`ResourcePool`].
pub trait Poolable {
    /// Shrink the idle footprint. Return `false` when the native handle is no longer usable.
    fn freeze(&mut self) -> bool;

    /// Revalidate before handing the resource out again. Return `false` when the platform revoked
    /// the native handle while it was idle.
    fn defrost(&mut self) -> bool;

    /// Release the native handle. Called exactly once by the pool.
    fn dispose(&mut self);
}

/// How many idle resources a pool keeps around.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Retain every resource ever created; idle ones are frozen, never evicted.
    #[default]
    KeepMaximum,
    /// Dispose least-recently-used idle resources once more than `capacity` are retained.
    BoundedLru {
        /// Maximum number of retained resources.
        capacity: usize,
    },
}

/// Lifecycle state of a pooled resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ResourceState {
    /// Handed out to at least one lease holder.
    Active,
    /// Idle in the pool with a shrunk footprint.
    Frozen,
    /// Native handle released; the resource will never be handed out again.
    Disposed,
}

/// Counters describing pool behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolStats {
    /// Resources constructed through a factory.
    pub created: u64,
    /// Requests served by an existing resource.
    pub reused: u64,
    /// Idle resources that failed revalidation.
    pub defrost_failures: u64,
    /// Released resources that could not be frozen.
    pub freeze_failures: u64,
    /// Idle resources disposed by the retention policy.
    pub evicted: u64,
    /// Resources whose native handle was released.
    pub disposed: u64,
    /// Resources currently registered (active or frozen).
    pub live: usize,
    /// Resources currently frozen.
    pub idle: usize,
}

struct PoolEntry<R> {
    id: ResourceId,
    state: ResourceState,
    leases: usize,
    resource: Rc<RefCell<R>>,
}

/// Temporary ownership of a pooled resource.
///
/// Every lease must be handed back through [`ResourcePool::release`] or
/// [`ResourcePool::discard`]; the holder must not touch the resource afterwards.
pub struct PoolLease<R> {
    key: String,
    id: ResourceId,
    resource: Rc<RefCell<R>>,
}

impl<R> PoolLease<R> {
    /// Identity of the leased resource.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Pool key the resource is registered under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Shared access to the resource.
    pub fn borrow(&self) -> Ref<'_, R> {
        self.resource.borrow()
    }

    /// Exclusive access to the resource.
    pub fn borrow_mut(&self) -> RefMut<'_, R> {
        self.resource.borrow_mut()
    }

    /// Return `true` when both leases point at the same concrete resource.
    pub fn same_resource(&self, other: &PoolLease<R>) -> bool {
        Rc::ptr_eq(&self.resource, &other.resource)
    }
}

impl<R> std::fmt::Debug for PoolLease<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolLease")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

/// Keyed cache of expensive backend objects.
///
/// The pool is the single owner of the native handles it manages: it alone decides whether a
/// released resource is frozen for reuse or disposed. At most one resource exists per key.
pub struct ResourcePool<R: Poolable> {
    name: &'static str,
    policy: RetentionPolicy,
    entries: HashMap<String, PoolEntry<R>>,
    order: EvictionOrder<String>,
    next_id: u64,
    stats: PoolStats,
}

impl<R: Poolable> ResourcePool<R> {
    /// Create an empty pool. `name` only shows up in logs and errors.
    pub fn new(name: &'static str, policy: RetentionPolicy) -> Self {
        Self {
            name,
            policy,
            entries: HashMap::new(),
            order: EvictionOrder::new(),
            next_id: 0,
            stats: PoolStats::default(),
        }
    }

    /// Retention policy in effect.
    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when no resource is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of pool counters.
    pub fn stats(&self) -> PoolStats {
        let mut out = self.stats;
        out.live = self.entries.len();
        out.idle = self
            .entries
            .values()
            .filter(|e| e.state == ResourceState::Frozen)
            .count();
        out
    }

    /// Idle keys from least to most recently used. Only frozen resources are eligible for
    /// recycling, so active ones never show up here.
    pub fn lru_keys(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }

    /// State of the resource registered under `key`, if any.
    pub fn state(&self, key: &str) -> Option<ResourceState> {
        self.entries.get(key).map(|e| e.state)
    }

    /// State of a resource by identity. Ids handed out earlier but no longer registered report
    /// [`ResourceState::Disposed`].
    pub fn state_of(&self, id: ResourceId) -> Option<ResourceState> {
        if let Some(e) = self.entries.values().find(|e| e.id == id) {
            return Some(e.state);
        }
        (id.0 < self.next_id).then_some(ResourceState::Disposed)
    }

    /// Borrow a registered resource for housekeeping (e.g. freeing per-caller data it holds)
    /// without leasing it or touching its recency. `None` when `id` is no longer registered
    /// under `key`.
    pub fn registered_mut(&self, key: &str, id: ResourceId) -> Option<RefMut<'_, R>> {
        self.entries
            .get(key)
            .filter(|e| e.id == id)
            .map(|e| e.resource.borrow_mut())
    }

    /// Lease the resource registered under `key`, constructing it with `factory` on a miss.
    ///
    /// Frozen resources are defrosted first. A resource that fails revalidation is disposed and
    /// replaced; only when that replacement also fails does the caller see
    /// [`EngineError::ContextInvalidated`]. When the factory reports
    /// [`EngineError::ResourceExhausted`], idle resources are disposed least recently used first
    /// to make room, and the caller sees the error only once nothing idle is left.
    pub fn get_or_create<F>(&mut self, key: &str, mut factory: F) -> EngineResult<PoolLease<R>>
    where
        F: FnMut() -> EngineResult<R>,
    {
        let mut invalidated = false;
        if let Some(entry) = self.entries.get_mut(key) {
            match entry.state {
                ResourceState::Active => {
                    entry.leases += 1;
                    self.stats.reused += 1;
                    return Ok(lease_for(key, entry));
                }
                ResourceState::Frozen => {
                    let alive = entry.resource.borrow_mut().defrost();
                    if alive {
                        entry.state = ResourceState::Active;
                        entry.leases = 1;
                        self.stats.reused += 1;
                        let lease = lease_for(key, entry);
                        tracing::debug!(pool = self.name, key, id = %lease.id, "defrosted");
                        self.order.remove(&key.to_string());
                        return Ok(lease);
                    }
                    tracing::warn!(
                        pool = self.name,
                        key,
                        id = %entry.id,
                        "pooled resource failed revalidation; recreating"
                    );
                    self.stats.defrost_failures += 1;
                    invalidated = true;
                }
                ResourceState::Disposed => {}
            }
        }
        if invalidated {
            self.remove_and_dispose(key);
        }

        let resource = loop {
            let err = match factory() {
                Ok(r) => break r,
                Err(err) => err,
            };
            if matches!(err, EngineError::ResourceExhausted(_)) && self.evict_lru_idle() {
                continue;
            }
            if invalidated {
                return Err(EngineError::context_invalidated(format!(
                    "{} resource '{key}' was revoked and recreation failed: {err}",
                    self.name
                )));
            }
            return Err(err);
        };

        let id = ResourceId(self.next_id);
        self.next_id += 1;
        let entry = PoolEntry {
            id,
            state: ResourceState::Active,
            leases: 1,
            resource: Rc::new(RefCell::new(resource)),
        };
        let lease = lease_for(key, &entry);
        self.entries.insert(key.to_string(), entry);
        self.stats.created += 1;
        tracing::debug!(pool = self.name, key, %id, "created");

        self.enforce_capacity();
        Ok(lease)
    }

    /// Hand a lease back. The last lease out freezes the resource; a resource that cannot be
    /// frozen is disposed instead of recycled.
    pub fn release(&mut self, lease: PoolLease<R>) {
        let Some(entry) = self.entries.get_mut(&lease.key) else {
            tracing::debug!(pool = self.name, key = %lease.key, "release of unregistered lease");
            return;
        };
        if entry.id != lease.id {
            tracing::debug!(pool = self.name, key = %lease.key, id = %lease.id, "stale lease");
            return;
        }
        entry.leases = entry.leases.saturating_sub(1);
        if entry.leases > 0 {
            return;
        }

        let frozen = entry.resource.borrow_mut().freeze();
        if frozen {
            entry.state = ResourceState::Frozen;
            self.order.enqueue(lease.key.clone());
        } else {
            tracing::warn!(pool = self.name, key = %lease.key, id = %lease.id, "freeze failed; disposing");
            self.stats.freeze_failures += 1;
            self.remove_and_dispose(&lease.key);
        }
        self.enforce_capacity();
    }

    /// Hand back a lease whose resource turned out to be unusable while active. The resource is
    /// unregistered and disposed even if other leases are still out; those become stale.
    pub fn discard(&mut self, lease: PoolLease<R>) {
        let matches = self
            .entries
            .get(&lease.key)
            .is_some_and(|e| e.id == lease.id);
        if matches {
            tracing::warn!(pool = self.name, key = %lease.key, id = %lease.id, "discarding active resource");
            self.remove_and_dispose(&lease.key);
        }
    }

    /// Dispose the resource under `key` if it is idle. Returns `true` when one was disposed.
    pub fn clear_key(&mut self, key: &str) -> bool {
        let idle = self
            .entries
            .get(key)
            .is_some_and(|e| e.state == ResourceState::Frozen);
        if idle {
            self.remove_and_dispose(key);
        }
        idle
    }

    /// Dispose the resource under `key` whatever its state; outstanding leases become stale.
    pub fn dispose_key(&mut self, key: &str) -> bool {
        let present = self.entries.contains_key(key);
        if present {
            self.remove_and_dispose(key);
        }
        present
    }

    /// Dispose every frozen resource. Active resources are left alone.
    pub fn clear(&mut self) {
        let idle: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.state == ResourceState::Frozen)
            .map(|(k, _)| k.clone())
            .collect();
        for key in idle {
            self.remove_and_dispose(&key);
        }
    }

    /// Dispose everything, including resources that still have leases out.
    pub fn dispose_all(&mut self) {
        let keys: Vec<String> = self.entries.keys().cloned().collect();
        for key in keys {
            self.remove_and_dispose(&key);
        }
    }

    fn enforce_capacity(&mut self) {
        let RetentionPolicy::BoundedLru { capacity } = self.policy else {
            return;
        };
        while self.entries.len() > capacity {
            if !self.evict_lru_idle() {
                break;
            }
        }
    }

    /// Dispose the least recently used idle resource. `false` when nothing is idle.
    fn evict_lru_idle(&mut self) -> bool {
        let Some(victim) = self.order.dequeue() else {
            return false;
        };
        tracing::debug!(pool = self.name, key = %victim, "evicting least recently used");
        self.stats.evicted += 1;
        self.remove_and_dispose(&victim);
        true
    }

    fn remove_and_dispose(&mut self, key: &str) {
        self.order.remove(&key.to_string());
        if let Some(entry) = self.entries.remove(key) {
            entry.resource.borrow_mut().dispose();
            self.stats.disposed += 1;
        }
    }
}

impl<R: Poolable> Drop for ResourcePool<R> {
    fn drop(&mut self) {
        self.dispose_all();
    }
}

fn lease_for<R>(key: &str, entry: &PoolEntry<R>) -> PoolLease<R> {
    PoolLease {
        key: key.to_string(),
        id: entry.id,
        resource: entry.resource.clone(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/resource/pool.rs"]
mod tests;
