//! Platform-side resources an engine draws on: GPU contexts from a [`GpuPool`] shared across the
//! execution context, and scratch canvases from a per-engine [`ResourcePool`].

/// Simulated GPU platform with a live-context ceiling.
pub mod gpu;
/// Pooled scratch canvas for encoding and decoding.
pub mod scratch;

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{
    backend::{
        gpu::{GpuContext, GpuPlatform},
        scratch::ScratchCanvas,
    },
    foundation::core::ResourceId,
    foundation::error::EngineResult,
    resource::pool::{PoolLease, PoolStats, ResourcePool, ResourceState, RetentionPolicy},
};

/// Key prefix for GPU contexts; each engine leases under its own `GPU/<n>` key.
pub const GPU_POOL_KEY: &str = "GPU";
/// Pool key for scratch 2D canvases.
pub const SCRATCH_POOL_KEY: &str = "2D";

/// GPU context pool of one execution context, shared by every engine created there.
///
/// Each engine owns one key. When the platform refuses a new context at its ceiling, the pool
/// disposes the least recently used idle context (whichever engine it belongs to) and tries
/// again. Cloning shares the pool.
#[derive(Clone)]
pub struct GpuPool {
    platform: GpuPlatform,
    pool: Rc<RefCell<ResourcePool<GpuContext>>>,
    next_owner: Rc<Cell<u64>>,
}

impl GpuPool {
    /// Create an empty pool drawing contexts from `platform`.
    pub fn new(platform: GpuPlatform, retention: RetentionPolicy) -> Self {
        Self {
            platform,
            pool: Rc::new(RefCell::new(ResourcePool::new("gpu", retention))),
            next_owner: Rc::new(Cell::new(0)),
        }
    }

    /// Platform the contexts come from.
    pub fn platform(&self) -> &GpuPlatform {
        &self.platform
    }

    /// Pool counters across every engine.
    pub fn stats(&self) -> PoolStats {
        self.pool.borrow().stats()
    }

    /// Keys of idle contexts, least recently used first.
    pub fn idle_keys(&self) -> Vec<String> {
        self.pool.borrow().lru_keys()
    }

    /// State of the context leased under `key`, if any.
    pub fn state(&self, key: &str) -> Option<ResourceState> {
        self.pool.borrow().state(key)
    }

    /// Dispose every idle context.
    pub fn clear_idle(&self) {
        self.pool.borrow_mut().clear();
    }

    fn owner_key(&self) -> String {
        let n = self.next_owner.get();
        self.next_owner.set(n + 1);
        format!("{GPU_POOL_KEY}/{n}")
    }
}

/// Backend resources one engine draws on: its key in the shared [`GpuPool`] and its own scratch
/// canvas pool.
///
/// Surfaces receive this as their environment whenever an operation needs a scarce resource.
pub struct Backends {
    gpu: GpuPool,
    gpu_key: String,
    scratch: ResourcePool<ScratchCanvas>,
}

impl Backends {
    /// Claim a fresh key in `gpu` and create a scratch pool.
    pub fn new(gpu: GpuPool, scratch_retention: RetentionPolicy) -> Self {
        let gpu_key = gpu.owner_key();
        Self {
            gpu,
            gpu_key,
            scratch: ResourcePool::new("scratch", scratch_retention),
        }
    }

    /// Shared GPU platform.
    pub fn platform(&self) -> &GpuPlatform {
        self.gpu.platform()
    }

    /// Shared GPU pool.
    pub fn gpu_pool(&self) -> &GpuPool {
        &self.gpu
    }

    /// This engine's key in the GPU pool.
    pub fn gpu_key(&self) -> &str {
        &self.gpu_key
    }

    /// Lease the engine's GPU context, creating one on a miss.
    pub fn lease_gpu(&mut self) -> EngineResult<PoolLease<GpuContext>> {
        let platform = self.gpu.platform.clone();
        self.gpu
            .pool
            .borrow_mut()
            .get_or_create(&self.gpu_key, move || platform.create_context())
    }

    /// Return a GPU lease for recycling.
    pub fn return_gpu(&mut self, lease: PoolLease<GpuContext>) {
        self.gpu.pool.borrow_mut().release(lease);
    }

    /// Return a GPU lease whose context turned out to be lost.
    pub fn discard_gpu(&mut self, lease: PoolLease<GpuContext>) {
        self.gpu.pool.borrow_mut().discard(lease);
    }

    /// Run `f` on the engine's context without leasing it or touching its recency. `None` when
    /// context `id` is no longer the one registered for this engine.
    pub fn with_registered_gpu<T>(
        &self,
        id: ResourceId,
        f: impl FnOnce(&mut GpuContext) -> T,
    ) -> Option<T> {
        let pool = self.gpu.pool.borrow();
        pool.registered_mut(&self.gpu_key, id)
            .map(|mut ctx| f(&mut ctx))
    }

    /// Lease the scratch canvas.
    pub fn lease_scratch(&mut self) -> EngineResult<PoolLease<ScratchCanvas>> {
        self.scratch
            .get_or_create(SCRATCH_POOL_KEY, || Ok(ScratchCanvas::new()))
    }

    /// Return a scratch lease.
    pub fn return_scratch(&mut self, lease: PoolLease<ScratchCanvas>) {
        self.scratch.release(lease);
    }

    /// Dispose this engine's idle pooled resources; leased ones and other engines' contexts
    /// stay.
    pub fn release_idle(&mut self) {
        self.gpu.pool.borrow_mut().clear_key(&self.gpu_key);
        self.scratch.clear();
    }

    /// Dispose every resource this engine pooled.
    pub fn dispose(&mut self) {
        self.gpu.pool.borrow_mut().dispose_key(&self.gpu_key);
        self.scratch.dispose_all();
    }

    /// State of this engine's GPU context, if it has one.
    pub fn gpu_state(&self) -> Option<ResourceState> {
        self.gpu.state(&self.gpu_key)
    }

    /// Shared GPU pool counters.
    pub fn gpu_stats(&self) -> PoolStats {
        self.gpu.stats()
    }

    /// Scratch pool counters.
    pub fn scratch_stats(&self) -> PoolStats {
        self.scratch.stats()
    }
}
