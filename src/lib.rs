#![forbid(unsafe_code)]
#![deny(missing_docs)]
//! `pixelworks`: the resource core of an image engine.
//!
//! Images live on raster, GPU or offscreen surfaces whose scarce backend resources (GPU contexts
//! under a hard platform ceiling, scratch canvases) are recycled through keyed pools with
//! freeze/defrost hooks. Engines can be driven across a thread boundary with a namespaced,
//! sequenced command protocol.

pub mod backend;
pub mod engine;
/// Shared value types and the error taxonomy.
pub mod foundation;
pub mod protocol;
/// Eviction ordering, keyed pools and the release protocol.
pub mod resource;
pub mod surface;

pub use backend::{
    Backends, GpuPool,
    gpu::{DEFAULT_MAX_LIVE_CONTEXTS, GpuContext, GpuPlatform},
    scratch::ScratchCanvas,
};
pub use engine::{EngineConfig, EngineImage, EngineMetrics, EngineRoot};
pub use foundation::core::{ResourceId, Rgba8Premul, Size};
pub use foundation::error::{EngineError, EngineResult, ProtocolError};
pub use protocol::{
    channel::{WorkerClient, WorkerOpts, spawn_worker},
    command::{Command, CommandLog, CommandState, Envelope, Payload, Reply, ReplyError},
    dispatch::Dispatcher,
    opcode::{Namespace, Op, Opcode},
};
pub use resource::{
    order::EvictionOrder,
    pool::{PoolLease, PoolStats, Poolable, ResourcePool, ResourceState, RetentionPolicy},
    release::{ReleaseFlags, ReleaseResources},
};
pub use surface::{BackendSurface, CopyPath, PixelBuffer, SurfaceKind};
