//! Engine instances: an [`EngineRoot`] owns its images, its scratch pool and a key in the shared
//! GPU pool.

/// Images and their surfaces.
pub mod image;
/// Engine root: image registry and release semantics.
pub mod root;

use std::collections::BTreeMap;

pub use image::EngineImage;
pub use root::EngineRoot;

use crate::{
    foundation::core::Size,
    foundation::error::{EngineError, EngineResult},
    resource::pool::{PoolStats, ResourceState, RetentionPolicy},
    surface::SurfaceKind,
};

/// Per-engine configuration.
///
/// Every field has a default, so a partial JSON object (or `{}`) is a valid config.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest image either dimension may reach.
    pub max_image_size: Size,
    /// Retention for the `"2D"` scratch canvas pool.
    pub scratch_retention: RetentionPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_image_size: Size::new(8192, 8192),
            scratch_retention: RetentionPolicy::BoundedLru { capacity: 1 },
        }
    }
}

impl EngineConfig {
    /// Parse a config from JSON.
    pub fn from_json(s: &str) -> EngineResult<Self> {
        serde_json::from_str(s).map_err(|e| EngineError::serde(format!("engine config: {e}")))
    }
}

/// Snapshot of one engine's bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EngineMetrics {
    /// Images registered and not disposed.
    pub live_images: usize,
    /// Images created over the engine's lifetime.
    pub images_created: u64,
    /// Images disposed over the engine's lifetime.
    pub images_disposed: u64,
    /// Materialized surfaces per backend kind.
    pub materialized: BTreeMap<SurfaceKind, usize>,
    /// Images currently holding a raw pixel snapshot.
    pub pixel_snapshots: usize,
    /// State of this engine's GPU context, if it has one.
    pub gpu_context: Option<ResourceState>,
    /// Counters of the GPU context pool shared by the execution context.
    pub gpu_pool: PoolStats,
    /// Scratch canvas pool counters.
    pub scratch_pool: PoolStats,
    /// GPU contexts alive on the platform, across every engine sharing it.
    pub platform_live_contexts: usize,
}
