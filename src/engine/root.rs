use std::collections::HashMap;

use crate::{
    backend::{Backends, GpuPool},
    engine::{EngineConfig, EngineImage, EngineMetrics},
    foundation::core::{Rgba8Premul, Size},
    foundation::error::{EngineError, EngineResult, ProtocolError},
    protocol::opcode::Namespace,
    resource::release::{ReleaseFlags, ReleaseResources},
    surface::{CopyPath, PixelBuffer, SurfaceKind},
};

/// Top-level engine instance.
///
/// Owns every image created through it and its scratch canvas pool. GPU contexts come from the
/// [`GpuPool`] of the execution context, where this engine leases under a key of its own.
///
/// Disposed images stay registered as tombstones, so any later use of their handle is an
/// invalid-state error rather than an unknown handle.
pub struct EngineRoot {
    namespace: Namespace,
    config: EngineConfig,
    backends: Backends,
    images: HashMap<String, EngineImage>,
    next_image: u64,
    images_created: u64,
    images_disposed: u64,
    disposed: bool,
}

impl EngineRoot {
    /// Create an engine leasing GPU contexts from `gpu`.
    pub fn new(namespace: Namespace, config: EngineConfig, gpu: GpuPool) -> Self {
        tracing::debug!(%namespace, ?config, "engine created");
        Self {
            namespace,
            config,
            backends: Backends::new(gpu, config.scratch_retention),
            images: HashMap::new(),
            next_image: 0,
            images_created: 0,
            images_disposed: 0,
            disposed: false,
        }
    }

    /// Backend family the engine was created for.
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Configuration in effect.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 2D surface kind new images start on.
    pub fn default_surface_kind(&self) -> SurfaceKind {
        self.namespace.surface_kind()
    }

    /// Return `true` once disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Pools the engine's surfaces lease from.
    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    fn check_live(&self) -> EngineResult<()> {
        if self.disposed {
            return Err(EngineError::invalid_state("engine is disposed"));
        }
        Ok(())
    }

    fn validate_size(&self, size: Size) -> EngineResult<Size> {
        let size = Size::validated(size.width, size.height)?;
        let cap = self.config.max_image_size;
        if !size.fits_within(cap) {
            return Err(EngineError::dimension(format!(
                "image {size} exceeds the {cap} limit"
            )));
        }
        Ok(size)
    }

    /// Create an image under a fresh `img-<n>` handle and return the handle.
    ///
    /// Dimensions are checked before anything is registered; images allocate no backend surface
    /// until first use.
    pub fn create_image(&mut self, size: Size) -> EngineResult<String> {
        self.check_live()?;
        let size = self.validate_size(size)?;
        let handle = loop {
            let candidate = format!("img-{}", self.next_image);
            self.next_image += 1;
            if !self.images.contains_key(&candidate) {
                break candidate;
            }
        };
        self.register(&handle, size);
        Ok(handle)
    }

    /// Create an image under a caller-chosen handle. An existing handle is never overwritten.
    pub fn create_image_with_handle(&mut self, handle: &str, size: Size) -> EngineResult<()> {
        self.check_live()?;
        if self.images.contains_key(handle) {
            return Err(ProtocolError::HandleCollision(handle.to_string()).into());
        }
        let size = self.validate_size(size)?;
        self.register(handle, size);
        Ok(())
    }

    fn register(&mut self, handle: &str, size: Size) {
        let kind = self.default_surface_kind();
        self.images
            .insert(handle.to_string(), EngineImage::new(handle, size, kind));
        self.images_created += 1;
        tracing::debug!(handle, %size, %kind, "image created");
    }

    /// Look up an image, including a disposed one.
    pub fn image(&self, handle: &str) -> EngineResult<&EngineImage> {
        self.images
            .get(handle)
            .ok_or_else(|| ProtocolError::UnknownHandle(handle.to_string()).into())
    }

    /// Look up an image mutably.
    pub fn image_mut(&mut self, handle: &str) -> EngineResult<&mut EngineImage> {
        self.images
            .get_mut(handle)
            .ok_or_else(|| ProtocolError::UnknownHandle(handle.to_string()).into())
    }

    /// Borrow an image together with the backends its operations need.
    pub fn image_env(&mut self, handle: &str) -> EngineResult<(&mut EngineImage, &mut Backends)> {
        self.check_live()?;
        let image = self
            .images
            .get_mut(handle)
            .ok_or_else(|| EngineError::from(ProtocolError::UnknownHandle(handle.to_string())))?;
        Ok((image, &mut self.backends))
    }

    /// Handles of images that are not disposed, sorted.
    pub fn handles(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .images
            .iter()
            .filter(|(_, image)| !image.is_disposed())
            .map(|(handle, _)| handle.clone())
            .collect();
        out.sort();
        out
    }

    /// Fill an image with one color.
    pub fn fill_image(&mut self, handle: &str, px: Rgba8Premul) -> EngineResult<()> {
        let (image, env) = self.image_env(handle)?;
        image.fill(env, px)
    }

    /// Read one pixel of an image.
    pub fn pixel(&mut self, handle: &str, x: u32, y: u32) -> EngineResult<Rgba8Premul> {
        let (image, env) = self.image_env(handle)?;
        image.get_pixel(env, x, y)
    }

    /// Read back a whole image.
    pub fn read_pixels(&mut self, handle: &str) -> EngineResult<PixelBuffer> {
        let (image, env) = self.image_env(handle)?;
        image.read_pixels(env)
    }

    /// Move an image's content onto a surface of `kind`.
    pub fn move_image(&mut self, handle: &str, kind: SurfaceKind) -> EngineResult<CopyPath> {
        let (image, env) = self.image_env(handle)?;
        image.move_to(env, kind)
    }

    /// Copy the content of image `src` into image `dst`.
    pub fn copy_image(&mut self, dst: &str, src: &str) -> EngineResult<CopyPath> {
        self.check_live()?;
        if dst == src {
            return Err(EngineError::invalid_state(format!(
                "cannot copy image '{dst}' onto itself"
            )));
        }
        match self.images.get_disjoint_mut([dst, src]) {
            [Some(d), Some(s)] => d.copy_from(&mut self.backends, s),
            [None, _] => Err(ProtocolError::UnknownHandle(dst.to_string()).into()),
            [_, None] => Err(ProtocolError::UnknownHandle(src.to_string()).into()),
        }
    }

    /// Decode encoded bytes into an existing image.
    pub async fn load_encoded(&mut self, handle: &str, bytes: &[u8]) -> EngineResult<()> {
        let (image, env) = self.image_env(handle)?;
        image.load_encoded(env, bytes).await
    }

    /// Encode an image as PNG.
    pub async fn encode_png(&mut self, handle: &str) -> EngineResult<Vec<u8>> {
        let (image, env) = self.image_env(handle)?;
        image.encode_png(env).await
    }

    /// Release one image's backend resources; the image stays usable.
    pub fn release_image(&mut self, handle: &str, flags: ReleaseFlags) -> EngineResult<()> {
        let (image, env) = self.image_env(handle)?;
        image.release_resources(env, flags)
    }

    /// Dispose one image. Its handle stays taken; a second dispose is an invalid-state error.
    pub fn dispose_image(&mut self, handle: &str) -> EngineResult<()> {
        let (image, env) = self.image_env(handle)?;
        image.dispose(env)?;
        self.images_disposed += 1;
        Ok(())
    }

    /// Dispose every image, then every pooled resource. Terminal.
    pub fn dispose(&mut self) -> EngineResult<()> {
        self.check_live()?;
        let mut first_err = None;
        for image in self.images.values_mut().filter(|i| !i.is_disposed()) {
            self.images_disposed += 1;
            if let Err(err) = image.dispose(&mut self.backends) {
                first_err.get_or_insert(err);
            }
        }
        self.backends.dispose();
        self.disposed = true;
        tracing::debug!(namespace = %self.namespace, "engine disposed");
        first_err.map_or(Ok(()), Err)
    }

    /// Snapshot of the engine's counters.
    pub fn metrics(&self) -> EngineMetrics {
        let mut materialized = std::collections::BTreeMap::new();
        for kind in SurfaceKind::ALL {
            materialized.insert(kind, 0);
        }
        let mut pixel_snapshots = 0;
        let mut live_images = 0;
        for image in self.images.values().filter(|i| !i.is_disposed()) {
            live_images += 1;
            for kind in image.materialized_kinds() {
                *materialized.entry(kind).or_insert(0) += 1;
            }
            if image.has_pixel_snapshot() {
                pixel_snapshots += 1;
            }
        }
        EngineMetrics {
            live_images,
            images_created: self.images_created,
            images_disposed: self.images_disposed,
            materialized,
            pixel_snapshots,
            gpu_context: self.backends.gpu_state(),
            gpu_pool: self.backends.gpu_stats(),
            scratch_pool: self.backends.scratch_stats(),
            platform_live_contexts: self.backends.platform().live_contexts(),
        }
    }
}

impl ReleaseResources for EngineRoot {
    type Env<'a> = ();

    /// `ReleaseOwnOnly` disposes the engine's idle pooled resources; images keep their CPU
    /// surfaces, and content held in GPU textures is parked in pixel buffers first since the
    /// textures die with the context. `ReleaseRecursive` first releases every image.
    fn release_resources(&mut self, _env: (), flags: ReleaseFlags) -> EngineResult<()> {
        self.check_live()?;
        let live = self.images.values_mut().filter(|i| !i.is_disposed());
        if flags.is_recursive() {
            for image in live {
                image.release_resources(&mut self.backends, ReleaseFlags::ReleaseRecursive)?;
            }
        } else {
            for image in live {
                image.park_gpu(&mut self.backends)?;
            }
        }
        self.backends.release_idle();
        tracing::debug!(namespace = %self.namespace, ?flags, "engine released");
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/engine/root.rs"]
mod tests;
