use std::collections::BTreeMap;

use crate::{
    backend::Backends,
    foundation::core::{Rgba8Premul, Size},
    foundation::error::{EngineError, EngineResult},
    resource::release::{ReleaseFlags, ReleaseResources},
    surface::{BackendSurface, CopyPath, PixelBuffer, SurfaceKind},
};

/// One logical image inside an engine.
///
/// Holds at most one surface per [`SurfaceKind`] plus an optional raw [`PixelBuffer`]. The
/// primary kind holds the authoritative content; when the image has been released its content
/// lives in the raw buffer until the primary surface is used again.
pub struct EngineImage {
    handle: String,
    size: Size,
    primary: SurfaceKind,
    surfaces: BTreeMap<SurfaceKind, BackendSurface>,
    pixels: Option<PixelBuffer>,
    disposed: bool,
}

impl EngineImage {
    pub(crate) fn new(handle: &str, size: Size, primary: SurfaceKind) -> Self {
        Self {
            handle: handle.to_string(),
            size,
            primary,
            surfaces: BTreeMap::new(),
            pixels: None,
            disposed: false,
        }
    }

    /// Handle the image is registered under.
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Image dimensions.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Surface kind holding the authoritative content.
    pub fn primary_kind(&self) -> SurfaceKind {
        self.primary
    }

    /// Return `true` once disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Kinds whose surface currently holds a backend handle.
    pub fn materialized_kinds(&self) -> Vec<SurfaceKind> {
        self.surfaces
            .iter()
            .filter(|(_, s)| s.is_materialized())
            .map(|(k, _)| *k)
            .collect()
    }

    /// Return `true` while the content is parked in the raw pixel buffer.
    pub fn has_pixel_snapshot(&self) -> bool {
        self.pixels.is_some()
    }

    fn check_live(&self) -> EngineResult<()> {
        if self.disposed {
            return Err(EngineError::invalid_state(format!(
                "image '{}' is disposed",
                self.handle
            )));
        }
        Ok(())
    }

    fn surface_entry(&mut self, kind: SurfaceKind) -> EngineResult<&mut BackendSurface> {
        if !self.surfaces.contains_key(&kind) {
            let s = BackendSurface::create(kind, &self.handle, self.size)?;
            self.surfaces.insert(kind, s);
        }
        self.surfaces
            .get_mut(&kind)
            .ok_or_else(|| EngineError::invalid_state(format!("{kind} surface missing")))
    }

    /// Primary surface, restoring parked content into it first.
    fn primary_surface(&mut self, env: &mut Backends) -> EngineResult<&mut BackendSurface> {
        self.check_live()?;
        let kind = self.primary;
        self.surface_entry(kind)?;
        if let Some(buf) = self.pixels.take() {
            let surface = self.surface_entry(kind)?;
            tracing::debug!(handle = %surface.handle(), %kind, "restoring released pixels");
            if let Err(err) = surface.load_pixels(env, &buf) {
                self.pixels = Some(buf);
                return Err(err);
            }
        }
        self.surface_entry(kind)
    }

    /// Fill the whole image with one color.
    pub fn fill(&mut self, env: &mut Backends, px: Rgba8Premul) -> EngineResult<()> {
        self.check_live()?;
        // The old content is about to be overwritten; skip restoring it.
        self.pixels = None;
        self.primary_surface(env)?.fill(env, px)
    }

    /// Write one premultiplied pixel.
    pub fn set_pixel(
        &mut self,
        env: &mut Backends,
        x: u32,
        y: u32,
        px: Rgba8Premul,
    ) -> EngineResult<()> {
        self.primary_surface(env)?.set_pixel(env, x, y, px)
    }

    /// Read one premultiplied pixel. Parked content is read without re-materializing.
    pub fn get_pixel(&mut self, env: &mut Backends, x: u32, y: u32) -> EngineResult<Rgba8Premul> {
        self.check_live()?;
        if let Some(buf) = &self.pixels {
            return buf.pixel(x, y).ok_or_else(|| {
                EngineError::dimension(format!("pixel ({x},{y}) outside {} image", self.size))
            });
        }
        self.primary_surface(env)?.get_pixel(env, x, y)
    }

    /// Read back the whole image.
    pub fn read_pixels(&mut self, env: &mut Backends) -> EngineResult<PixelBuffer> {
        self.check_live()?;
        if let Some(buf) = &self.pixels {
            return Ok(buf.clone());
        }
        self.primary_surface(env)?.read_pixels(env)
    }

    /// Replace the whole image; `buf` must match the image size.
    pub fn load_pixels(&mut self, env: &mut Backends, buf: &PixelBuffer) -> EngineResult<()> {
        self.check_live()?;
        self.pixels = None;
        self.primary_surface(env)?.load_pixels(env, buf)
    }

    /// Transfer the content to a surface of `kind` and make it primary. The previous primary
    /// surface gives its backend handle back.
    pub fn move_to(&mut self, env: &mut Backends, kind: SurfaceKind) -> EngineResult<CopyPath> {
        self.primary_surface(env)?;
        if kind == self.primary {
            return Ok(CopyPath::Direct);
        }
        let old = self.primary;
        let mut src = self
            .surfaces
            .remove(&old)
            .ok_or_else(|| EngineError::invalid_state(format!("{old} surface missing")))?;
        let copied = self
            .surface_entry(kind)
            .and_then(|dst| dst.copy_from(env, &mut src));
        let released = src.release_resources(&mut *env, ReleaseFlags::ReleaseOwnOnly);
        self.surfaces.insert(old, src);
        let path = copied?;
        released?;

        self.primary = kind;
        tracing::debug!(handle = %self.handle, from = %old, to = %kind, ?path, "image moved");
        Ok(path)
    }

    /// Copy another image's content into this one's primary surface.
    pub fn copy_from(
        &mut self,
        env: &mut Backends,
        other: &mut EngineImage,
    ) -> EngineResult<CopyPath> {
        self.check_live()?;
        other.check_live()?;
        if self.size != other.size {
            return Err(EngineError::dimension(format!(
                "cannot copy {} image '{}' into {} image '{}'",
                other.size, other.handle, self.size, self.handle
            )));
        }
        self.pixels = None;
        let kind = self.primary;
        let src = other.primary_surface(env)?;
        let dst = self.surface_entry(kind)?;
        dst.copy_from(env, src)
    }

    /// Decode encoded image bytes (PNG, JPEG, ...) into this image through the pooled scratch
    /// canvas. The decoded dimensions must match the image.
    pub async fn load_encoded(&mut self, env: &mut Backends, bytes: &[u8]) -> EngineResult<()> {
        self.check_live()?;
        let lease = env.lease_scratch()?;
        let decoded = lease.borrow_mut().decode(bytes);
        env.return_scratch(lease);
        let buf = decoded?;
        if buf.size() != self.size {
            return Err(EngineError::dimension(format!(
                "decoded {} image does not fit {} image '{}'",
                buf.size(),
                self.size,
                self.handle
            )));
        }
        self.load_pixels(env, &buf)
    }

    /// Encode the current content as PNG through the pooled scratch canvas.
    pub async fn encode_png(&mut self, env: &mut Backends) -> EngineResult<Vec<u8>> {
        let buf = self.read_pixels(env)?;
        let lease = env.lease_scratch()?;
        let encoded = lease.borrow_mut().encode_png(&buf);
        env.return_scratch(lease);
        encoded
    }

    /// Reclaim every surface. Disposal is terminal; a second call is an invalid-state error.
    pub fn dispose(&mut self, env: &mut Backends) -> EngineResult<()> {
        self.check_live()?;
        for s in self.surfaces.values_mut() {
            s.dispose(env)?;
        }
        self.surfaces.clear();
        self.pixels = None;
        self.disposed = true;
        tracing::debug!(handle = %self.handle, "image disposed");
        Ok(())
    }
}

impl EngineImage {
    /// Park content held in GPU textures and unbind them, leaving CPU surfaces alone. Used before
    /// the engine's GPU context goes away.
    pub(crate) fn park_gpu(&mut self, env: &mut Backends) -> EngineResult<()> {
        self.check_live()?;
        if self.primary == SurfaceKind::Gpu {
            self.snapshot_primary(env)?;
        }
        if let Some(s) = self.surfaces.get_mut(&SurfaceKind::Gpu) {
            s.release_resources(&mut *env, ReleaseFlags::ReleaseOwnOnly)?;
        }
        Ok(())
    }

    /// Copy the primary surface into the raw buffer, as long as that needs no new backend
    /// handle. Content that was already lost with its context stays lost.
    fn snapshot_primary(&mut self, env: &mut Backends) -> EngineResult<()> {
        if self.pixels.is_some() {
            return Ok(());
        }
        let Some(s) = self.surfaces.get_mut(&self.primary) else {
            return Ok(());
        };
        if !s.is_materialized() {
            return Ok(());
        }
        if !s.content_reachable(env) {
            tracing::debug!(handle = %self.handle, kind = %self.primary, "content already lost; nothing to park");
            return Ok(());
        }
        self.pixels = Some(s.read_pixels(env)?);
        Ok(())
    }
}

impl ReleaseResources for EngineImage {
    type Env<'a> = &'a mut Backends;

    /// Park the primary content in the raw buffer and give back every backend handle. Images own
    /// no child objects, so both flags behave the same.
    fn release_resources(&mut self, env: Self::Env<'_>, flags: ReleaseFlags) -> EngineResult<()> {
        self.check_live()?;
        self.snapshot_primary(env)?;
        for s in self.surfaces.values_mut() {
            s.release_resources(&mut *env, flags)?;
        }
        Ok(())
    }
}
