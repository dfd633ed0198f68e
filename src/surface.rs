//! Backend surfaces: one capability contract, three platform variants.
//!
//! [`BackendSurface`] owns the shared lifecycle (disposed checks, bounds checks, dispose
//! ordering); the variants in [`raster`], [`gpu`] and [`offscreen`] only implement
//! [`SurfaceOps`]. Copies between variants that cannot copy surface-to-surface go through a
//! [`PixelBuffer`].

/// GPU texture surface.
pub mod gpu;
/// tiny-skia offscreen surface.
pub mod offscreen;
/// vello_cpu raster surface.
pub mod raster;

use rayon::prelude::*;

use crate::{
    backend::Backends,
    foundation::core::{Rgba8Premul, Size},
    foundation::error::{EngineError, EngineResult},
    resource::release::{ReleaseFlags, ReleaseResources},
};

/// Below this many bytes a fill runs on the calling thread.
const PARALLEL_FILL_MIN_BYTES: usize = 256 * 1024;

/// Fill a tightly packed RGBA8 slice with one color.
pub fn fill_rgba8(bytes: &mut [u8], px: Rgba8Premul) {
    let px = px.to_array();
    if bytes.len() >= PARALLEL_FILL_MIN_BYTES {
        bytes
            .par_chunks_exact_mut(4)
            .for_each(|dst| dst.copy_from_slice(&px));
    } else {
        for dst in bytes.chunks_exact_mut(4) {
            dst.copy_from_slice(&px);
        }
    }
}

pub(crate) fn pixel_offset(size: Size, x: u32, y: u32) -> EngineResult<usize> {
    if !size.contains(x, y) {
        return Err(EngineError::dimension(format!(
            "pixel ({x},{y}) outside {size} surface"
        )));
    }
    Ok(((y as usize) * (size.width as usize) + (x as usize)) * 4)
}

/// Tightly packed, row-major, top-down premultiplied RGBA8 pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    size: Size,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Transparent buffer.
    pub fn new(size: Size) -> Self {
        Self {
            size,
            data: vec![0; size.rgba_len()],
        }
    }

    /// Buffer filled with one color.
    pub fn solid(size: Size, px: Rgba8Premul) -> Self {
        let mut out = Self::new(size);
        fill_rgba8(&mut out.data, px);
        out
    }

    /// Wrap raw bytes, checking the length against `size`.
    pub fn from_raw(size: Size, data: Vec<u8>) -> EngineResult<Self> {
        if data.len() != size.rgba_len() {
            return Err(EngineError::dimension(format!(
                "pixel buffer for {size} needs {} bytes, got {}",
                size.rgba_len(),
                data.len()
            )));
        }
        Ok(Self { size, data })
    }

    /// Buffer dimensions.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Pixel at `(x, y)`, or `None` out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba8Premul> {
        let i = pixel_offset(self.size, x, y).ok()?;
        Some(Rgba8Premul::from_array([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]))
    }

    /// Overwrite one pixel.
    pub fn set_pixel(&mut self, x: u32, y: u32, px: Rgba8Premul) -> EngineResult<()> {
        let i = pixel_offset(self.size, x, y)?;
        self.data[i..i + 4].copy_from_slice(&px.to_array());
        Ok(())
    }

    /// Reverse row order in place (top-down <-> bottom-up).
    pub fn flip_rows(&mut self) {
        let stride = self.size.width as usize * 4;
        let rows = self.size.height as usize;
        for top in 0..rows / 2 {
            let bottom = rows - 1 - top;
            let (head, tail) = self.data.split_at_mut(bottom * stride);
            head[top * stride..(top + 1) * stride].swap_with_slice(&mut tail[..stride]);
        }
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Give up the raw bytes.
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }
}

/// Which backend a surface lives on.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    /// CPU 2D raster canvas.
    Raster,
    /// GPU texture in a pooled context.
    Gpu,
    /// Platform-native offscreen surface.
    Offscreen,
}

impl SurfaceKind {
    /// All kinds, in a stable order.
    pub const ALL: [SurfaceKind; 3] = [Self::Raster, Self::Gpu, Self::Offscreen];

    /// Return `true` for kinds whose pixels live in CPU memory.
    pub fn is_cpu(self) -> bool {
        matches!(self, Self::Raster | Self::Offscreen)
    }
}

impl std::fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Raster => "raster",
            Self::Gpu => "gpu",
            Self::Offscreen => "offscreen",
        })
    }
}

/// How a copy between two surfaces was carried out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyPath {
    /// Surface-to-surface copy supported by the pairing.
    Direct,
    /// Read back into a [`PixelBuffer`] and uploaded to the destination.
    PixelBuffer,
}

/// Capability contract each backend variant implements.
///
/// Callers go through [`BackendSurface`], which validates bounds and lifecycle first.
pub trait SurfaceOps {
    /// Dimensions fixed at creation.
    fn size(&self) -> Size;

    /// Return `true` while a backend handle is held.
    fn is_materialized(&self) -> bool;

    /// Read one pixel.
    fn get_pixel(&mut self, env: &mut Backends, x: u32, y: u32) -> EngineResult<Rgba8Premul>;

    /// Write one pixel.
    fn set_pixel(
        &mut self,
        env: &mut Backends,
        x: u32,
        y: u32,
        px: Rgba8Premul,
    ) -> EngineResult<()>;

    /// Fill the whole surface.
    fn fill(&mut self, env: &mut Backends, px: Rgba8Premul) -> EngineResult<()>;

    /// Replace the whole surface with `buf`.
    fn load_pixels(&mut self, env: &mut Backends, buf: &PixelBuffer) -> EngineResult<()>;

    /// Read back the whole surface.
    fn read_pixels(&mut self, env: &mut Backends) -> EngineResult<PixelBuffer>;

    /// Return `true` when the content can be read back without allocating a backend handle.
    fn content_reachable(&self, _env: &Backends) -> bool {
        self.is_materialized()
    }

    /// CPU-resident bytes for direct copies. `None` for GPU surfaces; `Some(None)` when a CPU
    /// surface has not materialized yet (its content is transparent).
    fn cpu_bytes(&self) -> Option<Option<&[u8]>> {
        None
    }

    /// Overwrite from another surface's CPU bytes. Returns `false` when this variant cannot
    /// take a direct copy.
    fn copy_direct(&mut self, _src: Option<&[u8]>) -> EngineResult<bool> {
        Ok(false)
    }

    /// Drop the backend handle; the next operation re-materializes it.
    fn release_backend(&mut self, env: &mut Backends);

    /// Reclaim memory and drop the backend handle for good.
    fn dispose_backend(&mut self, env: &mut Backends);
}

/// Variant selected when the surface is created.
pub enum SurfaceVariant {
    /// CPU raster canvas.
    Raster(raster::RasterSurface),
    /// GPU texture.
    Gpu(gpu::GpuSurface),
    /// Offscreen surface.
    Offscreen(offscreen::OffscreenSurface),
}

/// A disposable backend surface bound to one image handle.
pub struct BackendSurface {
    handle: String,
    kind: SurfaceKind,
    variant: SurfaceVariant,
    disposed: bool,
}

impl BackendSurface {
    /// Create a surface of `kind` for image `handle`. Nothing is allocated until first use.
    pub fn create(kind: SurfaceKind, handle: &str, size: Size) -> EngineResult<Self> {
        let size = Size::validated(size.width, size.height)?;
        let variant = match kind {
            SurfaceKind::Raster => SurfaceVariant::Raster(raster::RasterSurface::new(size)?),
            SurfaceKind::Gpu => SurfaceVariant::Gpu(gpu::GpuSurface::new(size)),
            SurfaceKind::Offscreen => {
                SurfaceVariant::Offscreen(offscreen::OffscreenSurface::new(size)?)
            }
        };
        Ok(Self {
            handle: handle.to_string(),
            kind,
            variant,
            disposed: false,
        })
    }

    /// Backend kind.
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    /// Owning image handle.
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Surface dimensions.
    pub fn size(&self) -> Size {
        self.ops().size()
    }

    /// Return `true` once disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Return `true` while a backend handle is held.
    pub fn is_materialized(&self) -> bool {
        !self.disposed && self.ops().is_materialized()
    }

    /// Return `true` when the content survives in a backend handle that can be read without
    /// allocating. A GPU texture whose context was revoked or recycled is unreachable.
    pub fn content_reachable(&self, env: &Backends) -> bool {
        !self.disposed && self.ops().content_reachable(env)
    }

    fn ops(&self) -> &dyn SurfaceOps {
        match &self.variant {
            SurfaceVariant::Raster(s) => s,
            SurfaceVariant::Gpu(s) => s,
            SurfaceVariant::Offscreen(s) => s,
        }
    }

    fn ops_mut(&mut self) -> &mut dyn SurfaceOps {
        match &mut self.variant {
            SurfaceVariant::Raster(s) => s,
            SurfaceVariant::Gpu(s) => s,
            SurfaceVariant::Offscreen(s) => s,
        }
    }

    fn live(&mut self) -> EngineResult<&mut dyn SurfaceOps> {
        if self.disposed {
            return Err(EngineError::invalid_state(format!(
                "{} surface of '{}' is disposed",
                self.kind, self.handle
            )));
        }
        Ok(self.ops_mut())
    }

    /// Read one pixel.
    pub fn get_pixel(&mut self, env: &mut Backends, x: u32, y: u32) -> EngineResult<Rgba8Premul> {
        let ops = self.live()?;
        pixel_offset(ops.size(), x, y)?;
        ops.get_pixel(env, x, y)
    }

    /// Write one pixel.
    pub fn set_pixel(
        &mut self,
        env: &mut Backends,
        x: u32,
        y: u32,
        px: Rgba8Premul,
    ) -> EngineResult<()> {
        let ops = self.live()?;
        pixel_offset(ops.size(), x, y)?;
        ops.set_pixel(env, x, y, px)
    }

    /// Fill with one color.
    pub fn fill(&mut self, env: &mut Backends, px: Rgba8Premul) -> EngineResult<()> {
        self.live()?.fill(env, px)
    }

    /// Replace contents with `buf`, which must match the surface size.
    pub fn load_pixels(&mut self, env: &mut Backends, buf: &PixelBuffer) -> EngineResult<()> {
        let ops = self.live()?;
        if buf.size() != ops.size() {
            return Err(EngineError::dimension(format!(
                "cannot load {} pixels into {} surface",
                buf.size(),
                ops.size()
            )));
        }
        ops.load_pixels(env, buf)
    }

    /// Read back the whole surface.
    pub fn read_pixels(&mut self, env: &mut Backends) -> EngineResult<PixelBuffer> {
        self.live()?.read_pixels(env)
    }

    /// Copy `src` into this surface.
    ///
    /// CPU pairings copy directly; anything involving the GPU reads back into a
    /// [`PixelBuffer`] and uploads it.
    pub fn copy_from(
        &mut self,
        env: &mut Backends,
        src: &mut BackendSurface,
    ) -> EngineResult<CopyPath> {
        let dst_size = self.live()?.size();
        let src_size = src.live()?.size();
        if dst_size != src_size {
            return Err(EngineError::dimension(format!(
                "copy size mismatch: {src_size} into {dst_size}"
            )));
        }

        if let Some(bytes) = src.ops().cpu_bytes() {
            let dst = self.ops_mut();
            if dst.copy_direct(bytes)? {
                return Ok(CopyPath::Direct);
            }
        }

        let buf = src.read_pixels(env)?;
        self.load_pixels(env, &buf)?;
        Ok(CopyPath::PixelBuffer)
    }

    /// Reclaim memory and drop the backend handle. A second call is an invalid-state error.
    pub fn dispose(&mut self, env: &mut Backends) -> EngineResult<()> {
        if self.disposed {
            return Err(EngineError::invalid_state(format!(
                "{} surface of '{}' is already disposed",
                self.kind, self.handle
            )));
        }
        self.ops_mut().dispose_backend(env);
        self.disposed = true;
        tracing::debug!(handle = %self.handle, kind = %self.kind, "surface disposed");
        Ok(())
    }
}

impl ReleaseResources for BackendSurface {
    type Env<'a> = &'a mut Backends;

    fn release_resources(&mut self, env: Self::Env<'_>, _flags: ReleaseFlags) -> EngineResult<()> {
        // Surfaces own no children: both flags release the backend handle.
        self.live()?.release_backend(env);
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/unit/surface.rs"]
mod tests;
