use resvg::tiny_skia;

use crate::{
    backend::Backends,
    foundation::core::{Rgba8Premul, Size},
    foundation::error::{EngineError, EngineResult},
    surface::{PixelBuffer, SurfaceOps, fill_rgba8, pixel_offset},
};

/// Platform-native offscreen surface backed by a `tiny_skia` pixmap.
pub struct OffscreenSurface {
    size: Size,
    pixmap: Option<tiny_skia::Pixmap>,
}

impl OffscreenSurface {
    /// Validate dimensions; the pixmap is allocated on first write.
    pub fn new(size: Size) -> EngineResult<Self> {
        // Check the backend limit up front so creation fails instead of the first draw.
        if tiny_skia::IntSize::from_wh(size.width, size.height).is_none() {
            return Err(EngineError::dimension(format!(
                "offscreen surface cannot be {size}"
            )));
        }
        Ok(Self { size, pixmap: None })
    }

    fn pixmap_mut(&mut self) -> EngineResult<&mut tiny_skia::Pixmap> {
        if self.pixmap.is_none() {
            let p = tiny_skia::Pixmap::new(self.size.width, self.size.height).ok_or_else(|| {
                EngineError::exhausted(format!("offscreen allocation of {} failed", self.size))
            })?;
            self.pixmap = Some(p);
        }
        self.pixmap
            .as_mut()
            .ok_or_else(|| EngineError::invalid_state("offscreen pixmap missing"))
    }
}

impl SurfaceOps for OffscreenSurface {
    fn size(&self) -> Size {
        self.size
    }

    fn is_materialized(&self) -> bool {
        self.pixmap.is_some()
    }

    fn get_pixel(&mut self, _env: &mut Backends, x: u32, y: u32) -> EngineResult<Rgba8Premul> {
        let i = pixel_offset(self.size, x, y)?;
        let Some(pixmap) = self.pixmap.as_ref() else {
            return Ok(Rgba8Premul::transparent());
        };
        let data = pixmap.data();
        Ok(Rgba8Premul::from_array([
            data[i],
            data[i + 1],
            data[i + 2],
            data[i + 3],
        ]))
    }

    fn set_pixel(
        &mut self,
        _env: &mut Backends,
        x: u32,
        y: u32,
        px: Rgba8Premul,
    ) -> EngineResult<()> {
        let i = pixel_offset(self.size, x, y)?;
        self.pixmap_mut()?.data_mut()[i..i + 4].copy_from_slice(&px.to_array());
        Ok(())
    }

    fn fill(&mut self, _env: &mut Backends, px: Rgba8Premul) -> EngineResult<()> {
        fill_rgba8(self.pixmap_mut()?.data_mut(), px);
        Ok(())
    }

    fn load_pixels(&mut self, _env: &mut Backends, buf: &PixelBuffer) -> EngineResult<()> {
        self.pixmap_mut()?.data_mut().copy_from_slice(buf.as_bytes());
        Ok(())
    }

    fn read_pixels(&mut self, _env: &mut Backends) -> EngineResult<PixelBuffer> {
        match self.pixmap.as_ref() {
            Some(p) => PixelBuffer::from_raw(self.size, p.data().to_vec()),
            None => Ok(PixelBuffer::new(self.size)),
        }
    }

    fn cpu_bytes(&self) -> Option<Option<&[u8]>> {
        Some(self.pixmap.as_ref().map(|p| p.data()))
    }

    fn copy_direct(&mut self, src: Option<&[u8]>) -> EngineResult<bool> {
        let dst = self.pixmap_mut()?.data_mut();
        match src {
            Some(bytes) => dst.copy_from_slice(bytes),
            None => fill_rgba8(dst, Rgba8Premul::transparent()),
        }
        Ok(true)
    }

    fn release_backend(&mut self, _env: &mut Backends) {
        self.pixmap = None;
    }

    fn dispose_backend(&mut self, _env: &mut Backends) {
        if let Some(p) = self.pixmap.as_mut() {
            // Zero the store first; the platform may keep the allocation around after drop.
            p.data_mut().fill(0);
        }
        self.pixmap = None;
    }
}
