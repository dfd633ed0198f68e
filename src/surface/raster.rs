use crate::{
    backend::Backends,
    foundation::core::{Rgba8Premul, Size},
    foundation::error::{EngineError, EngineResult},
    surface::{PixelBuffer, SurfaceOps, fill_rgba8, pixel_offset},
};

/// Convert dimensions to the `u16` range `vello_cpu` pixmaps support.
pub fn pixmap_dims(size: Size) -> EngineResult<(u16, u16)> {
    let w: u16 = size
        .width
        .try_into()
        .map_err(|_| EngineError::dimension("surface width exceeds u16"))?;
    let h: u16 = size
        .height
        .try_into()
        .map_err(|_| EngineError::dimension("surface height exceeds u16"))?;
    Ok((w, h))
}

/// 2D raster canvas backed by a `vello_cpu` pixmap.
pub struct RasterSurface {
    size: Size,
    dims: (u16, u16),
    pixmap: Option<vello_cpu::Pixmap>,
}

impl RasterSurface {
    /// Validate dimensions; the pixmap is allocated on first write.
    pub fn new(size: Size) -> EngineResult<Self> {
        Ok(Self {
            size,
            dims: pixmap_dims(size)?,
            pixmap: None,
        })
    }

    fn pixmap_mut(&mut self) -> &mut vello_cpu::Pixmap {
        let (w, h) = self.dims;
        self.pixmap
            .get_or_insert_with(|| vello_cpu::Pixmap::new(w, h))
    }
}

impl SurfaceOps for RasterSurface {
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
        let data = pixmap.data_as_u8_slice();
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
        self.pixmap_mut().data_as_u8_slice_mut()[i..i + 4].copy_from_slice(&px.to_array());
        Ok(())
    }

    fn fill(&mut self, _env: &mut Backends, px: Rgba8Premul) -> EngineResult<()> {
        fill_rgba8(self.pixmap_mut().data_as_u8_slice_mut(), px);
        Ok(())
    }

    fn load_pixels(&mut self, _env: &mut Backends, buf: &PixelBuffer) -> EngineResult<()> {
        self.pixmap_mut()
            .data_as_u8_slice_mut()
            .copy_from_slice(buf.as_bytes());
        Ok(())
    }

    fn read_pixels(&mut self, _env: &mut Backends) -> EngineResult<PixelBuffer> {
        match self.pixmap.as_ref() {
            Some(p) => PixelBuffer::from_raw(self.size, p.data_as_u8_slice().to_vec()),
            None => Ok(PixelBuffer::new(self.size)),
        }
    }

    fn cpu_bytes(&self) -> Option<Option<&[u8]>> {
        Some(self.pixmap.as_ref().map(|p| p.data_as_u8_slice()))
    }

    fn copy_direct(&mut self, src: Option<&[u8]>) -> EngineResult<bool> {
        match src {
            Some(bytes) => self.pixmap_mut().data_as_u8_slice_mut().copy_from_slice(bytes),
            None => fill_rgba8(
                self.pixmap_mut().data_as_u8_slice_mut(),
                Rgba8Premul::transparent(),
            ),
        }
        Ok(true)
    }

    fn release_backend(&mut self, _env: &mut Backends) {
        self.pixmap = None;
    }

    fn dispose_backend(&mut self, _env: &mut Backends) {
        // Shrink before letting go so nothing keeps a full-size store alive.
        self.dims = (0, 0);
        self.pixmap = None;
    }
}
