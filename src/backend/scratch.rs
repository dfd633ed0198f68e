use std::io::Cursor;

use anyhow::Context;

use crate::{
    foundation::core::Size,
    foundation::error::{EngineError, EngineResult},
    resource::pool::Poolable,
    surface::{PixelBuffer, raster::pixmap_dims},
};

/// Pooled 2D canvas used to stage encode/decode work.
///
/// Platforms encode and decode through a canvas rather than a raw buffer, so image loads are
/// drawn into this canvas and read back, and encodes draw the image into it first.
pub struct ScratchCanvas {
    pixmap: Option<vello_cpu::Pixmap>,
    size: Size,
}

impl Default for ScratchCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl ScratchCanvas {
    /// Create an unallocated canvas.
    pub fn new() -> Self {
        Self {
            pixmap: None,
            size: Size::new(0, 0),
        }
    }

    /// Current canvas size; `0x0` when unallocated.
    pub fn size(&self) -> Size {
        self.size
    }

    fn resize(&mut self, size: Size) -> EngineResult<&mut vello_cpu::Pixmap> {
        if self.size != size || self.pixmap.is_none() {
            let (w, h) = pixmap_dims(size)?;
            self.pixmap = Some(vello_cpu::Pixmap::new(w, h));
            self.size = size;
        }
        self.pixmap
            .as_mut()
            .ok_or_else(|| EngineError::invalid_state("scratch canvas not allocated"))
    }

    /// Draw a pixel buffer onto the canvas, resizing it to match.
    pub fn put_pixels(&mut self, buf: &PixelBuffer) -> EngineResult<()> {
        let pixmap = self.resize(buf.size())?;
        pixmap.data_as_u8_slice_mut().copy_from_slice(buf.as_bytes());
        Ok(())
    }

    /// Read back the whole canvas.
    pub fn get_pixels(&self) -> EngineResult<PixelBuffer> {
        let pixmap = self
            .pixmap
            .as_ref()
            .ok_or_else(|| EngineError::invalid_state("scratch canvas not allocated"))?;
        PixelBuffer::from_raw(self.size, pixmap.data_as_u8_slice().to_vec())
    }

    /// Decode encoded image bytes through the canvas into premultiplied pixels.
    pub fn decode(&mut self, bytes: &[u8]) -> EngineResult<PixelBuffer> {
        let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
        let rgba = dyn_img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let size = Size::validated(width, height)?;

        let mut raw = rgba.into_raw();
        premultiply_rgba8_in_place(&mut raw);
        let buf = PixelBuffer::from_raw(size, raw)?;
        self.put_pixels(&buf)?;
        self.get_pixels()
    }

    /// Draw `buf` and encode the canvas as PNG (straight alpha).
    pub fn encode_png(&mut self, buf: &PixelBuffer) -> EngineResult<Vec<u8>> {
        self.put_pixels(buf)?;
        let mut straight = self.get_pixels()?.into_raw();
        unpremultiply_rgba8_in_place(&mut straight);

        let size = self.size;
        let img = image::RgbaImage::from_raw(size.width, size.height, straight)
            .ok_or_else(|| EngineError::dimension("encode buffer does not match canvas size"))?;
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .context("encode png")?;
        Ok(out)
    }
}

impl Poolable for ScratchCanvas {
    fn freeze(&mut self) -> bool {
        // Keep the handle but drop the backing store down to a single pixel.
        self.pixmap = Some(vello_cpu::Pixmap::new(1, 1));
        self.size = Size::new(1, 1);
        true
    }

    fn defrost(&mut self) -> bool {
        true
    }

    fn dispose(&mut self) {
        self.size = Size::new(0, 0);
        self.pixmap = None;
    }
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 || a == 255 {
            continue;
        }
        px[0] = ((px[0] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[1] = ((px[1] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[2] = ((px[2] as u16 * 255 + a / 2) / a).min(255) as u8;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/backend/scratch.rs"]
mod tests;
