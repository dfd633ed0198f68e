use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use crate::{
    foundation::core::{Rgba8Premul, Size},
    foundation::error::{EngineError, EngineResult},
    resource::pool::Poolable,
};

/// Live-context ceiling most browsers enforce for WebGL.
pub const DEFAULT_MAX_LIVE_CONTEXTS: usize = 16;

/// Platform-assigned identity of a GPU context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(
    /// Raw platform id.
    pub u64,
);

/// Context-local texture name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(
    /// Raw texture name.
    pub u32,
);

#[derive(Debug)]
struct PlatformState {
    max_live: usize,
    next_context: u64,
    live: HashSet<u64>,
    created_total: u64,
    revoked_total: u64,
}

/// The GPU side of the host platform.
///
/// Hands out contexts up to a hard live-context ceiling and may revoke any live context at any
/// time, the way browsers drop WebGL contexts under memory pressure. Cloning shares the platform.
#[derive(Clone, Debug)]
pub struct GpuPlatform {
    state: Rc<RefCell<PlatformState>>,
}

impl Default for GpuPlatform {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LIVE_CONTEXTS)
    }
}

impl GpuPlatform {
    /// Create a platform that allows at most `max_live_contexts` simultaneous contexts.
    pub fn new(max_live_contexts: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(PlatformState {
                max_live: max_live_contexts,
                next_context: 0,
                live: HashSet::new(),
                created_total: 0,
                revoked_total: 0,
            })),
        }
    }

    /// Create a context, failing with [`EngineError::ResourceExhausted`] at the ceiling.
    pub fn create_context(&self) -> EngineResult<GpuContext> {
        let mut st = self.state.borrow_mut();
        if st.live.len() >= st.max_live {
            return Err(EngineError::exhausted(format!(
                "gpu context ceiling reached ({} live)",
                st.max_live
            )));
        }
        let id = st.next_context;
        st.next_context += 1;
        st.live.insert(id);
        st.created_total += 1;
        drop(st);

        Ok(GpuContext {
            id: ContextId(id),
            platform: self.state.clone(),
            drawing_buffer: Size::new(1, 1),
            textures: HashMap::new(),
            next_texture: 1,
        })
    }

    /// Revoke a context out-of-band. Its textures become unreachable and its slot is freed.
    pub fn revoke(&self, id: ContextId) -> bool {
        let mut st = self.state.borrow_mut();
        let was_live = st.live.remove(&id.0);
        if was_live {
            st.revoked_total += 1;
            tracing::debug!(context = id.0, "gpu context revoked by platform");
        }
        was_live
    }

    /// Revoke every live context.
    pub fn revoke_all(&self) -> usize {
        let mut st = self.state.borrow_mut();
        let n = st.live.len();
        st.live.clear();
        st.revoked_total += n as u64;
        n
    }

    /// Number of contexts currently alive.
    pub fn live_contexts(&self) -> usize {
        self.state.borrow().live.len()
    }

    /// Ceiling on simultaneously live contexts.
    pub fn max_live_contexts(&self) -> usize {
        self.state.borrow().max_live
    }

    /// Contexts created over the platform's lifetime.
    pub fn created_total(&self) -> u64 {
        self.state.borrow().created_total
    }

    /// Contexts revoked by the platform over its lifetime.
    pub fn revoked_total(&self) -> u64 {
        self.state.borrow().revoked_total
    }
}

#[derive(Debug)]
struct Texture {
    size: Size,
    // GL row order: row 0 is the bottom of the image.
    data: Vec<u8>,
}

/// A GPU context with context-resident textures.
///
/// Texture rows are stored bottom-up, so callers working in top-down image space flip on upload
/// and readback.
#[derive(Debug)]
pub struct GpuContext {
    id: ContextId,
    platform: Rc<RefCell<PlatformState>>,
    drawing_buffer: Size,
    textures: HashMap<TextureId, Texture>,
    next_texture: u32,
}

impl GpuContext {
    /// Platform identity of this context.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Return `true` once the platform revoked the context or it was disposed.
    pub fn is_lost(&self) -> bool {
        !self.platform.borrow().live.contains(&self.id.0)
    }

    /// Current drawing-buffer size.
    pub fn drawing_buffer(&self) -> Size {
        self.drawing_buffer
    }

    /// Grow or shrink the drawing buffer.
    pub fn resize_drawing_buffer(&mut self, size: Size) -> EngineResult<()> {
        self.check_alive()?;
        self.drawing_buffer = size;
        Ok(())
    }

    /// Number of textures allocated in this context.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Return `true` when `tex` names a texture of this context.
    pub fn has_texture(&self, tex: TextureId) -> bool {
        !self.is_lost() && self.textures.contains_key(&tex)
    }

    /// Allocate a transparent texture.
    pub fn create_texture(&mut self, size: Size) -> EngineResult<TextureId> {
        self.check_alive()?;
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(
            id,
            Texture {
                size,
                data: vec![0; size.rgba_len()],
            },
        );
        Ok(id)
    }

    /// Free a texture. Unknown names are ignored, as GL does.
    pub fn delete_texture(&mut self, tex: TextureId) {
        self.textures.remove(&tex);
    }

    /// Replace the full contents of a texture with bottom-up RGBA8 rows.
    pub fn upload(&mut self, tex: TextureId, rows_bottom_up: &[u8]) -> EngineResult<()> {
        let t = self.texture_mut(tex)?;
        if rows_bottom_up.len() != t.data.len() {
            return Err(EngineError::dimension(format!(
                "texture upload expects {} bytes, got {}",
                t.data.len(),
                rows_bottom_up.len()
            )));
        }
        t.data.copy_from_slice(rows_bottom_up);
        Ok(())
    }

    /// Read back the whole texture as bottom-up RGBA8 rows.
    pub fn read_pixels(&self, tex: TextureId) -> EngineResult<Vec<u8>> {
        Ok(self.texture(tex)?.data.clone())
    }

    /// Read one texel. `gl_y` counts from the bottom row.
    pub fn read_texel(&self, tex: TextureId, x: u32, gl_y: u32) -> EngineResult<Rgba8Premul> {
        let t = self.texture(tex)?;
        let i = texel_offset(t.size, x, gl_y)?;
        Ok(Rgba8Premul::from_array([
            t.data[i],
            t.data[i + 1],
            t.data[i + 2],
            t.data[i + 3],
        ]))
    }

    /// Write one texel. `gl_y` counts from the bottom row.
    pub fn write_texel(
        &mut self,
        tex: TextureId,
        x: u32,
        gl_y: u32,
        px: Rgba8Premul,
    ) -> EngineResult<()> {
        let t = self.texture_mut(tex)?;
        let i = texel_offset(t.size, x, gl_y)?;
        t.data[i..i + 4].copy_from_slice(&px.to_array());
        Ok(())
    }

    /// Clear a texture to a solid color.
    pub fn clear_texture(&mut self, tex: TextureId, px: Rgba8Premul) -> EngineResult<()> {
        let t = self.texture_mut(tex)?;
        crate::surface::fill_rgba8(&mut t.data, px);
        Ok(())
    }

    fn check_alive(&self) -> EngineResult<()> {
        if self.is_lost() {
            return Err(EngineError::context_invalidated(format!(
                "gpu context {} is lost",
                self.id.0
            )));
        }
        Ok(())
    }

    fn texture(&self, tex: TextureId) -> EngineResult<&Texture> {
        self.check_alive()?;
        self.textures.get(&tex).ok_or_else(|| {
            EngineError::invalid_state(format!("texture {} does not exist", tex.0))
        })
    }

    fn texture_mut(&mut self, tex: TextureId) -> EngineResult<&mut Texture> {
        self.check_alive()?;
        self.textures.get_mut(&tex).ok_or_else(|| {
            EngineError::invalid_state(format!("texture {} does not exist", tex.0))
        })
    }

    fn lose(&mut self) {
        self.textures.clear();
        self.platform.borrow_mut().live.remove(&self.id.0);
    }
}

fn texel_offset(size: Size, x: u32, gl_y: u32) -> EngineResult<usize> {
    if !size.contains(x, gl_y) {
        return Err(EngineError::dimension(format!(
            "texel ({x},{gl_y}) outside {size} texture"
        )));
    }
    Ok(((gl_y as usize) * (size.width as usize) + (x as usize)) * 4)
}

impl Poolable for GpuContext {
    fn freeze(&mut self) -> bool {
        if self.is_lost() {
            return false;
        }
        // Textures stay resident; only the drawing buffer shrinks.
        self.drawing_buffer = Size::new(1, 1);
        true
    }

    fn defrost(&mut self) -> bool {
        !self.is_lost()
    }

    fn dispose(&mut self) {
        self.drawing_buffer = Size::new(0, 0);
        self.lose();
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        self.lose();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/backend/gpu.rs"]
mod tests;
