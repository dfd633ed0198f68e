use crate::{
    backend::{
        Backends,
        gpu::{GpuContext, TextureId},
    },
    foundation::core::{ResourceId, Rgba8Premul, Size},
    foundation::error::{EngineError, EngineResult},
    resource::pool::PoolLease,
    surface::{PixelBuffer, SurfaceOps},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TextureBinding {
    context: ResourceId,
    texture: TextureId,
}

/// GPU surface: a texture living in the engine's pooled GPU context.
///
/// The context is leased per operation and handed back right after, so it is frozen (and
/// revocable, or recyclable by another engine) between calls. If the context was revoked or recycled in the meantime the texture
/// is gone with it and re-materializes transparent.
pub struct GpuSurface {
    size: Size,
    binding: Option<TextureBinding>,
}

impl GpuSurface {
    /// Create an unmaterialized surface.
    pub fn new(size: Size) -> Self {
        Self {
            size,
            binding: None,
        }
    }

    fn gl_row(&self, y: u32) -> u32 {
        self.size.height - 1 - y
    }

    fn bind(&mut self, context: ResourceId, ctx: &mut GpuContext) -> EngineResult<TextureId> {
        if let Some(b) = self.binding
            && b.context == context
            && ctx.has_texture(b.texture)
        {
            return Ok(b.texture);
        }
        if self.binding.is_some() {
            tracing::debug!(%context, "gpu texture lost with its context; re-materializing");
        }
        let texture = ctx.create_texture(self.size)?;
        self.binding = Some(TextureBinding { context, texture });
        Ok(texture)
    }

    /// Run `op` against this surface's texture inside a leased context.
    ///
    /// A context found lost mid-operation is discarded from the pool and the operation is retried
    /// once on a fresh one. Failures to obtain a context at all are not retried; the pool already
    /// made its single recreation attempt.
    fn with_texture<T>(
        &mut self,
        env: &mut Backends,
        mut op: impl FnMut(&mut GpuContext, TextureId) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let lease = env.lease_gpu()?;
        match self.run_leased(env, lease, &mut op) {
            Err(EngineError::ContextInvalidated(msg)) => {
                tracing::warn!(error = %msg, "gpu context lost during operation; retrying");
                let lease = env.lease_gpu()?;
                self.run_leased(env, lease, &mut op)
            }
            other => other,
        }
    }

    fn run_leased<T>(
        &mut self,
        env: &mut Backends,
        lease: PoolLease<GpuContext>,
        op: &mut impl FnMut(&mut GpuContext, TextureId) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let out = {
            let mut ctx = lease.borrow_mut();
            self.bind(lease.id(), &mut ctx)
                .and_then(|tex| op(&mut *ctx, tex))
        };
        if matches!(out, Err(EngineError::ContextInvalidated(_))) {
            self.binding = None;
            env.discard_gpu(lease);
        } else {
            env.return_gpu(lease);
        }
        out
    }

    fn unbind(&mut self, env: &mut Backends) {
        let Some(b) = self.binding.take() else {
            return;
        };
        // Only the registered context can still hold the texture; a replaced one took it along.
        env.with_registered_gpu(b.context, |ctx| ctx.delete_texture(b.texture));
    }
}

impl SurfaceOps for GpuSurface {
    fn size(&self) -> Size {
        self.size
    }

    fn is_materialized(&self) -> bool {
        self.binding.is_some()
    }

    fn content_reachable(&self, env: &Backends) -> bool {
        let Some(b) = self.binding else {
            return false;
        };
        env.with_registered_gpu(b.context, |ctx| ctx.has_texture(b.texture))
            .unwrap_or(false)
    }

    fn get_pixel(&mut self, env: &mut Backends, x: u32, y: u32) -> EngineResult<Rgba8Premul> {
        if self.binding.is_none() {
            return Ok(Rgba8Premul::transparent());
        }
        let gl_y = self.gl_row(y);
        self.with_texture(env, |ctx, tex| ctx.read_texel(tex, x, gl_y))
    }

    fn set_pixel(
        &mut self,
        env: &mut Backends,
        x: u32,
        y: u32,
        px: Rgba8Premul,
    ) -> EngineResult<()> {
        let gl_y = self.gl_row(y);
        self.with_texture(env, |ctx, tex| ctx.write_texel(tex, x, gl_y, px))
    }

    fn fill(&mut self, env: &mut Backends, px: Rgba8Premul) -> EngineResult<()> {
        self.with_texture(env, |ctx, tex| ctx.clear_texture(tex, px))
    }

    fn load_pixels(&mut self, env: &mut Backends, buf: &PixelBuffer) -> EngineResult<()> {
        let mut rows = buf.clone();
        rows.flip_rows();
        self.with_texture(env, |ctx, tex| ctx.upload(tex, rows.as_bytes()))
    }

    fn read_pixels(&mut self, env: &mut Backends) -> EngineResult<PixelBuffer> {
        if self.binding.is_none() {
            return Ok(PixelBuffer::new(self.size));
        }
        let raw = self.with_texture(env, |ctx, tex| ctx.read_pixels(tex))?;
        let mut buf = PixelBuffer::from_raw(self.size, raw)?;
        buf.flip_rows();
        Ok(buf)
    }

    fn release_backend(&mut self, env: &mut Backends) {
        self.unbind(env);
    }

    fn dispose_backend(&mut self, env: &mut Backends) {
        self.unbind(env);
    }
}
