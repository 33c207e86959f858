//! Swap chains and frame buffers.
//!
//! A [`SwapChain`] wraps a presentable surface together with its depth
//! buffer and optional multisampled color buffer. A [`FrameBuffer`] is
//! either a window target (owning a swap chain and a dense index into the
//! window-tracking table) or an off-screen set of texture attachments.

use crate::backend::{GpuResource, GpuSurface, GpuTexture, GpuTextureView, RenderBackend, SurfaceTarget, TextureViewDesc};
use crate::error::RenderError;
use crate::handle::HandlePool;
use crate::pipeline::TargetFormats;
use crate::resources::texture::Texture;
use crate::resources::TextureHandle;
use crate::types::texture::{TextureDescriptor, TextureDimension, TextureFormat, TextureUsage};

/// Marker for frame buffers that are not window targets.
pub const NO_DENSE_INDEX: u16 = u16::MAX;

/// A presentable surface plus its backing depth/MSAA textures.
pub struct SwapChain {
    surface: GpuSurface,
    pub width: u32,
    pub height: u32,
    pub color_format: TextureFormat,
    pub depth_format: TextureFormat,
    pub sample_count: u32,
    pub vsync: bool,
    depth: Option<(GpuTexture, GpuTextureView)>,
    msaa_color: Option<(GpuTexture, GpuTextureView)>,
    current: Option<GpuTextureView>,
}

impl SwapChain {
    /// Create and configure a swap chain on a platform surface.
    pub fn new(
        backend: &dyn RenderBackend,
        target: SurfaceTarget,
        width: u32,
        height: u32,
        sample_count: u32,
        vsync: bool,
    ) -> Result<Self, RenderError> {
        let surface = backend.create_surface(target)?;
        let mut chain = Self {
            surface,
            width: 0,
            height: 0,
            color_format: TextureFormat::Bgra8,
            depth_format: TextureFormat::D24S8,
            sample_count: sample_count.max(1),
            vsync,
            depth: None,
            msaa_color: None,
            current: None,
        };
        chain.resize(backend, width, height)?;
        Ok(chain)
    }

    /// Reconfigure the surface and rebuild the depth/MSAA back buffers.
    ///
    /// The old back buffers are returned for deferred release; in-flight
    /// frames may still reference them.
    pub fn resize(
        &mut self,
        backend: &dyn RenderBackend,
        width: u32,
        height: u32,
    ) -> Result<Vec<GpuResource>, RenderError> {
        self.width = width;
        self.height = height;
        backend.configure_surface(&self.surface, width, height, self.color_format, self.vsync);

        let mut released = Vec::new();
        if let Some((texture, _)) = self.depth.take() {
            released.push(GpuResource::Texture(texture));
        }
        if let Some((texture, _)) = self.msaa_color.take() {
            released.push(GpuResource::Texture(texture));
        }

        let depth_desc = TextureDescriptor {
            label: Some("backbuffer_depth".to_string()),
            width,
            height,
            depth: 1,
            mip_count: 1,
            layer_count: 1,
            sample_count: self.sample_count,
            dimension: TextureDimension::D2,
            format: self.depth_format,
            usage: TextureUsage::RENDER_ATTACHMENT,
        };
        let depth = backend.create_texture(&depth_desc)?;
        let depth_view = backend.create_texture_view(&depth, &TextureViewDesc::default());
        self.depth = Some((depth, depth_view));

        if self.sample_count > 1 {
            let msaa_desc = TextureDescriptor {
                label: Some("backbuffer_msaa".to_string()),
                format: self.color_format,
                ..depth_desc
            };
            let msaa = backend.create_texture(&msaa_desc)?;
            let msaa_view = backend.create_texture_view(&msaa, &TextureViewDesc::default());
            self.msaa_color = Some((msaa, msaa_view));
        }

        log::trace!(
            "swap chain resized to {width}x{height}, {}x samples",
            self.sample_count
        );
        Ok(released)
    }

    /// Attachment formats for pipelines targeting this chain.
    pub fn target_formats(&self) -> TargetFormats {
        TargetFormats::new(
            vec![self.color_format],
            Some(self.depth_format),
            self.sample_count,
        )
    }

    /// The view drawn into this frame, acquiring one if necessary.
    pub fn acquire(
        &mut self,
        backend: &mut dyn RenderBackend,
    ) -> Result<GpuTextureView, RenderError> {
        if self.current.is_none() {
            self.current = Some(backend.acquire_surface_view(&self.surface)?);
        }
        match &self.current {
            Some(view) => Ok(view.clone()),
            None => Err(RenderError::SurfaceLost),
        }
    }

    /// Whether a frame was acquired and not yet presented.
    pub fn has_pending_frame(&self) -> bool {
        self.current.is_some()
    }

    /// (color view, resolve view) for the render pass: with MSAA the pass
    /// renders into the multisampled buffer and resolves to the surface.
    pub fn color_attachment(
        &mut self,
        backend: &mut dyn RenderBackend,
    ) -> Result<(GpuTextureView, Option<GpuTextureView>), RenderError> {
        let surface_view = self.acquire(backend)?;
        match &self.msaa_color {
            Some((_, msaa_view)) => Ok((msaa_view.clone(), Some(surface_view))),
            None => Ok((surface_view, None)),
        }
    }

    pub fn depth_view(&self) -> Option<GpuTextureView> {
        self.depth.as_ref().map(|(_, view)| view.clone())
    }

    /// Present the acquired frame, if any.
    pub fn present(&mut self, backend: &mut dyn RenderBackend) {
        if self.current.take().is_some() {
            backend.present(&self.surface);
        }
    }

    fn into_released(self) -> Vec<GpuResource> {
        let mut out = Vec::new();
        if let Some((texture, _)) = self.depth {
            out.push(GpuResource::Texture(texture));
        }
        if let Some((texture, _)) = self.msaa_color {
            out.push(GpuResource::Texture(texture));
        }
        out
    }
}

/// One attachment of an off-screen frame buffer.
#[derive(Debug, Clone, Copy)]
pub struct Attachment {
    pub texture: TextureHandle,
    pub mip: u8,
    pub layer: u16,
}

impl Attachment {
    pub fn new(texture: TextureHandle) -> Self {
        Self {
            texture,
            mip: 0,
            layer: 0,
        }
    }
}

/// A render target: window swap chain or off-screen attachment set.
pub struct FrameBuffer {
    pub swap_chain: Option<SwapChain>,
    pub width: u32,
    pub height: u32,
    /// Index into the window-tracking table; [`NO_DENSE_INDEX`] for
    /// off-screen frame buffers.
    pub dense_index: u16,
    pub colors: Vec<Attachment>,
    pub depth: Option<Attachment>,
    pub formats: TargetFormats,
}

impl FrameBuffer {
    /// An off-screen frame buffer over existing texture attachments.
    ///
    /// Attachments split into colors and depth by their resolved format;
    /// the frame buffer wraps them without taking ownership.
    pub fn with_attachments(
        textures: &HandlePool<Texture>,
        attachments: &[Attachment],
    ) -> Result<Self, RenderError> {
        let mut colors = Vec::new();
        let mut depth = None;
        let mut width = 0;
        let mut height = 0;
        let mut color_formats = Vec::new();
        let mut depth_format = None;
        let mut sample_count = 1;

        for attachment in attachments {
            let Some(texture) = textures.get(attachment.texture) else {
                return Err(RenderError::InvalidHandle);
            };
            if width == 0 {
                width = (texture.width >> attachment.mip).max(1);
                height = (texture.height >> attachment.mip).max(1);
            }
            if texture.sample_count > 1 {
                sample_count = texture.sample_count;
            }
            if texture.format.is_depth() {
                depth_format = Some(texture.format);
                depth = Some(*attachment);
            } else {
                color_formats.push(texture.format);
                colors.push(*attachment);
            }
        }

        Ok(Self {
            swap_chain: None,
            width,
            height,
            dense_index: NO_DENSE_INDEX,
            colors,
            depth,
            formats: TargetFormats::new(color_formats, depth_format, sample_count),
        })
    }

    /// A window frame buffer owning a swap chain.
    pub fn with_swap_chain(swap_chain: SwapChain, dense_index: u16) -> Self {
        let formats = swap_chain.target_formats();
        Self {
            width: swap_chain.width,
            height: swap_chain.height,
            dense_index,
            colors: Vec::new(),
            depth: None,
            formats,
            swap_chain: Some(swap_chain),
        }
    }

    pub fn is_window(&self) -> bool {
        self.swap_chain.is_some()
    }

    /// Tear down, returning the dense window index and the device objects
    /// to hand to the deferred-release ring.
    pub fn into_released(self) -> (u16, Vec<GpuResource>) {
        let dense = self.dense_index;
        let released = self
            .swap_chain
            .map(SwapChain::into_released)
            .unwrap_or_default();
        (dense, released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NullBackend, RenderBackend, SurfaceTarget};
    use crate::resources::sampler_cache::SamplerCache;
    use crate::resources::texture::TextureImage;
    use crate::submit::queue::CommandQueue;
    use crate::types::texture::TextureFlags;

    fn make_target(
        backend: &mut NullBackend,
        cmd: &mut CommandQueue,
        samplers: &mut SamplerCache,
        pool: &mut HandlePool<Texture>,
        format: TextureFormat,
    ) -> TextureHandle {
        let texture = Texture::create(
            backend,
            cmd,
            samplers,
            &TextureImage::target(128, 128, format),
            TextureFlags::default().with_render_target(),
            0,
        )
        .unwrap();
        pool.insert(texture).unwrap()
    }

    #[test]
    fn test_swap_chain_msaa_buffers() {
        let backend = NullBackend::new();
        let chain = SwapChain::new(&backend, SurfaceTarget::Headless, 800, 600, 4, true).unwrap();
        assert_eq!(chain.width, 800);
        assert!(chain.msaa_color.is_some());
        assert!(chain.depth.is_some());
        let formats = chain.target_formats();
        assert_eq!(formats.colors, vec![TextureFormat::Bgra8]);
        assert_eq!(formats.depth, Some(TextureFormat::D24S8));
        assert_eq!(formats.sample_count, 4);
    }

    #[test]
    fn test_resize_returns_old_buffers() {
        let backend = NullBackend::new();
        let mut chain =
            SwapChain::new(&backend, SurfaceTarget::Headless, 800, 600, 1, true).unwrap();
        let released = chain.resize(&backend, 1024, 768).unwrap();
        assert_eq!(released.len(), 1); // depth only, no MSAA
        assert_eq!(chain.width, 1024);
    }

    #[test]
    fn test_acquire_caches_until_present() {
        let mut backend = NullBackend::new();
        let mut chain =
            SwapChain::new(&backend, SurfaceTarget::Headless, 64, 64, 1, false).unwrap();

        chain.acquire(&mut backend).unwrap();
        chain.acquire(&mut backend).unwrap();
        assert!(chain.has_pending_frame());

        chain.present(&mut backend);
        assert!(!chain.has_pending_frame());
        assert_eq!(backend.stats().presents, 1);

        // Presenting again without an acquired frame is a no-op.
        chain.present(&mut backend);
        assert_eq!(backend.stats().presents, 1);
    }

    #[test]
    fn test_offscreen_framebuffer_classifies_attachments() {
        let mut backend = NullBackend::new();
        let mut cmd = CommandQueue::new(3);
        let mut samplers = SamplerCache::new();
        let mut pool: HandlePool<Texture> = HandlePool::new(16, "texture");

        backend.begin_encoder();
        let color0 = make_target(&mut backend, &mut cmd, &mut samplers, &mut pool, TextureFormat::Rgba8);
        let color1 = make_target(&mut backend, &mut cmd, &mut samplers, &mut pool, TextureFormat::Bgra8);
        let depth = make_target(&mut backend, &mut cmd, &mut samplers, &mut pool, TextureFormat::D32F);

        let fb = FrameBuffer::with_attachments(
            &pool,
            &[
                Attachment::new(color0),
                Attachment::new(depth),
                Attachment::new(color1),
            ],
        )
        .unwrap();

        assert_eq!(fb.colors.len(), 2);
        assert!(fb.depth.is_some());
        assert_eq!(fb.width, 128);
        assert_eq!(
            fb.formats.colors,
            vec![TextureFormat::Rgba8, TextureFormat::Bgra8]
        );
        assert_eq!(fb.formats.depth, Some(TextureFormat::D32F));
        assert!(!fb.is_window());
        assert_eq!(fb.dense_index, NO_DENSE_INDEX);
    }

    #[test]
    fn test_framebuffer_format_hash_distinguishes() {
        let mut backend = NullBackend::new();
        let mut cmd = CommandQueue::new(3);
        let mut samplers = SamplerCache::new();
        let mut pool: HandlePool<Texture> = HandlePool::new(16, "texture");

        backend.begin_encoder();
        let rgba = make_target(&mut backend, &mut cmd, &mut samplers, &mut pool, TextureFormat::Rgba8);
        let bgra = make_target(&mut backend, &mut cmd, &mut samplers, &mut pool, TextureFormat::Bgra8);

        let fb_a = FrameBuffer::with_attachments(&pool, &[Attachment::new(rgba)]).unwrap();
        let fb_b = FrameBuffer::with_attachments(&pool, &[Attachment::new(bgra)]).unwrap();
        assert_ne!(fb_a.formats.hash, fb_b.formats.hash);
    }

    #[test]
    fn test_dead_attachment_rejected() {
        let pool: HandlePool<Texture> = HandlePool::new(16, "texture");
        let dead = TextureHandle::new(3, 7);
        assert!(matches!(
            FrameBuffer::with_attachments(&pool, &[Attachment::new(dead)]),
            Err(RenderError::InvalidHandle)
        ));
    }
}
