//! The renderer: device setup and the resource API.
//!
//! [`Renderer::init`] wires the backend, the primary swap chain, the
//! per-frame scratch arenas and the caches together; everything is passed
//! in explicitly, there is no global device state. The frame submission
//! path lives in [`crate::submit`].

use std::sync::Arc;

use crate::backend::{GpuQuerySet, GpuResource, RenderBackend, SurfaceTarget};
use crate::error::RenderError;
use crate::pipeline::PipelineCache;
use crate::resources::{
    Buffer, BufferHandle, FrameBufferHandle, PoolCapacities, Program, ProgramHandle,
    ResourcePool, SamplerCache, Shader, ShaderHandle, Texture, TextureHandle, TextureImage,
};
use crate::shader::{ShaderBlob, UniformType};
use crate::submit::queue::CommandQueue;
use crate::swapchain::{Attachment, FrameBuffer, SwapChain, NO_DENSE_INDEX};
use crate::types::buffer::BufferUsage;
use crate::types::common::Rect;
use crate::types::texture::TextureFlags;
use crate::types::vertex::VertexLayout;
use crate::uniforms::{ScratchBuffer, StagingUniforms, UniformHandle, UniformRegistry};
use crate::{MAX_OCCLUSION_QUERIES, MAX_VIEWS};

/// Renderer configuration.
#[derive(Debug, Clone)]
pub struct RendererInit {
    pub width: u32,
    pub height: u32,
    /// Bound on unretired submitted frames.
    pub frames_in_flight: usize,
    /// Scratch arena bytes per frame slot. Size for the peak per-frame
    /// uniform volume: draw count x aligned constant block sizes.
    pub scratch_size: u32,
    pub pools: PoolCapacities,
    pub uniform_capacity: usize,
    pub vsync: bool,
    /// Sample count of the primary swap chain.
    pub msaa_samples: u32,
    pub validation: bool,
    pub debug: bool,
}

impl Default for RendererInit {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frames_in_flight: 3,
            scratch_size: 512 * 1024,
            pools: PoolCapacities::default(),
            uniform_capacity: 512,
            vsync: true,
            msaa_samples: 1,
            validation: false,
            debug: false,
        }
    }
}

/// The backend-execution core: resource tables, caches, scratch arenas,
/// command queue and primary swap chain.
pub struct Renderer {
    pub(crate) backend: Box<dyn RenderBackend>,
    pub(crate) resources: ResourcePool,
    pub(crate) samplers: SamplerCache,
    pub(crate) pipelines: PipelineCache,
    pub(crate) registry: UniformRegistry,
    pub(crate) scratch: Vec<ScratchBuffer>,
    pub(crate) frame_slot: usize,
    pub(crate) cmd: CommandQueue,
    pub(crate) staging: StagingUniforms,
    pub(crate) main_target: FrameBuffer,
    /// Dense window table; slot 0 is the primary swap chain.
    pub(crate) windows: Vec<Option<FrameBufferHandle>>,
    pub(crate) query_set: GpuQuerySet,
    pub(crate) occlusion_used: u32,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl Renderer {
    /// Initialize against a backend and the platform window the primary
    /// swap chain presents to.
    ///
    /// # Errors
    ///
    /// Device or primary swap-chain failure is fatal; nothing is retried.
    pub fn init(
        init: RendererInit,
        backend: Box<dyn RenderBackend>,
        window: SurfaceTarget,
    ) -> Result<Self, RenderError> {
        let limits = backend.limits();
        log::info!(
            "initializing renderer on '{}' ({}x{}, {} frames in flight)",
            backend.name(),
            init.width,
            init.height,
            init.frames_in_flight,
        );

        let chain = SwapChain::new(
            backend.as_ref(),
            window,
            init.width,
            init.height,
            init.msaa_samples.min(limits.max_sample_count),
            init.vsync,
        )?;
        let main_target = FrameBuffer::with_swap_chain(chain, 0);

        let mut scratch = Vec::with_capacity(init.frames_in_flight);
        for slot in 0..init.frames_in_flight.max(1) {
            scratch.push(ScratchBuffer::new(
                backend.as_ref(),
                init.scratch_size,
                limits.min_uniform_offset_alignment,
                &format!("scratch_{slot}"),
            )?);
        }

        let query_set = backend.create_query_set(MAX_OCCLUSION_QUERIES as u32);

        // Slot 0 of the dense window table is the main target, tracked
        // separately.
        let windows = vec![None; MAX_VIEWS];

        Ok(Self {
            backend,
            resources: ResourcePool::new(init.pools),
            samplers: SamplerCache::new(),
            pipelines: PipelineCache::new(),
            registry: UniformRegistry::new(init.uniform_capacity),
            scratch,
            frame_slot: 0,
            cmd: CommandQueue::new(init.frames_in_flight),
            staging: StagingUniforms::new(4096),
            main_target,
            windows,
            query_set,
            occlusion_used: 0,
            width: init.width,
            height: init.height,
        })
    }

    /// Drain all in-flight frames and destroy everything.
    pub fn shutdown(mut self) {
        for buffer in self.resources.buffers.drain() {
            self.cmd.release(GpuResource::Buffer(buffer.gpu));
        }
        for texture in self.resources.textures.drain() {
            self.cmd.release_all(texture.into_released());
        }
        self.pipelines.invalidate();
        self.samplers.invalidate();
        for scratch in &mut self.scratch {
            scratch.reset();
        }
        self.cmd.finish(self.backend.as_mut(), true);
        log::info!("renderer shut down");
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Downcast access to the concrete backend.
    pub fn backend_as<T: 'static>(&self) -> Option<&T> {
        self.backend.as_any().downcast_ref::<T>()
    }

    pub fn pipeline_cache_len(&self) -> usize {
        self.pipelines.len()
    }

    /// Resources waiting on the deferred-release ring.
    pub fn pending_destruction_count(&self) -> usize {
        self.cmd.pending_release_count()
    }

    /// Resize the primary swap chain.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == self.width && height == self.height {
            return Ok(());
        }
        self.width = width;
        self.height = height;
        if let Some(chain) = self.main_target.swap_chain.as_mut() {
            let released = chain.resize(self.backend.as_ref(), width, height)?;
            self.cmd.release_all(released);
        }
        self.main_target.width = width;
        self.main_target.height = height;
        Ok(())
    }

    // --- buffers ---

    /// Create a static vertex buffer with its layout.
    pub fn create_vertex_buffer(
        &mut self,
        data: &[u8],
        layout: Arc<VertexLayout>,
    ) -> Result<BufferHandle, RenderError> {
        let buffer = Buffer::create(
            self.backend.as_ref(),
            data.len() as u32,
            Some(data),
            BufferUsage::VERTEX,
            Some(layout),
            "vertex",
        )?;
        self.resources.buffers.insert(buffer)
    }

    /// Create a vertex buffer without initial contents.
    pub fn create_dynamic_vertex_buffer(
        &mut self,
        size: u32,
        layout: Arc<VertexLayout>,
    ) -> Result<BufferHandle, RenderError> {
        let buffer = Buffer::create(
            self.backend.as_ref(),
            size,
            None,
            BufferUsage::VERTEX,
            Some(layout),
            "vertex_dynamic",
        )?;
        self.resources.buffers.insert(buffer)
    }

    /// Create a static index buffer.
    pub fn create_index_buffer(
        &mut self,
        data: &[u8],
        index32: bool,
    ) -> Result<BufferHandle, RenderError> {
        let mut usage = BufferUsage::INDEX;
        if index32 {
            usage |= BufferUsage::INDEX32;
        }
        let buffer = Buffer::create(
            self.backend.as_ref(),
            data.len() as u32,
            Some(data),
            usage,
            None,
            "index",
        )?;
        self.resources.buffers.insert(buffer)
    }

    /// Create an index buffer without initial contents.
    pub fn create_dynamic_index_buffer(
        &mut self,
        size: u32,
        index32: bool,
    ) -> Result<BufferHandle, RenderError> {
        let mut usage = BufferUsage::INDEX;
        if index32 {
            usage |= BufferUsage::INDEX32;
        }
        let buffer = Buffer::create(self.backend.as_ref(), size, None, usage, None, "index_dynamic")?;
        self.resources.buffers.insert(buffer)
    }

    /// Update a buffer range. `discard` signals the whole previous
    /// contents are dead, taking the cheapest path.
    pub fn update_buffer(
        &mut self,
        handle: BufferHandle,
        offset: u32,
        data: &[u8],
        discard: bool,
    ) -> Result<(), RenderError> {
        self.cmd.ensure_encoder(self.backend.as_mut());
        let buffer = self
            .resources
            .buffers
            .get_mut(handle)
            .ok_or(RenderError::InvalidHandle)?;
        buffer.update(self.backend.as_mut(), &mut self.cmd, offset, data, discard)
    }

    /// Destroy a buffer; the device object survives on the release ring
    /// until in-flight frames retire.
    pub fn destroy_buffer(&mut self, handle: BufferHandle) {
        if let Some(buffer) = self.resources.buffers.remove(handle) {
            self.cmd.release(GpuResource::Buffer(buffer.gpu));
        }
    }

    // --- textures ---

    /// Create a texture from an encoded image container.
    pub fn create_texture(
        &mut self,
        image: &TextureImage,
        flags: TextureFlags,
        skip: u8,
    ) -> Result<TextureHandle, RenderError> {
        self.cmd.ensure_encoder(self.backend.as_mut());
        let texture = Texture::create(
            self.backend.as_mut(),
            &mut self.cmd,
            &mut self.samplers,
            image,
            flags,
            skip,
        )?;
        self.resources.textures.insert(texture)
    }

    /// Upload a sub-region of one mip level.
    #[allow(clippy::too_many_arguments)]
    pub fn update_texture(
        &mut self,
        handle: TextureHandle,
        side: u32,
        mip: u8,
        rect: Rect,
        z: u16,
        src_pitch: Option<u32>,
        data: &[u8],
    ) -> Result<(), RenderError> {
        self.cmd.ensure_encoder(self.backend.as_mut());
        let texture = self
            .resources
            .textures
            .get(handle)
            .ok_or(RenderError::InvalidHandle)?;
        texture.update(
            self.backend.as_mut(),
            &mut self.cmd,
            side,
            mip,
            rect,
            z,
            src_pitch,
            data,
        )?;
        Ok(())
    }

    /// Recreate a texture at new dimensions, preserving flags and format.
    pub fn resize_texture(
        &mut self,
        handle: TextureHandle,
        width: u32,
        height: u32,
        num_mips: u8,
    ) -> Result<(), RenderError> {
        self.cmd.ensure_encoder(self.backend.as_mut());
        let (format, flags) = {
            let texture = self
                .resources
                .textures
                .get(handle)
                .ok_or(RenderError::InvalidHandle)?;
            (texture.requested_format, texture.flags)
        };

        let mut image = TextureImage::target(width, height, format);
        image.num_mips = num_mips.max(1);
        let new_texture = Texture::create(
            self.backend.as_mut(),
            &mut self.cmd,
            &mut self.samplers,
            &image,
            flags,
            0,
        )?;

        let texture = self
            .resources
            .textures
            .get_mut(handle)
            .ok_or(RenderError::InvalidHandle)?;
        let old = std::mem::replace(texture, new_texture);
        self.cmd.release_all(old.into_released());
        Ok(())
    }

    /// Blocking read-back of mip 0 of a `READ_BACK` texture.
    pub fn read_texture(&mut self, handle: TextureHandle) -> Result<Vec<u8>, RenderError> {
        use crate::backend::{BufferImageLayout, CopyExtent, TextureCopyLocation};
        use crate::types::buffer::BufferDescriptor;

        let texture = self
            .resources
            .textures
            .get(handle)
            .ok_or(RenderError::InvalidHandle)?;
        if !texture.flags.read_back() {
            return Err(RenderError::InvalidParameter(
                "texture was not created with READ_BACK".to_string(),
            ));
        }

        let pitch = texture.width * texture.format.bytes_per_pixel();
        let aligned_pitch = (pitch + 255) & !255;
        let size = aligned_pitch as u64 * texture.height as u64;

        let staging = self.backend.create_buffer(&BufferDescriptor::new(
            size,
            BufferUsage::COPY_DST | BufferUsage::COPY_SRC,
        ))?;

        self.cmd.ensure_encoder(self.backend.as_mut());
        self.backend.copy_texture_to_buffer(
            &TextureCopyLocation {
                texture: &texture.gpu,
                mip: 0,
                origin: [0, 0, 0],
            },
            &staging,
            BufferImageLayout {
                offset: 0,
                bytes_per_row: aligned_pitch,
                rows_per_image: texture.height,
            },
            CopyExtent {
                width: texture.width,
                height: texture.height,
                depth: 1,
            },
        );
        self.cmd.kick(self.backend.as_mut(), false);
        self.backend.wait_idle();

        let raw = self.backend.read_buffer(&staging, 0, size);
        // Strip the copy pitch back out.
        let mut out = Vec::with_capacity((pitch * texture.height) as usize);
        for row in 0..texture.height as usize {
            let start = row * aligned_pitch as usize;
            out.extend_from_slice(&raw[start..start + pitch as usize]);
        }
        Ok(out)
    }

    pub fn destroy_texture(&mut self, handle: TextureHandle) {
        if let Some(texture) = self.resources.textures.remove(handle) {
            self.cmd.release_all(texture.into_released());
        }
    }

    // --- shaders and programs ---

    /// Parse a shader binary container and compile its module.
    ///
    /// A failed compile invalidates nothing else: the error stays local
    /// to this handle and draws referencing it are skipped later.
    pub fn create_shader(&mut self, bytes: &[u8]) -> Result<ShaderHandle, RenderError> {
        let blob = ShaderBlob::parse(bytes)?;
        let module = match self
            .backend
            .create_shader_module(&blob.code, &format!("{:?}", blob.kind))
        {
            Ok(module) => module,
            Err(err) => {
                log::warn!("shader module compile failed: {err}");
                return Err(err);
            }
        };
        self.resources.shaders.insert(Shader { blob, module })
    }

    pub fn destroy_shader(&mut self, handle: ShaderHandle) {
        self.resources.shaders.remove(handle);
    }

    /// Link a program from a vertex (or compute) shader and an optional
    /// fragment shader.
    pub fn create_program(
        &mut self,
        vsh: ShaderHandle,
        fsh: Option<ShaderHandle>,
    ) -> Result<ProgramHandle, RenderError> {
        let vertex = self
            .resources
            .shaders
            .get(vsh)
            .ok_or(RenderError::InvalidHandle)?;
        let fragment = match fsh {
            Some(handle) => Some(
                self.resources
                    .shaders
                    .get(handle)
                    .ok_or(RenderError::InvalidHandle)?,
            ),
            None => None,
        };
        let program = Program::create(self.backend.as_ref(), vertex, fragment, &self.registry)?;
        self.resources.programs.insert(program)
    }

    pub fn destroy_program(&mut self, handle: ProgramHandle) {
        self.resources.programs.remove(handle);
    }

    // --- uniforms ---

    pub fn create_uniform(
        &mut self,
        name: &str,
        ty: UniformType,
        num: u16,
    ) -> Result<UniformHandle, RenderError> {
        self.registry.create(name, ty, num)
    }

    pub fn update_uniform(&mut self, handle: UniformHandle, data: &[u8]) {
        self.registry.update(handle, data);
    }

    pub fn destroy_uniform(&mut self, handle: UniformHandle) {
        self.registry.destroy(handle);
    }

    // --- frame buffers ---

    /// Create an off-screen frame buffer over texture attachments.
    pub fn create_frame_buffer(
        &mut self,
        attachments: &[Attachment],
    ) -> Result<FrameBufferHandle, RenderError> {
        let fb = FrameBuffer::with_attachments(&self.resources.textures, attachments)?;
        self.resources.frame_buffers.insert(fb)
    }

    /// Create a window frame buffer with its own swap chain, entering it
    /// into the dense window-tracking table.
    pub fn create_window_frame_buffer(
        &mut self,
        window: SurfaceTarget,
        width: u32,
        height: u32,
    ) -> Result<FrameBufferHandle, RenderError> {
        let chain = SwapChain::new(self.backend.as_ref(), window, width, height, 1, true)?;

        let dense = self
            .windows
            .iter()
            .skip(1)
            .position(Option::is_none)
            .map(|i| i + 1)
            .ok_or(RenderError::PoolExhausted("window"))? as u16;

        let fb = FrameBuffer::with_swap_chain(chain, dense);
        let handle = self.resources.frame_buffers.insert(fb)?;
        self.windows[dense as usize] = Some(handle);
        Ok(handle)
    }

    /// Destroy a frame buffer. Window frame buffers vacate their dense
    /// slot; the swap-chain textures ride the release ring out.
    pub fn destroy_frame_buffer(&mut self, handle: FrameBufferHandle) {
        if let Some(fb) = self.resources.frame_buffers.remove(handle) {
            let (dense, released) = fb.into_released();
            self.cmd.release_all(released);
            if dense != NO_DENSE_INDEX {
                self.windows[dense as usize] = None;
            }
        }
    }

    /// The primary swap chain's dimensions.
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of live window frame buffers, primary included.
    pub fn window_count(&self) -> usize {
        1 + self.windows.iter().skip(1).filter(|w| w.is_some()).count()
    }
}
