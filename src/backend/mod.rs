//! GPU backend abstraction layer.
//!
//! The execution core talks to the device through the [`RenderBackend`]
//! trait; device objects are backend-tagged enums so the core can hold them
//! without generics. One implementation exists per target API:
//!
//! - [`NullBackend`] - records calls without touching a device; used by
//!   tests and headless runs
//! - `WgpuBackend` (feature `wgpu-backend`) - the real device path
//!
//! Exactly one command encoder is live at a time, and at most one render or
//! compute pass inside it, so the encoder and pass state live behind the
//! trait rather than in returned objects.

pub mod null;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_impl;

pub use null::{NullBackend, NullStats};
#[cfg(feature = "wgpu-backend")]
pub use wgpu_impl::WgpuBackend;

use std::sync::Arc;

use bitflags::bitflags;

use crate::error::RenderError;
use crate::types::buffer::{BufferDescriptor, IndexFormat};
use crate::types::sampler::SamplerDescriptor;
use crate::types::state::{
    BlendFactor, BlendOperation, CompareFunction, CullMode, PrimitiveTopology, StencilFace,
    WriteMask,
};
use crate::types::texture::{TextureDescriptor, TextureDimension, TextureFormat};
use crate::types::vertex::{VertexFormat, VertexStepMode};

/// Static limits the core sizes itself against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendLimits {
    /// Minimum alignment of dynamic uniform-buffer offsets.
    pub min_uniform_offset_alignment: u32,
    pub max_texture_dimension: u32,
    pub max_color_attachments: u32,
    pub max_sample_count: u32,
}

impl Default for BackendLimits {
    fn default() -> Self {
        Self {
            min_uniform_offset_alignment: 256,
            max_texture_dimension: 16384,
            max_color_attachments: crate::MAX_COLOR_ATTACHMENTS as u32,
            max_sample_count: 4,
        }
    }
}

// ============================================================================
// Device object handles
// ============================================================================

/// Handle to a device buffer.
#[derive(Debug, Clone)]
pub enum GpuBuffer {
    Null(Arc<null::NullResource>),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::Buffer>),
}

/// Handle to a device texture.
#[derive(Debug, Clone)]
pub enum GpuTexture {
    Null(Arc<null::NullResource>),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::Texture>),
}

/// Handle to a device texture view.
#[derive(Debug, Clone)]
pub enum GpuTextureView {
    Null(Arc<null::NullResource>),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::TextureView>),
}

/// Handle to a device sampler.
#[derive(Debug, Clone)]
pub enum GpuSampler {
    Null(Arc<null::NullResource>),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::Sampler>),
}

/// Handle to a compiled shader module.
#[derive(Debug, Clone)]
pub enum GpuShaderModule {
    Null(Arc<null::NullResource>),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::ShaderModule>),
}

/// Handle to a bind group layout.
#[derive(Debug, Clone)]
pub enum GpuBindGroupLayout {
    Null(Arc<null::NullResource>),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::BindGroupLayout>),
}

/// Handle to a bound descriptor group.
#[derive(Debug, Clone)]
pub enum GpuBindGroup {
    Null(Arc<null::NullResource>),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::BindGroup>),
}

/// Handle to a compiled render or compute pipeline.
#[derive(Debug, Clone)]
pub enum GpuPipeline {
    NullRender(Arc<null::NullResource>),
    NullCompute(Arc<null::NullResource>),
    #[cfg(feature = "wgpu-backend")]
    WgpuRender(Arc<wgpu::RenderPipeline>),
    #[cfg(feature = "wgpu-backend")]
    WgpuCompute(Arc<wgpu::ComputePipeline>),
}

/// Handle to an occlusion query set.
#[derive(Debug, Clone)]
pub enum GpuQuerySet {
    Null(Arc<null::NullResource>),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::QuerySet>),
}

/// Handle to a presentable surface.
pub enum GpuSurface {
    Null(Arc<null::NullResource>),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(wgpu_impl::WgpuSurface),
}

impl std::fmt::Debug for GpuSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null(r) => f.debug_tuple("GpuSurface::Null").field(&r.id).finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(_) => f.debug_struct("GpuSurface::Wgpu").finish_non_exhaustive(),
        }
    }
}

/// A resource handed to the deferred-release ring.
#[derive(Debug, Clone)]
pub enum GpuResource {
    Buffer(GpuBuffer),
    Texture(GpuTexture),
}

/// The platform window a swap chain presents to.
pub enum SurfaceTarget {
    /// No window; acquire/present are no-ops (tests, headless).
    Headless,
    /// A live platform window.
    #[cfg(feature = "wgpu-backend")]
    Window {
        window: raw_window_handle::RawWindowHandle,
        display: raw_window_handle::RawDisplayHandle,
    },
}

// ============================================================================
// Descriptor types consumed by the trait
// ============================================================================

bitflags! {
    /// Shader stages a binding is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StageFlags: u8 {
        const VERTEX   = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE  = 1 << 2;
    }
}

/// Kind of a bind-group layout entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    UniformBuffer { dynamic_offset: bool },
    StorageBuffer,
    SampledTexture { multisampled: bool },
    StorageTexture,
    Sampler { comparison: bool },
}

/// One bind-group layout entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindLayoutEntry {
    pub binding: u32,
    pub visibility: StageFlags,
    pub kind: BindingKind,
}

/// A concrete resource bound into a group.
pub enum BindingResource<'a> {
    UniformBuffer {
        buffer: &'a GpuBuffer,
        offset: u64,
        size: u64,
    },
    StorageBuffer {
        buffer: &'a GpuBuffer,
        offset: u64,
        size: u64,
    },
    Texture(&'a GpuTextureView),
    Sampler(&'a GpuSampler),
}

/// One bind-group entry.
pub struct BindGroupEntry<'a> {
    pub binding: u32,
    pub resource: BindingResource<'a>,
}

/// Blend settings for one channel pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendComponent {
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub op: BlendOperation,
}

impl Default for BlendComponent {
    fn default() -> Self {
        Self {
            src: BlendFactor::One,
            dst: BlendFactor::Zero,
            op: BlendOperation::Add,
        }
    }
}

/// Complete blend state for one color target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlendDesc {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

/// One color target of a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorTargetDesc {
    pub format: TextureFormat,
    pub blend: Option<BlendDesc>,
    pub write_mask: WriteMask,
}

/// Depth/stencil state of a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilDesc {
    pub format: TextureFormat,
    pub depth_write: bool,
    pub depth_compare: CompareFunction,
    pub stencil_front: StencilFace,
    pub stencil_back: StencilFace,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
}

/// One vertex attribute of a pipeline's vertex state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttributeDesc {
    pub format: VertexFormat,
    pub offset: u64,
    pub shader_location: u32,
}

/// One vertex buffer of a pipeline's vertex state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBufferDesc {
    pub stride: u64,
    pub step: VertexStepMode,
    pub attributes: Vec<VertexAttributeDesc>,
}

/// Full render pipeline description.
pub struct RenderPipelineDesc<'a> {
    pub label: &'a str,
    pub vs: &'a GpuShaderModule,
    pub fs: Option<&'a GpuShaderModule>,
    pub layouts: &'a [&'a GpuBindGroupLayout],
    pub vertex_buffers: &'a [VertexBufferDesc],
    pub color_targets: &'a [ColorTargetDesc],
    pub depth_stencil: Option<DepthStencilDesc>,
    pub topology: PrimitiveTopology,
    pub cull: CullMode,
    pub sample_count: u32,
    pub alpha_to_coverage: bool,
}

/// Full compute pipeline description.
pub struct ComputePipelineDesc<'a> {
    pub label: &'a str,
    pub module: &'a GpuShaderModule,
    pub layouts: &'a [&'a GpuBindGroupLayout],
}

/// Load operation of a pass attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp<T> {
    Load,
    Clear(T),
}

/// One color attachment of a render pass.
pub struct ColorAttachment<'a> {
    pub view: &'a GpuTextureView,
    pub resolve: Option<&'a GpuTextureView>,
    pub load: LoadOp<[f64; 4]>,
    pub store: bool,
}

/// The depth/stencil attachment of a render pass.
pub struct DepthAttachment<'a> {
    pub view: &'a GpuTextureView,
    pub depth_load: LoadOp<f32>,
    pub depth_store: bool,
    pub has_stencil: bool,
    pub stencil_load: LoadOp<u32>,
    pub stencil_store: bool,
}

/// Full render pass description.
pub struct RenderPassDesc<'a> {
    pub label: &'a str,
    pub colors: &'a [ColorAttachment<'a>],
    pub depth: Option<DepthAttachment<'a>>,
    pub occlusion_queries: Option<&'a GpuQuerySet>,
}

/// View over a sub-resource of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureViewDesc {
    pub base_mip: u8,
    /// `None` covers all remaining mips.
    pub mip_count: Option<u8>,
    pub base_layer: u16,
    /// `None` covers all remaining layers.
    pub layer_count: Option<u16>,
    pub dimension: Option<TextureDimension>,
}

/// Buffer-side layout of a buffer/texture copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferImageLayout {
    pub offset: u64,
    pub bytes_per_row: u32,
    pub rows_per_image: u32,
}

/// Texture-side location of a copy.
pub struct TextureCopyLocation<'a> {
    pub texture: &'a GpuTexture,
    pub mip: u8,
    /// x, y, and z (or array layer for layered textures).
    pub origin: [u32; 3],
}

/// Copy extent in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyExtent {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

// ============================================================================
// The backend trait
// ============================================================================

/// Device abstraction implemented once per target API.
///
/// Resource creation takes `&self`; command-encoding methods take
/// `&mut self` because they mutate the single live encoder/pass.
pub trait RenderBackend {
    fn name(&self) -> &'static str;
    fn limits(&self) -> BackendLimits;
    /// Downcast seam for backend-specific access (diagnostics, tests).
    fn as_any(&self) -> &dyn std::any::Any;

    // --- resource creation ---

    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<GpuBuffer, RenderError>;
    fn create_texture(&self, desc: &TextureDescriptor) -> Result<GpuTexture, RenderError>;
    fn create_texture_view(&self, texture: &GpuTexture, desc: &TextureViewDesc) -> GpuTextureView;
    fn create_sampler(&self, desc: &SamplerDescriptor) -> GpuSampler;
    fn create_shader_module(&self, code: &[u8], label: &str)
        -> Result<GpuShaderModule, RenderError>;
    fn create_bind_group_layout(&self, entries: &[BindLayoutEntry]) -> GpuBindGroupLayout;
    fn create_bind_group(
        &self,
        layout: &GpuBindGroupLayout,
        entries: &[BindGroupEntry<'_>],
    ) -> GpuBindGroup;
    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDesc<'_>,
    ) -> Result<GpuPipeline, RenderError>;
    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc<'_>,
    ) -> Result<GpuPipeline, RenderError>;
    fn create_query_set(&self, count: u32) -> GpuQuerySet;

    /// Write data through the queue; ordered before the next submit.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]);

    /// Blocking read-back, for `READ_BACK` textures routed through buffers.
    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Vec<u8>;

    // --- encoder lifecycle ---

    fn begin_encoder(&mut self);
    fn has_encoder(&self) -> bool;
    /// Finish the live encoder and submit its command buffer.
    fn submit(&mut self);
    /// Block until all submitted work completes.
    fn wait_idle(&mut self);

    // --- copies (outside passes) ---

    fn copy_buffer_to_buffer(
        &mut self,
        src: &GpuBuffer,
        src_offset: u64,
        dst: &GpuBuffer,
        dst_offset: u64,
        size: u64,
    );
    fn copy_buffer_to_texture(
        &mut self,
        src: &GpuBuffer,
        layout: BufferImageLayout,
        dst: &TextureCopyLocation<'_>,
        extent: CopyExtent,
    );
    fn copy_texture_to_texture(
        &mut self,
        src: &TextureCopyLocation<'_>,
        dst: &TextureCopyLocation<'_>,
        extent: CopyExtent,
    );
    fn copy_texture_to_buffer(
        &mut self,
        src: &TextureCopyLocation<'_>,
        dst: &GpuBuffer,
        layout: BufferImageLayout,
        extent: CopyExtent,
    );

    // --- render pass encoding ---

    fn begin_render_pass(&mut self, desc: &RenderPassDesc<'_>);
    fn end_render_pass(&mut self);
    fn set_render_pipeline(&mut self, pipeline: &GpuPipeline);
    fn set_bind_group(&mut self, index: u32, group: &GpuBindGroup, offsets: &[u32]);
    fn set_vertex_buffer(&mut self, slot: u32, buffer: &GpuBuffer, offset: u64);
    fn set_index_buffer(&mut self, buffer: &GpuBuffer, format: IndexFormat, offset: u64);
    fn set_scissor_rect(&mut self, x: u32, y: u32, width: u32, height: u32);
    fn set_blend_color(&mut self, color: [f64; 4]);
    fn draw(&mut self, vertices: u32, instances: u32, first_vertex: u32, first_instance: u32);
    fn draw_indexed(
        &mut self,
        indices: u32,
        instances: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    );
    fn begin_occlusion_query(&mut self, index: u32);
    fn end_occlusion_query(&mut self);

    // --- compute pass encoding ---

    fn begin_compute_pass(&mut self);
    fn end_compute_pass(&mut self);
    fn set_compute_pipeline(&mut self, pipeline: &GpuPipeline);
    fn set_compute_bind_group(&mut self, index: u32, group: &GpuBindGroup, offsets: &[u32]);
    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    // --- queries ---

    /// Resolve the first `count` occlusion queries. Blocking on real
    /// devices; the null backend reports every query as passed.
    fn resolve_occlusion_queries(&mut self, set: &GpuQuerySet, count: u32) -> Vec<u64>;

    // --- surfaces ---

    fn create_surface(&self, target: SurfaceTarget) -> Result<GpuSurface, RenderError>;
    fn configure_surface(
        &self,
        surface: &GpuSurface,
        width: u32,
        height: u32,
        format: TextureFormat,
        vsync: bool,
    );
    /// Acquire the next presentable image's view.
    fn acquire_surface_view(&mut self, surface: &GpuSurface)
        -> Result<GpuTextureView, RenderError>;
    /// Present the previously acquired image.
    fn present(&mut self, surface: &GpuSurface);
}

static_assertions::assert_obj_safe!(RenderBackend);
