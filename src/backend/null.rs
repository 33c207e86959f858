//! Null backend: records every call without touching a device.
//!
//! Used by tests and headless runs. The counters it keeps are the
//! observation point for the renderer's performance contracts (pipeline
//! reuse, bind-state dedup, draw-call counts).

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::RenderError;
use crate::types::buffer::{BufferDescriptor, IndexFormat};
use crate::types::sampler::SamplerDescriptor;
use crate::types::texture::{TextureDescriptor, TextureFormat};

use super::{
    BackendLimits, BindGroupEntry, BindLayoutEntry, BufferImageLayout, ComputePipelineDesc,
    CopyExtent, GpuBindGroup, GpuBindGroupLayout, GpuBuffer, GpuPipeline, GpuQuerySet,
    GpuSampler, GpuShaderModule, GpuSurface, GpuTexture, GpuTextureView, RenderBackend,
    RenderPassDesc, RenderPipelineDesc, SurfaceTarget, TextureCopyLocation, TextureViewDesc,
};

/// A fake device object. Tests hold a `Weak` to one of these (or watch
/// [`NullBackend::live_resource_count`]) to observe when deferred release
/// actually drops it.
#[derive(Debug)]
pub struct NullResource {
    pub id: u64,
    live: Option<Arc<AtomicI64>>,
}

impl NullResource {
    /// A resource not tracked by any backend's live count.
    pub fn detached(id: u64) -> Self {
        Self { id, live: None }
    }
}

impl Drop for NullResource {
    fn drop(&mut self) {
        if let Some(live) = &self.live {
            live.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

/// Snapshot of every counter the null backend keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullStats {
    pub buffers_created: u64,
    pub textures_created: u64,
    pub views_created: u64,
    pub samplers_created: u64,
    pub shader_modules_created: u64,
    pub bind_group_layouts_created: u64,
    pub bind_groups_created: u64,
    pub render_pipelines_created: u64,
    pub compute_pipelines_created: u64,
    pub buffer_writes: u64,
    pub copies: u64,
    pub render_passes: u64,
    pub compute_passes: u64,
    pub set_pipeline_calls: u64,
    pub set_bind_group_calls: u64,
    pub set_vertex_buffer_calls: u64,
    pub set_index_buffer_calls: u64,
    pub set_scissor_calls: u64,
    pub set_blend_color_calls: u64,
    pub draw_calls: u64,
    pub draw_indexed_calls: u64,
    pub dispatch_calls: u64,
    pub occlusion_queries_begun: u64,
    pub submits: u64,
    pub presents: u64,
}

impl NullStats {
    /// Draws of both kinds.
    pub fn total_draws(&self) -> u64 {
        self.draw_calls + self.draw_indexed_calls
    }
}

#[derive(Default)]
struct Counters {
    buffers_created: AtomicU64,
    textures_created: AtomicU64,
    views_created: AtomicU64,
    samplers_created: AtomicU64,
    shader_modules_created: AtomicU64,
    bind_group_layouts_created: AtomicU64,
    bind_groups_created: AtomicU64,
    render_pipelines_created: AtomicU64,
    compute_pipelines_created: AtomicU64,
    buffer_writes: AtomicU64,
    copies: AtomicU64,
    render_passes: AtomicU64,
    compute_passes: AtomicU64,
    set_pipeline_calls: AtomicU64,
    set_bind_group_calls: AtomicU64,
    set_vertex_buffer_calls: AtomicU64,
    set_index_buffer_calls: AtomicU64,
    set_scissor_calls: AtomicU64,
    set_blend_color_calls: AtomicU64,
    draw_calls: AtomicU64,
    draw_indexed_calls: AtomicU64,
    dispatch_calls: AtomicU64,
    occlusion_queries_begun: AtomicU64,
    submits: AtomicU64,
    presents: AtomicU64,
}

/// The no-device backend.
#[derive(Default)]
pub struct NullBackend {
    next_id: AtomicU64,
    counters: Counters,
    live: Arc<AtomicI64>,
    fail_shader_compile: AtomicBool,
    encoder_open: bool,
    render_pass_open: bool,
    compute_pass_open: bool,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&self) -> Arc<NullResource> {
        self.live.fetch_add(1, Ordering::Relaxed);
        Arc::new(NullResource {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            live: Some(self.live.clone()),
        })
    }

    /// Device objects currently alive (created minus dropped).
    pub fn live_resource_count(&self) -> i64 {
        self.live.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters.
    pub fn stats(&self) -> NullStats {
        let c = &self.counters;
        NullStats {
            buffers_created: c.buffers_created.load(Ordering::Relaxed),
            textures_created: c.textures_created.load(Ordering::Relaxed),
            views_created: c.views_created.load(Ordering::Relaxed),
            samplers_created: c.samplers_created.load(Ordering::Relaxed),
            shader_modules_created: c.shader_modules_created.load(Ordering::Relaxed),
            bind_group_layouts_created: c.bind_group_layouts_created.load(Ordering::Relaxed),
            bind_groups_created: c.bind_groups_created.load(Ordering::Relaxed),
            render_pipelines_created: c.render_pipelines_created.load(Ordering::Relaxed),
            compute_pipelines_created: c.compute_pipelines_created.load(Ordering::Relaxed),
            buffer_writes: c.buffer_writes.load(Ordering::Relaxed),
            copies: c.copies.load(Ordering::Relaxed),
            render_passes: c.render_passes.load(Ordering::Relaxed),
            compute_passes: c.compute_passes.load(Ordering::Relaxed),
            set_pipeline_calls: c.set_pipeline_calls.load(Ordering::Relaxed),
            set_bind_group_calls: c.set_bind_group_calls.load(Ordering::Relaxed),
            set_vertex_buffer_calls: c.set_vertex_buffer_calls.load(Ordering::Relaxed),
            set_index_buffer_calls: c.set_index_buffer_calls.load(Ordering::Relaxed),
            set_scissor_calls: c.set_scissor_calls.load(Ordering::Relaxed),
            set_blend_color_calls: c.set_blend_color_calls.load(Ordering::Relaxed),
            draw_calls: c.draw_calls.load(Ordering::Relaxed),
            draw_indexed_calls: c.draw_indexed_calls.load(Ordering::Relaxed),
            dispatch_calls: c.dispatch_calls.load(Ordering::Relaxed),
            occlusion_queries_begun: c.occlusion_queries_begun.load(Ordering::Relaxed),
            submits: c.submits.load(Ordering::Relaxed),
            presents: c.presents.load(Ordering::Relaxed),
        }
    }

    /// Make subsequent shader-module creation fail, for error-path tests.
    pub fn fail_shader_compile(&self, fail: bool) {
        self.fail_shader_compile.store(fail, Ordering::Relaxed);
    }
}

impl RenderBackend for NullBackend {
    fn name(&self) -> &'static str {
        "Null"
    }

    fn limits(&self) -> BackendLimits {
        BackendLimits::default()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<GpuBuffer, RenderError> {
        log::trace!(
            "NullBackend: create buffer {:?} (size {})",
            desc.label,
            desc.size
        );
        Self::bump(&self.counters.buffers_created);
        Ok(GpuBuffer::Null(self.alloc()))
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> Result<GpuTexture, RenderError> {
        log::trace!(
            "NullBackend: create texture {:?} ({}x{}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.depth,
            desc.format
        );
        Self::bump(&self.counters.textures_created);
        Ok(GpuTexture::Null(self.alloc()))
    }

    fn create_texture_view(&self, _texture: &GpuTexture, _desc: &TextureViewDesc) -> GpuTextureView {
        Self::bump(&self.counters.views_created);
        GpuTextureView::Null(self.alloc())
    }

    fn create_sampler(&self, _desc: &SamplerDescriptor) -> GpuSampler {
        Self::bump(&self.counters.samplers_created);
        GpuSampler::Null(self.alloc())
    }

    fn create_shader_module(
        &self,
        _code: &[u8],
        label: &str,
    ) -> Result<GpuShaderModule, RenderError> {
        if self.fail_shader_compile.load(Ordering::Relaxed) {
            return Err(RenderError::ShaderParseFailed(format!(
                "forced failure for {label}"
            )));
        }
        Self::bump(&self.counters.shader_modules_created);
        Ok(GpuShaderModule::Null(self.alloc()))
    }

    fn create_bind_group_layout(&self, _entries: &[BindLayoutEntry]) -> GpuBindGroupLayout {
        Self::bump(&self.counters.bind_group_layouts_created);
        GpuBindGroupLayout::Null(self.alloc())
    }

    fn create_bind_group(
        &self,
        _layout: &GpuBindGroupLayout,
        _entries: &[BindGroupEntry<'_>],
    ) -> GpuBindGroup {
        Self::bump(&self.counters.bind_groups_created);
        GpuBindGroup::Null(self.alloc())
    }

    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDesc<'_>,
    ) -> Result<GpuPipeline, RenderError> {
        log::trace!("NullBackend: compile render pipeline '{}'", desc.label);
        Self::bump(&self.counters.render_pipelines_created);
        Ok(GpuPipeline::NullRender(self.alloc()))
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc<'_>,
    ) -> Result<GpuPipeline, RenderError> {
        log::trace!("NullBackend: compile compute pipeline '{}'", desc.label);
        Self::bump(&self.counters.compute_pipelines_created);
        Ok(GpuPipeline::NullCompute(self.alloc()))
    }

    fn create_query_set(&self, _count: u32) -> GpuQuerySet {
        GpuQuerySet::Null(self.alloc())
    }

    fn write_buffer(&self, _buffer: &GpuBuffer, _offset: u64, _data: &[u8]) {
        Self::bump(&self.counters.buffer_writes);
    }

    fn read_buffer(&self, _buffer: &GpuBuffer, _offset: u64, size: u64) -> Vec<u8> {
        vec![0; size as usize]
    }

    fn begin_encoder(&mut self) {
        debug_assert!(!self.encoder_open, "encoder already live");
        self.encoder_open = true;
    }

    fn has_encoder(&self) -> bool {
        self.encoder_open
    }

    fn submit(&mut self) {
        debug_assert!(self.encoder_open);
        debug_assert!(!self.render_pass_open && !self.compute_pass_open);
        self.encoder_open = false;
        Self::bump(&self.counters.submits);
    }

    fn wait_idle(&mut self) {}

    fn copy_buffer_to_buffer(
        &mut self,
        _src: &GpuBuffer,
        _src_offset: u64,
        _dst: &GpuBuffer,
        _dst_offset: u64,
        _size: u64,
    ) {
        Self::bump(&self.counters.copies);
    }

    fn copy_buffer_to_texture(
        &mut self,
        _src: &GpuBuffer,
        _layout: BufferImageLayout,
        _dst: &TextureCopyLocation<'_>,
        _extent: CopyExtent,
    ) {
        Self::bump(&self.counters.copies);
    }

    fn copy_texture_to_texture(
        &mut self,
        _src: &TextureCopyLocation<'_>,
        _dst: &TextureCopyLocation<'_>,
        _extent: CopyExtent,
    ) {
        Self::bump(&self.counters.copies);
    }

    fn copy_texture_to_buffer(
        &mut self,
        _src: &TextureCopyLocation<'_>,
        _dst: &GpuBuffer,
        _layout: BufferImageLayout,
        _extent: CopyExtent,
    ) {
        Self::bump(&self.counters.copies);
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDesc<'_>) {
        debug_assert!(self.encoder_open);
        debug_assert!(!self.render_pass_open && !self.compute_pass_open);
        log::trace!(
            "NullBackend: begin render pass '{}' ({} colors)",
            desc.label,
            desc.colors.len()
        );
        self.render_pass_open = true;
        Self::bump(&self.counters.render_passes);
    }

    fn end_render_pass(&mut self) {
        debug_assert!(self.render_pass_open);
        self.render_pass_open = false;
    }

    fn set_render_pipeline(&mut self, _pipeline: &GpuPipeline) {
        Self::bump(&self.counters.set_pipeline_calls);
    }

    fn set_bind_group(&mut self, _index: u32, _group: &GpuBindGroup, _offsets: &[u32]) {
        Self::bump(&self.counters.set_bind_group_calls);
    }

    fn set_vertex_buffer(&mut self, _slot: u32, _buffer: &GpuBuffer, _offset: u64) {
        Self::bump(&self.counters.set_vertex_buffer_calls);
    }

    fn set_index_buffer(&mut self, _buffer: &GpuBuffer, _format: IndexFormat, _offset: u64) {
        Self::bump(&self.counters.set_index_buffer_calls);
    }

    fn set_scissor_rect(&mut self, _x: u32, _y: u32, _width: u32, _height: u32) {
        Self::bump(&self.counters.set_scissor_calls);
    }

    fn set_blend_color(&mut self, _color: [f64; 4]) {
        Self::bump(&self.counters.set_blend_color_calls);
    }

    fn draw(&mut self, _vertices: u32, _instances: u32, _first_vertex: u32, _first_instance: u32) {
        debug_assert!(self.render_pass_open);
        Self::bump(&self.counters.draw_calls);
    }

    fn draw_indexed(
        &mut self,
        _indices: u32,
        _instances: u32,
        _first_index: u32,
        _base_vertex: i32,
        _first_instance: u32,
    ) {
        debug_assert!(self.render_pass_open);
        Self::bump(&self.counters.draw_indexed_calls);
    }

    fn begin_occlusion_query(&mut self, _index: u32) {
        Self::bump(&self.counters.occlusion_queries_begun);
    }

    fn end_occlusion_query(&mut self) {}

    fn begin_compute_pass(&mut self) {
        debug_assert!(self.encoder_open);
        debug_assert!(!self.render_pass_open && !self.compute_pass_open);
        self.compute_pass_open = true;
        Self::bump(&self.counters.compute_passes);
    }

    fn end_compute_pass(&mut self) {
        debug_assert!(self.compute_pass_open);
        self.compute_pass_open = false;
    }

    fn set_compute_pipeline(&mut self, _pipeline: &GpuPipeline) {
        Self::bump(&self.counters.set_pipeline_calls);
    }

    fn set_compute_bind_group(&mut self, _index: u32, _group: &GpuBindGroup, _offsets: &[u32]) {
        Self::bump(&self.counters.set_bind_group_calls);
    }

    fn dispatch(&mut self, _x: u32, _y: u32, _z: u32) {
        debug_assert!(self.compute_pass_open);
        Self::bump(&self.counters.dispatch_calls);
    }

    fn resolve_occlusion_queries(&mut self, _set: &GpuQuerySet, count: u32) -> Vec<u64> {
        // Everything passes on the null device.
        vec![1; count as usize]
    }

    fn create_surface(&self, _target: SurfaceTarget) -> Result<GpuSurface, RenderError> {
        Ok(GpuSurface::Null(self.alloc()))
    }

    fn configure_surface(
        &self,
        _surface: &GpuSurface,
        width: u32,
        height: u32,
        format: TextureFormat,
        _vsync: bool,
    ) {
        log::trace!("NullBackend: configure surface {width}x{height} {format:?}");
    }

    fn acquire_surface_view(
        &mut self,
        _surface: &GpuSurface,
    ) -> Result<GpuTextureView, RenderError> {
        Self::bump(&self.counters.views_created);
        Ok(GpuTextureView::Null(self.alloc()))
    }

    fn present(&mut self, _surface: &GpuSurface) {
        Self::bump(&self.counters.presents);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::buffer::BufferUsage;

    #[test]
    fn test_counters_track_calls() {
        let mut backend = NullBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        backend.write_buffer(&buffer, 0, &[0; 16]);

        backend.begin_encoder();
        backend.begin_render_pass(&RenderPassDesc {
            label: "test",
            colors: &[],
            depth: None,
            occlusion_queries: None,
        });
        backend.draw(3, 1, 0, 0);
        backend.end_render_pass();
        backend.submit();

        let stats = backend.stats();
        assert_eq!(stats.buffers_created, 1);
        assert_eq!(stats.buffer_writes, 1);
        assert_eq!(stats.render_passes, 1);
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.submits, 1);
        assert_eq!(stats.total_draws(), 1);
    }

    #[test]
    fn test_forced_shader_failure() {
        let backend = NullBackend::new();
        backend.fail_shader_compile(true);
        assert!(backend.create_shader_module(b"code", "bad").is_err());
        backend.fail_shader_compile(false);
        assert!(backend.create_shader_module(b"code", "good").is_ok());
    }

    #[test]
    fn test_resource_drop_observable() {
        let backend = NullBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        let weak = match &buffer {
            GpuBuffer::Null(res) => std::sync::Arc::downgrade(res),
            #[cfg(feature = "wgpu-backend")]
            _ => unreachable!(),
        };
        assert!(weak.upgrade().is_some());
        drop(buffer);
        assert!(weak.upgrade().is_none());
    }
}
