//! wgpu backend implementation.
//!
//! Uses wgpu for cross-platform GPU access (Vulkan, Metal, DX12, WebGPU).
//! The single live command encoder and its open pass are stored here; pass
//! objects use `forget_lifetime` so they can sit in struct fields between
//! trait calls.

pub(crate) mod conversion;

use std::sync::{Arc, Mutex};

use crate::error::RenderError;
use crate::types::buffer::{BufferDescriptor, IndexFormat};
use crate::types::sampler::SamplerDescriptor;
use crate::types::texture::{TextureDescriptor, TextureFormat};

use super::{
    BackendLimits, BindGroupEntry, BindLayoutEntry, BindingKind, BindingResource,
    BufferImageLayout, ComputePipelineDesc, CopyExtent, GpuBindGroup, GpuBindGroupLayout,
    GpuBuffer, GpuPipeline, GpuQuerySet, GpuSampler, GpuShaderModule, GpuSurface, GpuTexture,
    GpuTextureView, LoadOp, RenderBackend, RenderPassDesc, RenderPipelineDesc, StageFlags,
    SurfaceTarget, TextureCopyLocation, TextureViewDesc,
};
use conversion::*;

/// A configured presentable surface plus its pending acquired image.
pub struct WgpuSurface {
    surface: wgpu::Surface<'static>,
    current: Mutex<Option<wgpu::SurfaceTexture>>,
}

/// wgpu-based backend.
pub struct WgpuBackend {
    instance: wgpu::Instance,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    encoder: Option<wgpu::CommandEncoder>,
    render_pass: Option<wgpu::RenderPass<'static>>,
    compute_pass: Option<wgpu::ComputePass<'static>>,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter.get_info().name)
            .finish()
    }
}

impl WgpuBackend {
    /// Create a backend on the best available adapter.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InitializationFailed`] when no adapter or
    /// device is available. This is fatal at startup.
    pub fn new(validation: bool, debug: bool) -> Result<Self, RenderError> {
        let mut flags = wgpu::InstanceFlags::default();
        if validation {
            flags |= wgpu::InstanceFlags::VALIDATION;
        }
        if debug {
            flags |= wgpu::InstanceFlags::DEBUG;
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags,
            backend_options: wgpu::BackendOptions::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| RenderError::InitializationFailed(format!("no compatible adapter: {e}")))?;

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Cinnabar Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| RenderError::InitializationFailed(format!("device creation failed: {e}")))?;

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            encoder: None,
            render_pass: None,
            compute_pass: None,
        })
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }
}

fn foreign() -> Arc<super::null::NullResource> {
    log::error!("wgpu backend handed a foreign resource");
    Arc::new(super::null::NullResource::detached(u64::MAX))
}

fn wgpu_buffer(buffer: &GpuBuffer) -> Option<&wgpu::Buffer> {
    match buffer {
        GpuBuffer::Wgpu(b) => Some(b),
        GpuBuffer::Null(_) => None,
    }
}

fn wgpu_texture(texture: &GpuTexture) -> Option<&wgpu::Texture> {
    match texture {
        GpuTexture::Wgpu(t) => Some(t),
        GpuTexture::Null(_) => None,
    }
}

fn wgpu_view(view: &GpuTextureView) -> Option<&wgpu::TextureView> {
    match view {
        GpuTextureView::Wgpu(v) => Some(v),
        GpuTextureView::Null(_) => None,
    }
}

fn texture_copy_info<'a>(
    loc: &'a TextureCopyLocation<'_>,
    texture: &'a wgpu::Texture,
) -> wgpu::TexelCopyTextureInfo<'a> {
    wgpu::TexelCopyTextureInfo {
        texture,
        mip_level: loc.mip as u32,
        origin: wgpu::Origin3d {
            x: loc.origin[0],
            y: loc.origin[1],
            z: loc.origin[2],
        },
        aspect: wgpu::TextureAspect::All,
    }
}

fn buffer_copy_layout(layout: BufferImageLayout) -> wgpu::TexelCopyBufferLayout {
    wgpu::TexelCopyBufferLayout {
        offset: layout.offset,
        bytes_per_row: Some(layout.bytes_per_row),
        rows_per_image: Some(layout.rows_per_image),
    }
}

fn convert_stage_flags(flags: StageFlags) -> wgpu::ShaderStages {
    let mut result = wgpu::ShaderStages::empty();
    if flags.contains(StageFlags::VERTEX) {
        result |= wgpu::ShaderStages::VERTEX;
    }
    if flags.contains(StageFlags::FRAGMENT) {
        result |= wgpu::ShaderStages::FRAGMENT;
    }
    if flags.contains(StageFlags::COMPUTE) {
        result |= wgpu::ShaderStages::COMPUTE;
    }
    result
}

fn convert_binding_kind(kind: BindingKind) -> wgpu::BindingType {
    match kind {
        BindingKind::UniformBuffer { dynamic_offset } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic_offset,
            min_binding_size: None,
        },
        BindingKind::StorageBuffer => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        BindingKind::SampledTexture { multisampled } => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled,
        },
        BindingKind::StorageTexture => wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: wgpu::TextureFormat::Rgba8Unorm,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        BindingKind::Sampler { comparison } => {
            if comparison {
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison)
            } else {
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
            }
        }
    }
}

impl RenderBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn limits(&self) -> BackendLimits {
        let limits = self.device.limits();
        BackendLimits {
            min_uniform_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            max_texture_dimension: limits.max_texture_dimension_2d,
            max_color_attachments: limits.max_color_attachments.min(8),
            max_sample_count: 4,
        }
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<GpuBuffer, RenderError> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: convert_buffer_usage(desc.usage),
            mapped_at_creation: false,
        });
        Ok(GpuBuffer::Wgpu(Arc::new(buffer)))
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> Result<GpuTexture, RenderError> {
        use crate::types::texture::TextureDimension;

        let depth_or_array_layers = match desc.dimension {
            TextureDimension::D2 => desc.layer_count as u32,
            TextureDimension::D3 => desc.depth,
            TextureDimension::Cube => desc.layer_count as u32 * 6,
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers,
            },
            mip_level_count: desc.mip_count as u32,
            sample_count: desc.sample_count,
            dimension: convert_texture_dimension(desc.dimension),
            format: convert_texture_format(desc.format),
            usage: convert_texture_usage(desc.usage),
            view_formats: &[],
        });
        Ok(GpuTexture::Wgpu(Arc::new(texture)))
    }

    fn create_texture_view(&self, texture: &GpuTexture, desc: &TextureViewDesc) -> GpuTextureView {
        let Some(texture) = wgpu_texture(texture) else {
            return GpuTextureView::Null(foreign());
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: None,
            format: None,
            dimension: desc.dimension.map(convert_view_dimension),
            usage: None,
            aspect: wgpu::TextureAspect::All,
            base_mip_level: desc.base_mip as u32,
            mip_level_count: desc.mip_count.map(|c| c as u32),
            base_array_layer: desc.base_layer as u32,
            array_layer_count: desc.layer_count.map(|c| c as u32),
        });
        GpuTextureView::Wgpu(Arc::new(view))
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> GpuSampler {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: None,
            address_mode_u: convert_address_mode(desc.address_u),
            address_mode_v: convert_address_mode(desc.address_v),
            address_mode_w: convert_address_mode(desc.address_w),
            mag_filter: convert_filter_mode(desc.mag_filter),
            min_filter: convert_filter_mode(desc.min_filter),
            mipmap_filter: convert_mipmap_filter_mode(desc.mip_filter),
            lod_min_clamp: 0.0,
            lod_max_clamp: f32::MAX,
            compare: desc.compare.map(convert_compare_function),
            anisotropy_clamp: 1,
            border_color: None,
        });
        GpuSampler::Wgpu(Arc::new(sampler))
    }

    fn create_shader_module(
        &self,
        code: &[u8],
        label: &str,
    ) -> Result<GpuShaderModule, RenderError> {
        let source = std::str::from_utf8(code)
            .map_err(|e| RenderError::ShaderParseFailed(format!("{label}: not UTF-8 WGSL: {e}")))?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::ShaderParseFailed(format!("{label}: {err}")));
        }
        Ok(GpuShaderModule::Wgpu(Arc::new(module)))
    }

    fn create_bind_group_layout(&self, entries: &[BindLayoutEntry]) -> GpuBindGroupLayout {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = entries
            .iter()
            .map(|entry| wgpu::BindGroupLayoutEntry {
                binding: entry.binding,
                visibility: convert_stage_flags(entry.visibility),
                ty: convert_binding_kind(entry.kind),
                count: None,
            })
            .collect();
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: None,
                entries: &entries,
            });
        GpuBindGroupLayout::Wgpu(Arc::new(layout))
    }

    fn create_bind_group(
        &self,
        layout: &GpuBindGroupLayout,
        entries: &[BindGroupEntry<'_>],
    ) -> GpuBindGroup {
        let GpuBindGroupLayout::Wgpu(layout) = layout else {
            return GpuBindGroup::Null(foreign());
        };

        let mut wgpu_entries = Vec::with_capacity(entries.len());
        for entry in entries {
            let resource = match &entry.resource {
                BindingResource::UniformBuffer {
                    buffer,
                    offset,
                    size,
                }
                | BindingResource::StorageBuffer {
                    buffer,
                    offset,
                    size,
                } => {
                    let Some(buffer) = wgpu_buffer(buffer) else {
                        continue;
                    };
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer,
                        offset: *offset,
                        size: std::num::NonZeroU64::new(*size),
                    })
                }
                BindingResource::Texture(view) => {
                    let Some(view) = wgpu_view(view) else { continue };
                    wgpu::BindingResource::TextureView(view)
                }
                BindingResource::Sampler(sampler) => match sampler {
                    GpuSampler::Wgpu(s) => wgpu::BindingResource::Sampler(s),
                    GpuSampler::Null(_) => continue,
                },
            };
            wgpu_entries.push(wgpu::BindGroupEntry {
                binding: entry.binding,
                resource,
            });
        }

        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout,
            entries: &wgpu_entries,
        });
        GpuBindGroup::Wgpu(Arc::new(group))
    }

    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDesc<'_>,
    ) -> Result<GpuPipeline, RenderError> {
        let vs = match desc.vs {
            GpuShaderModule::Wgpu(m) => m,
            GpuShaderModule::Null(_) => {
                return Err(RenderError::Internal("foreign shader module".into()))
            }
        };
        let fs = match desc.fs {
            Some(GpuShaderModule::Wgpu(m)) => Some(m.as_ref()),
            Some(GpuShaderModule::Null(_)) => {
                return Err(RenderError::Internal("foreign shader module".into()))
            }
            None => None,
        };

        let layouts: Vec<&wgpu::BindGroupLayout> = desc
            .layouts
            .iter()
            .filter_map(|layout| match layout {
                GpuBindGroupLayout::Wgpu(l) => Some(l.as_ref()),
                GpuBindGroupLayout::Null(_) => None,
            })
            .collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });

        let vertex_attrs: Vec<Vec<wgpu::VertexAttribute>> = desc
            .vertex_buffers
            .iter()
            .map(|buffer| {
                buffer
                    .attributes
                    .iter()
                    .map(|attr| wgpu::VertexAttribute {
                        format: convert_vertex_format(attr.format),
                        offset: attr.offset,
                        shader_location: attr.shader_location,
                    })
                    .collect()
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = desc
            .vertex_buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| wgpu::VertexBufferLayout {
                array_stride: buffer.stride,
                step_mode: convert_step_mode(buffer.step),
                attributes: &vertex_attrs[i],
            })
            .collect();

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .color_targets
            .iter()
            .map(|target| {
                Some(wgpu::ColorTargetState {
                    format: convert_texture_format(target.format),
                    blend: target.blend.map(|blend| wgpu::BlendState {
                        color: wgpu::BlendComponent {
                            src_factor: convert_blend_factor(blend.color.src),
                            dst_factor: convert_blend_factor(blend.color.dst),
                            operation: convert_blend_operation(blend.color.op),
                        },
                        alpha: wgpu::BlendComponent {
                            src_factor: convert_blend_factor(blend.alpha.src),
                            dst_factor: convert_blend_factor(blend.alpha.dst),
                            operation: convert_blend_operation(blend.alpha.op),
                        },
                    }),
                    write_mask: convert_write_mask(target.write_mask),
                })
            })
            .collect();

        let depth_stencil = desc.depth_stencil.map(|ds| wgpu::DepthStencilState {
            format: convert_texture_format(ds.format),
            depth_write_enabled: ds.depth_write,
            depth_compare: convert_compare_function(ds.depth_compare),
            stencil: wgpu::StencilState {
                front: convert_stencil_face(&ds.stencil_front),
                back: convert_stencil_face(&ds.stencil_back),
                read_mask: ds.stencil_read_mask,
                write_mask: ds.stencil_write_mask,
            },
            bias: wgpu::DepthBiasState::default(),
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vs,
                    entry_point: None,
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: fs.map(|module| wgpu::FragmentState {
                    module,
                    entry_point: None,
                    targets: &color_targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: convert_topology(desc.topology),
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: convert_cull_mode(desc.cull),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: desc.sample_count,
                    mask: !0,
                    alpha_to_coverage_enabled: desc.alpha_to_coverage,
                },
                multiview: None,
                cache: None,
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::ResourceCreationFailed(format!(
                "render pipeline '{}': {err}",
                desc.label
            )));
        }
        Ok(GpuPipeline::WgpuRender(Arc::new(pipeline)))
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc<'_>,
    ) -> Result<GpuPipeline, RenderError> {
        let module = match desc.module {
            GpuShaderModule::Wgpu(m) => m,
            GpuShaderModule::Null(_) => {
                return Err(RenderError::Internal("foreign shader module".into()))
            }
        };
        let layouts: Vec<&wgpu::BindGroupLayout> = desc
            .layouts
            .iter()
            .filter_map(|layout| match layout {
                GpuBindGroupLayout::Wgpu(l) => Some(l.as_ref()),
                GpuBindGroupLayout::Null(_) => None,
            })
            .collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&pipeline_layout),
                module,
                entry_point: None,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::ResourceCreationFailed(format!(
                "compute pipeline '{}': {err}",
                desc.label
            )));
        }
        Ok(GpuPipeline::WgpuCompute(Arc::new(pipeline)))
    }

    fn create_query_set(&self, count: u32) -> GpuQuerySet {
        let set = self.device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("occlusion_queries"),
            ty: wgpu::QueryType::Occlusion,
            count,
        });
        GpuQuerySet::Wgpu(Arc::new(set))
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) {
        if let Some(buffer) = wgpu_buffer(buffer) {
            self.queue.write_buffer(buffer, offset, data);
        }
    }

    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Vec<u8> {
        let Some(buffer) = wgpu_buffer(buffer) else {
            return vec![0; size as usize];
        };

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("read_staging"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("read_buffer"),
            });
        encoder.copy_buffer_to_buffer(buffer, offset, &staging, 0, size);
        let idx = self.queue.submit(std::iter::once(encoder.finish()));

        let _ = self.device.poll(wgpu::PollType::Wait {
            submission_index: Some(idx),
            timeout: Some(std::time::Duration::from_secs(10)),
        });

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
        if !matches!(rx.recv(), Ok(Ok(()))) {
            return vec![0; size as usize];
        }
        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        data
    }

    fn begin_encoder(&mut self) {
        debug_assert!(self.encoder.is_none(), "encoder already live");
        self.encoder = Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("frame"),
                }),
        );
    }

    fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }

    fn submit(&mut self) {
        debug_assert!(self.render_pass.is_none() && self.compute_pass.is_none());
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn wait_idle(&mut self) {
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
    }

    fn copy_buffer_to_buffer(
        &mut self,
        src: &GpuBuffer,
        src_offset: u64,
        dst: &GpuBuffer,
        dst_offset: u64,
        size: u64,
    ) {
        let (Some(src), Some(dst)) = (wgpu_buffer(src), wgpu_buffer(dst)) else {
            return;
        };
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.copy_buffer_to_buffer(src, src_offset, dst, dst_offset, size);
        }
    }

    fn copy_buffer_to_texture(
        &mut self,
        src: &GpuBuffer,
        layout: BufferImageLayout,
        dst: &TextureCopyLocation<'_>,
        extent: CopyExtent,
    ) {
        let (Some(src), Some(texture)) = (wgpu_buffer(src), wgpu_texture(dst.texture)) else {
            return;
        };
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.copy_buffer_to_texture(
                wgpu::TexelCopyBufferInfo {
                    buffer: src,
                    layout: buffer_copy_layout(layout),
                },
                texture_copy_info(dst, texture),
                wgpu::Extent3d {
                    width: extent.width,
                    height: extent.height,
                    depth_or_array_layers: extent.depth,
                },
            );
        }
    }

    fn copy_texture_to_texture(
        &mut self,
        src: &TextureCopyLocation<'_>,
        dst: &TextureCopyLocation<'_>,
        extent: CopyExtent,
    ) {
        let (Some(src_tex), Some(dst_tex)) = (wgpu_texture(src.texture), wgpu_texture(dst.texture))
        else {
            return;
        };
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.copy_texture_to_texture(
                texture_copy_info(src, src_tex),
                texture_copy_info(dst, dst_tex),
                wgpu::Extent3d {
                    width: extent.width,
                    height: extent.height,
                    depth_or_array_layers: extent.depth,
                },
            );
        }
    }

    fn copy_texture_to_buffer(
        &mut self,
        src: &TextureCopyLocation<'_>,
        dst: &GpuBuffer,
        layout: BufferImageLayout,
        extent: CopyExtent,
    ) {
        let (Some(src_tex), Some(dst)) = (wgpu_texture(src.texture), wgpu_buffer(dst)) else {
            return;
        };
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.copy_texture_to_buffer(
                texture_copy_info(src, src_tex),
                wgpu::TexelCopyBufferInfo {
                    buffer: dst,
                    layout: buffer_copy_layout(layout),
                },
                wgpu::Extent3d {
                    width: extent.width,
                    height: extent.height,
                    depth_or_array_layers: extent.depth,
                },
            );
        }
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDesc<'_>) {
        debug_assert!(self.render_pass.is_none() && self.compute_pass.is_none());
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };

        let colors: Vec<Option<wgpu::RenderPassColorAttachment>> = desc
            .colors
            .iter()
            .map(|color| {
                let view = wgpu_view(color.view)?;
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: color.resolve.and_then(wgpu_view),
                    ops: wgpu::Operations {
                        load: match color.load {
                            LoadOp::Load => wgpu::LoadOp::Load,
                            LoadOp::Clear([r, g, b, a]) => {
                                wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a })
                            }
                        },
                        store: if color.store {
                            wgpu::StoreOp::Store
                        } else {
                            wgpu::StoreOp::Discard
                        },
                    },
                })
            })
            .collect();

        let depth_stencil = desc.depth.as_ref().and_then(|depth| {
            let view = wgpu_view(depth.view)?;
            Some(wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: match depth.depth_load {
                        LoadOp::Load => wgpu::LoadOp::Load,
                        LoadOp::Clear(value) => wgpu::LoadOp::Clear(value),
                    },
                    store: if depth.depth_store {
                        wgpu::StoreOp::Store
                    } else {
                        wgpu::StoreOp::Discard
                    },
                }),
                stencil_ops: depth.has_stencil.then_some(wgpu::Operations {
                    load: match depth.stencil_load {
                        LoadOp::Load => wgpu::LoadOp::Load,
                        LoadOp::Clear(value) => wgpu::LoadOp::Clear(value),
                    },
                    store: if depth.stencil_store {
                        wgpu::StoreOp::Store
                    } else {
                        wgpu::StoreOp::Discard
                    },
                }),
            })
        });

        let occlusion_query_set = desc.occlusion_queries.and_then(|set| match set {
            GpuQuerySet::Wgpu(qs) => Some(qs.as_ref()),
            GpuQuerySet::Null(_) => None,
        });

        let pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(desc.label),
                color_attachments: &colors,
                depth_stencil_attachment: depth_stencil,
                timestamp_writes: None,
                occlusion_query_set,
            })
            .forget_lifetime();
        self.render_pass = Some(pass);
    }

    fn end_render_pass(&mut self) {
        self.render_pass = None;
    }

    fn set_render_pipeline(&mut self, pipeline: &GpuPipeline) {
        if let (Some(pass), GpuPipeline::WgpuRender(pipeline)) =
            (self.render_pass.as_mut(), pipeline)
        {
            pass.set_pipeline(pipeline);
        }
    }

    fn set_bind_group(&mut self, index: u32, group: &GpuBindGroup, offsets: &[u32]) {
        if let (Some(pass), GpuBindGroup::Wgpu(group)) = (self.render_pass.as_mut(), group) {
            pass.set_bind_group(index, group.as_ref(), offsets);
        }
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: &GpuBuffer, offset: u64) {
        if let (Some(pass), Some(buffer)) = (self.render_pass.as_mut(), wgpu_buffer(buffer)) {
            pass.set_vertex_buffer(slot, buffer.slice(offset..));
        }
    }

    fn set_index_buffer(&mut self, buffer: &GpuBuffer, format: IndexFormat, offset: u64) {
        if let (Some(pass), Some(buffer)) = (self.render_pass.as_mut(), wgpu_buffer(buffer)) {
            pass.set_index_buffer(buffer.slice(offset..), convert_index_format(format));
        }
    }

    fn set_scissor_rect(&mut self, x: u32, y: u32, width: u32, height: u32) {
        if let Some(pass) = self.render_pass.as_mut() {
            pass.set_scissor_rect(x, y, width, height);
        }
    }

    fn set_blend_color(&mut self, color: [f64; 4]) {
        if let Some(pass) = self.render_pass.as_mut() {
            pass.set_blend_constant(wgpu::Color {
                r: color[0],
                g: color[1],
                b: color[2],
                a: color[3],
            });
        }
    }

    fn draw(&mut self, vertices: u32, instances: u32, first_vertex: u32, first_instance: u32) {
        if let Some(pass) = self.render_pass.as_mut() {
            pass.draw(
                first_vertex..first_vertex + vertices,
                first_instance..first_instance + instances,
            );
        }
    }

    fn draw_indexed(
        &mut self,
        indices: u32,
        instances: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) {
        if let Some(pass) = self.render_pass.as_mut() {
            pass.draw_indexed(
                first_index..first_index + indices,
                base_vertex,
                first_instance..first_instance + instances,
            );
        }
    }

    fn begin_occlusion_query(&mut self, index: u32) {
        if let Some(pass) = self.render_pass.as_mut() {
            pass.begin_occlusion_query(index);
        }
    }

    fn end_occlusion_query(&mut self) {
        if let Some(pass) = self.render_pass.as_mut() {
            pass.end_occlusion_query();
        }
    }

    fn begin_compute_pass(&mut self) {
        debug_assert!(self.render_pass.is_none() && self.compute_pass.is_none());
        if let Some(encoder) = self.encoder.as_mut() {
            let pass = encoder
                .begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("compute"),
                    timestamp_writes: None,
                })
                .forget_lifetime();
            self.compute_pass = Some(pass);
        }
    }

    fn end_compute_pass(&mut self) {
        self.compute_pass = None;
    }

    fn set_compute_pipeline(&mut self, pipeline: &GpuPipeline) {
        if let (Some(pass), GpuPipeline::WgpuCompute(pipeline)) =
            (self.compute_pass.as_mut(), pipeline)
        {
            pass.set_pipeline(pipeline);
        }
    }

    fn set_compute_bind_group(&mut self, index: u32, group: &GpuBindGroup, offsets: &[u32]) {
        if let (Some(pass), GpuBindGroup::Wgpu(group)) = (self.compute_pass.as_mut(), group) {
            pass.set_bind_group(index, group.as_ref(), offsets);
        }
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        if let Some(pass) = self.compute_pass.as_mut() {
            pass.dispatch_workgroups(x, y, z);
        }
    }

    fn resolve_occlusion_queries(&mut self, set: &GpuQuerySet, count: u32) -> Vec<u64> {
        let GpuQuerySet::Wgpu(set) = set else {
            return vec![0; count as usize];
        };
        if count == 0 {
            return Vec::new();
        }

        let size = count as u64 * 8;
        let resolve = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("occlusion_resolve"),
            size,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("occlusion_resolve"),
            });
        encoder.resolve_query_set(set, 0..count, &resolve, 0);
        self.queue.submit(std::iter::once(encoder.finish()));

        let bytes = self.read_buffer(&GpuBuffer::Wgpu(Arc::new(resolve)), 0, size);
        bytes
            .chunks_exact(8)
            .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap_or_default()))
            .collect()
    }

    fn create_surface(&self, target: SurfaceTarget) -> Result<GpuSurface, RenderError> {
        match target {
            SurfaceTarget::Headless => Err(RenderError::InvalidParameter(
                "wgpu backend needs a window for surfaces".into(),
            )),
            SurfaceTarget::Window { window, display } => {
                let surface = unsafe {
                    self.instance
                        .create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                            raw_display_handle: display,
                            raw_window_handle: window,
                        })
                }
                .map_err(|e| {
                    RenderError::InitializationFailed(format!("surface creation failed: {e}"))
                })?;
                Ok(GpuSurface::Wgpu(WgpuSurface {
                    surface,
                    current: Mutex::new(None),
                }))
            }
        }
    }

    fn configure_surface(
        &self,
        surface: &GpuSurface,
        width: u32,
        height: u32,
        format: TextureFormat,
        vsync: bool,
    ) {
        let GpuSurface::Wgpu(surface) = surface else {
            return;
        };
        surface.surface.configure(
            &self.device,
            &wgpu::SurfaceConfiguration {
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                format: convert_texture_format(format),
                width,
                height,
                present_mode: if vsync {
                    wgpu::PresentMode::Fifo
                } else {
                    wgpu::PresentMode::Immediate
                },
                alpha_mode: wgpu::CompositeAlphaMode::Auto,
                view_formats: vec![],
                desired_maximum_frame_latency: 2,
            },
        );
        log::info!("configured surface {width}x{height} {format:?}");
    }

    fn acquire_surface_view(
        &mut self,
        surface: &GpuSurface,
    ) -> Result<GpuTextureView, RenderError> {
        let GpuSurface::Wgpu(surface) = surface else {
            return Err(RenderError::Internal("foreign surface".into()));
        };
        let texture = surface
            .surface
            .get_current_texture()
            .map_err(|_| RenderError::SurfaceLost)?;
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        if let Ok(mut guard) = surface.current.lock() {
            *guard = Some(texture);
        }
        Ok(GpuTextureView::Wgpu(Arc::new(view)))
    }

    fn present(&mut self, surface: &GpuSurface) {
        let GpuSurface::Wgpu(surface) = surface else {
            return;
        };
        let texture = surface.current.lock().ok().and_then(|mut guard| guard.take());
        if let Some(texture) = texture {
            texture.present();
        }
    }
}
