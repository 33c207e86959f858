//! Pipeline state cache.
//!
//! Compiled pipelines are expensive; this cache keys them by a content
//! hash over exactly the state that affects pipeline shape: the masked
//! state word, stencil word, blend-factor word (only under independent
//! blending), instance stride, target pixel-format hash, shader hashes
//! and vertex layout hashes. Repeated lookups with the same inputs return
//! the same compiled object for the renderer's lifetime.

use std::collections::HashMap;

use xxhash_rust::xxh3::Xxh3;

use crate::backend::{
    BlendComponent, BlendDesc, ColorTargetDesc, ComputePipelineDesc, DepthStencilDesc,
    GpuPipeline, RenderBackend, RenderPipelineDesc, VertexAttributeDesc, VertexBufferDesc,
};
use crate::error::RenderError;
use crate::resources::program::Program;
use crate::types::state::{
    decode_independent_blend, CompareFunction, PrimInfo, RenderState, StencilFace, StencilState,
};
use crate::types::texture::TextureFormat;
use crate::types::vertex::{VertexFormat, VertexLayout, VertexStepMode};

/// A compiled pipeline plus compute thread-group metadata.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub pipeline: GpuPipeline,
    pub thread_counts: [u16; 3],
}

/// The attachment formats of the target a pipeline renders into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFormats {
    pub colors: Vec<TextureFormat>,
    pub depth: Option<TextureFormat>,
    pub sample_count: u32,
    /// Hash over everything above; folded into pipeline keys.
    pub hash: u64,
}

impl TargetFormats {
    pub fn new(colors: Vec<TextureFormat>, depth: Option<TextureFormat>, sample_count: u32) -> Self {
        let mut hasher = Xxh3::new();
        hasher.update(&(colors.len() as u32).to_le_bytes());
        for format in &colors {
            hasher.update(&[*format as u8]);
        }
        hasher.update(&[depth.map(|f| f as u8).unwrap_or(0xff)]);
        hasher.update(&sample_count.to_le_bytes());
        Self {
            colors,
            depth,
            sample_count,
            hash: hasher.digest(),
        }
    }
}

/// Hash-keyed cache of compiled render pipelines.
#[derive(Default)]
pub struct PipelineCache {
    map: HashMap<u64, PipelineState>,
    compiles: u64,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Total device compiles performed (cache misses).
    pub fn compile_count(&self) -> u64 {
        self.compiles
    }

    /// Drop every cached pipeline.
    pub fn invalidate(&mut self) {
        self.map.clear();
    }

    /// The cache key for a draw's pipeline-affecting inputs.
    #[allow(clippy::too_many_arguments)]
    pub fn state_hash(
        state: RenderState,
        stencil: StencilState,
        rgba: u32,
        targets: &TargetFormats,
        program: &Program,
        layouts: &[&VertexLayout],
        instance_stride: u16,
    ) -> u64 {
        let masked = state.masked(RenderState::PIPELINE_MASK);
        let mut hasher = Xxh3::new();
        hasher.update(&masked.0.to_le_bytes());
        hasher.update(&stencil.0.to_le_bytes());
        hasher.update(&if masked.independent_blend() { rgba } else { 0 }.to_le_bytes());
        hasher.update(&instance_stride.to_le_bytes());
        hasher.update(&targets.hash.to_le_bytes());
        hasher.update(&program.vs_hash.to_le_bytes());
        if let Some(fs_hash) = program.fs_hash {
            hasher.update(&fs_hash.to_le_bytes());
        }
        for layout in layouts {
            hasher.update(&layout.hash().to_le_bytes());
        }
        hasher.digest()
    }

    /// Look up or compile the pipeline for a draw.
    #[allow(clippy::too_many_arguments)]
    pub fn get_or_create(
        &mut self,
        backend: &dyn RenderBackend,
        program: &Program,
        targets: &TargetFormats,
        state: RenderState,
        stencil: StencilState,
        rgba: u32,
        layouts: &[&VertexLayout],
        instance_stride: u16,
    ) -> Result<&PipelineState, RenderError> {
        let hash = Self::state_hash(
            state,
            stencil,
            rgba,
            targets,
            program,
            layouts,
            instance_stride,
        );

        if !self.map.contains_key(&hash) {
            let pipeline = compile_render_pipeline(
                backend,
                program,
                targets,
                state,
                stencil,
                rgba,
                layouts,
                instance_stride,
                hash,
            )?;
            self.compiles += 1;
            self.map.insert(
                hash,
                PipelineState {
                    pipeline,
                    thread_counts: [1, 1, 1],
                },
            );
        }

        self.map
            .get(&hash)
            .ok_or_else(|| RenderError::Internal("pipeline cache lookup failed".to_string()))
    }

    /// The compute pipeline of a program, compiled on first use.
    ///
    /// A compute program has exactly one pipeline shape, so it is cached
    /// on the program itself rather than hash-keyed here.
    pub fn compute_pipeline<'a>(
        backend: &dyn RenderBackend,
        program: &'a mut Program,
    ) -> Result<&'a PipelineState, RenderError> {
        if program.compute.is_none() {
            let layouts = [
                &program.uniforms_layout,
                &program.textures_layout,
                &program.samplers_layout,
            ];
            let pipeline = backend.create_compute_pipeline(&ComputePipelineDesc {
                label: "compute_pso",
                module: &program.vs_module,
                layouts: &layouts,
            })?;
            log::trace!("compiled compute pipeline ({:?} threads)", program.thread_counts);
            program.compute = Some(PipelineState {
                pipeline,
                thread_counts: program.thread_counts,
            });
        }
        match &program.compute {
            Some(state) => Ok(state),
            None => Err(RenderError::Internal("compute pipeline missing".to_string())),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn compile_render_pipeline(
    backend: &dyn RenderBackend,
    program: &Program,
    targets: &TargetFormats,
    state: RenderState,
    stencil: StencilState,
    rgba: u32,
    layouts: &[&VertexLayout],
    instance_stride: u16,
    hash: u64,
) -> Result<GpuPipeline, RenderError> {
    let masked = state.masked(RenderState::PIPELINE_MASK);
    let independent = masked.independent_blend();
    let write_mask = masked.write_mask();

    // Shared blend state from the state word; attachment 0 always uses it.
    let base_blend = if masked.blend_enabled() {
        let (src, dst, op) = masked.blend_rgb();
        let (src_a, dst_a, op_a) = masked.blend_alpha();
        Some(BlendDesc {
            color: BlendComponent { src, dst, op },
            alpha: BlendComponent {
                src: src_a,
                dst: dst_a,
                op: op_a,
            },
        })
    } else {
        None
    };

    let color_targets: Vec<ColorTargetDesc> = targets
        .colors
        .iter()
        .enumerate()
        .map(|(i, format)| {
            let blend = if independent && i >= 1 {
                // Attachments 1..N decode their own 11-bit blend group
                // from the blend-factor word.
                let group = rgba >> (11 * (i as u32 - 1));
                if group & 0x7ff != 0 {
                    let (src, dst, op) = decode_independent_blend(group);
                    Some(BlendDesc {
                        color: BlendComponent { src, dst, op },
                        alpha: BlendComponent { src, dst, op },
                    })
                } else {
                    None
                }
            } else {
                base_blend
            };
            ColorTargetDesc {
                format: *format,
                blend,
                write_mask,
            }
        })
        .collect();

    let depth_stencil = targets.depth.map(|format| {
        let (front, back, read_mask) = if stencil.enabled() {
            let front = stencil.front();
            let back = stencil.back();
            let read_mask = front.read_mask as u32;
            (front, back, read_mask)
        } else {
            (StencilFace::default(), StencilFace::default(), 0xff)
        };
        DepthStencilDesc {
            format,
            depth_write: masked.depth_write(),
            depth_compare: masked.depth_test().unwrap_or(CompareFunction::Always),
            stencil_front: front,
            stencil_back: back,
            stencil_read_mask: read_mask,
            stencil_write_mask: 0xff,
        }
    });

    // Vertex state: walk the shader's attribute-remap table against each
    // stream's layout; attributes the shader does not consume are skipped.
    let mut vertex_buffers: Vec<VertexBufferDesc> = Vec::with_capacity(layouts.len() + 1);
    for layout in layouts {
        let mut attributes = Vec::new();
        for (kind, attrib) in layout.attribs() {
            let Some(location) = program.attr_remap[kind as usize] else {
                continue;
            };
            attributes.push(VertexAttributeDesc {
                format: attrib.device_format(),
                offset: attrib.offset as u64,
                shader_location: location as u32,
            });
        }
        vertex_buffers.push(VertexBufferDesc {
            stride: layout.stride() as u64,
            step: VertexStepMode::Vertex,
            attributes,
        });
    }

    // Instance data rides a trailing per-instance stream: float4 registers
    // at the locations after the shader's vertex attributes.
    if instance_stride > 0 {
        let num = (instance_stride / 16) as u32;
        let attributes = (0..num)
            .map(|i| VertexAttributeDesc {
                format: VertexFormat::Float4,
                offset: i as u64 * 16,
                shader_location: program.num_attrs as u32 + i,
            })
            .collect();
        vertex_buffers.push(VertexBufferDesc {
            stride: instance_stride as u64,
            step: VertexStepMode::Instance,
            attributes,
        });
    }

    let prim = PrimInfo::from_index(masked.topology_index());
    let label = format!("pso_{hash:016x}");

    log::trace!(
        "compiling pipeline {label}: {} colors, depth {:?}, {} streams, {:?}",
        color_targets.len(),
        targets.depth,
        layouts.len(),
        prim.topology,
    );

    let vertex_layouts_used: usize = vertex_buffers.len();
    debug_assert!(vertex_layouts_used <= crate::MAX_VERTEX_STREAMS + 1);

    backend.create_render_pipeline(&RenderPipelineDesc {
        label: &label,
        vs: &program.vs_module,
        fs: program.fs_module.as_ref(),
        layouts: &[
            &program.uniforms_layout,
            &program.textures_layout,
            &program.samplers_layout,
        ],
        vertex_buffers: &vertex_buffers,
        color_targets: &color_targets,
        depth_stencil,
        topology: prim.topology,
        cull: masked.cull_mode(),
        sample_count: targets.sample_count,
        alpha_to_coverage: masked.alpha_to_coverage(),
    })
}
