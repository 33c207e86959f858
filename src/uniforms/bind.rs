//! Per-draw bind-state allocation.
//!
//! A [`BindState`] is the realized form of one draw's resource bindings:
//! the uniform bind group (scratch buffer ranges bound with dynamic
//! offsets), the texture group and the sampler group. Bind states live in
//! the frame slot's scratch arena and die when it resets; consecutive
//! draws whose binding-table hash and program layout hash both match reuse
//! the previous bind state instead of allocating a new one.

use crate::backend::{
    BindGroupEntry, BindingResource, GpuBindGroup, GpuBuffer, RenderBackend,
};
use crate::frame::{Binding, ResourceBindings};
use crate::handle::HandlePool;
use crate::resources::program::Program;
use crate::resources::sampler_cache::SamplerCache;
use crate::resources::texture::Texture;

use super::UniformRegistry;

/// Realized descriptor groups for one draw.
#[derive(Debug, Clone)]
pub struct BindState {
    pub uniforms: GpuBindGroup,
    pub textures: GpuBindGroup,
    pub samplers: GpuBindGroup,
    /// Number of dynamic offsets the uniform group expects.
    pub num_offsets: u32,
}

/// Build the three bind groups for one draw or dispatch.
///
/// Binding 0 of the uniform group is the vertex-stage constant range;
/// binding 1 is the fragment range, present only when the fragment shader
/// has a nonzero constant block. Texture/sampler pairs follow the
/// program's sampler table; the stage each slot reads is resolved through
/// the sampler uniform's registered value, falling back to declaration
/// order.
#[allow(clippy::too_many_arguments)]
pub fn alloc_bind_state(
    backend: &dyn RenderBackend,
    program: &Program,
    textures: &mut HandlePool<Texture>,
    samplers: &mut SamplerCache,
    registry: &UniformRegistry,
    bindings: &ResourceBindings,
    scratch_buffer: &GpuBuffer,
    vs_size: u32,
    fs_size: u32,
) -> BindState {
    let mut uniform_entries = Vec::with_capacity(2);
    if vs_size > 0 {
        uniform_entries.push(BindGroupEntry {
            binding: 0,
            resource: BindingResource::UniformBuffer {
                buffer: scratch_buffer,
                offset: 0,
                size: vs_size as u64,
            },
        });
    }
    if fs_size > 0 {
        uniform_entries.push(BindGroupEntry {
            binding: 1,
            resource: BindingResource::UniformBuffer {
                buffer: scratch_buffer,
                offset: 0,
                size: fs_size as u64,
            },
        });
    }
    let num_offsets = uniform_entries.len() as u32;

    // Resolve every sampler slot to a texture view + sampler pair before
    // building the groups; mip views may need to be materialized first.
    let mut resolved: Vec<(u32, crate::backend::GpuTextureView, crate::backend::GpuSampler)> =
        Vec::with_capacity(program.samplers.len());

    for (slot_index, slot) in program.samplers.iter().enumerate() {
        let stage = slot
            .uniform
            .and_then(|u| registry.stage_index(u))
            .unwrap_or(slot_index as u32) as usize;

        let Some(binding) = bindings.entries.get(stage) else {
            continue;
        };

        match binding {
            Binding::Texture { texture, sampler } => {
                let Some(tex) = textures.get(*texture) else {
                    log::warn!("draw binds dead texture at stage {stage}");
                    continue;
                };
                let gpu_sampler = if sampler.uses_internal_default() {
                    tex.sampler.clone()
                } else {
                    samplers.get(backend, *sampler)
                };
                resolved.push((slot.binding, tex.view.clone(), gpu_sampler));
            }
            Binding::Image { texture, mip } => {
                let Some(tex) = textures.get_mut(*texture) else {
                    log::warn!("dispatch binds dead image at stage {stage}");
                    continue;
                };
                let view = tex.mip_view(backend, *mip);
                let sampler = tex.sampler.clone();
                resolved.push((slot.binding, view, sampler));
            }
            Binding::None | Binding::Buffer { .. } => {}
        }
    }

    let texture_entries: Vec<BindGroupEntry> = resolved
        .iter()
        .map(|(binding, view, _)| BindGroupEntry {
            binding: *binding,
            resource: BindingResource::Texture(view),
        })
        .collect();
    let sampler_entries: Vec<BindGroupEntry> = resolved
        .iter()
        .map(|(binding, _, sampler)| BindGroupEntry {
            binding: *binding,
            resource: BindingResource::Sampler(sampler),
        })
        .collect();

    BindState {
        uniforms: backend.create_bind_group(&program.uniforms_layout, &uniform_entries),
        textures: backend.create_bind_group(&program.textures_layout, &texture_entries),
        samplers: backend.create_bind_group(&program.samplers_layout, &sampler_entries),
        num_offsets,
    }
}
