//! Linked shader programs and their merged descriptor layouts.

use xxhash_rust::xxh3::Xxh3;

use crate::backend::{
    BindLayoutEntry, BindingKind, GpuBindGroupLayout, GpuShaderModule, RenderBackend, StageFlags,
};
use crate::error::RenderError;
use crate::pipeline::PipelineState;
use crate::shader::{PredefinedRef, ShaderKind};
use crate::types::vertex::VertexAttribKind;
use crate::uniforms::{UniformHandle, UniformRegistry};

use super::Shader;

/// One texture/sampler slot of a program, merged from its shaders.
#[derive(Debug, Clone)]
pub struct ProgramSampler {
    /// Binding register inside the texture and sampler bind groups.
    pub binding: u32,
    /// The sampler uniform whose value names the texture stage to read.
    pub uniform: Option<UniformHandle>,
    pub fragment: bool,
}

/// A linked vertex+fragment pair, or a compute program.
///
/// Owns the merged bind-group layouts; shares (does not own) the shader
/// modules through their refcounted handles.
pub struct Program {
    pub vs_module: GpuShaderModule,
    pub fs_module: Option<GpuShaderModule>,
    pub vs_hash: u64,
    pub fs_hash: Option<u64>,
    /// Aligned constant-block sizes per stage.
    pub vs_const_size: u32,
    pub fs_const_size: u32,
    /// Vertex attribute kind -> shader input location (vertex stage).
    pub attr_remap: [Option<u8>; VertexAttribKind::COUNT],
    pub num_attrs: u8,
    /// Merged predefined uniforms of both stages.
    pub predefined: Vec<PredefinedRef>,
    /// Concatenated sampler tables (vertex stage first).
    pub samplers: Vec<ProgramSampler>,
    pub uniforms_layout: GpuBindGroupLayout,
    pub textures_layout: GpuBindGroupLayout,
    pub samplers_layout: GpuBindGroupLayout,
    /// Hash of the merged layout shape, for bind-state deduplication.
    pub layout_hash: u64,
    pub is_compute: bool,
    pub thread_counts: [u16; 3],
    /// Lazily compiled compute pipeline; a compute program has exactly
    /// one pipeline shape, so it is cached here rather than hash-keyed.
    pub compute: Option<PipelineState>,
}

impl Program {
    /// Link a program from a vertex (or compute) shader and an optional
    /// fragment shader.
    pub fn create(
        backend: &dyn RenderBackend,
        vsh: &Shader,
        fsh: Option<&Shader>,
        registry: &UniformRegistry,
    ) -> Result<Self, RenderError> {
        let is_compute = vsh.blob.kind == ShaderKind::Compute;
        if !is_compute && vsh.blob.kind != ShaderKind::Vertex {
            return Err(RenderError::InvalidParameter(
                "program first stage must be a vertex or compute shader".to_string(),
            ));
        }

        let stage_vis = |fragment: bool| {
            if is_compute {
                StageFlags::COMPUTE
            } else if fragment {
                StageFlags::FRAGMENT
            } else {
                StageFlags::VERTEX
            }
        };

        let vs_const_size = vsh.blob.const_size;
        let fs_const_size = fsh.map(|f| f.blob.const_size).unwrap_or(0);

        // Uniform group: binding 0 is the vertex (or compute) constant
        // range, binding 1 the fragment range when present. Both use
        // dynamic offsets into the scratch arena.
        let mut uniform_entries = Vec::with_capacity(2);
        if vs_const_size > 0 {
            uniform_entries.push(BindLayoutEntry {
                binding: 0,
                visibility: stage_vis(false),
                kind: BindingKind::UniformBuffer {
                    dynamic_offset: true,
                },
            });
        }
        if fs_const_size > 0 {
            uniform_entries.push(BindLayoutEntry {
                binding: 1,
                visibility: StageFlags::FRAGMENT,
                kind: BindingKind::UniformBuffer {
                    dynamic_offset: true,
                },
            });
        }

        // Merged sampler table: vertex-stage slots first, then fragment.
        let mut samplers = Vec::new();
        let mut texture_entries = Vec::new();
        let mut sampler_entries = Vec::new();
        for (shader, fragment) in std::iter::once((vsh, false)).chain(fsh.map(|f| (f, true))) {
            for slot in &shader.blob.samplers {
                let binding = slot.reg_index as u32;
                texture_entries.push(BindLayoutEntry {
                    binding,
                    visibility: stage_vis(fragment),
                    kind: BindingKind::SampledTexture {
                        multisampled: false,
                    },
                });
                sampler_entries.push(BindLayoutEntry {
                    binding,
                    visibility: stage_vis(fragment),
                    kind: BindingKind::Sampler { comparison: false },
                });
                samplers.push(ProgramSampler {
                    binding,
                    uniform: registry.find(&slot.name),
                    fragment,
                });
            }
        }

        let mut predefined: Vec<PredefinedRef> = vsh.blob.predefined.clone();
        if let Some(fsh) = fsh {
            predefined.extend(fsh.blob.predefined.iter().copied());
        }

        let uniforms_layout = backend.create_bind_group_layout(&uniform_entries);
        let textures_layout = backend.create_bind_group_layout(&texture_entries);
        let samplers_layout = backend.create_bind_group_layout(&sampler_entries);

        let mut hasher = Xxh3::new();
        hasher.update(&(uniform_entries.len() as u32).to_le_bytes());
        for entry in &texture_entries {
            hasher.update(&entry.binding.to_le_bytes());
            hasher.update(&[entry.visibility.bits()]);
        }
        let layout_hash = hasher.digest();

        log::trace!(
            "linked {} program: {} samplers, vs {} / fs {} const bytes",
            if is_compute { "compute" } else { "graphics" },
            samplers.len(),
            vs_const_size,
            fs_const_size,
        );

        Ok(Self {
            vs_module: vsh.module.clone(),
            fs_module: fsh.map(|f| f.module.clone()),
            vs_hash: vsh.blob.hash,
            fs_hash: fsh.map(|f| f.blob.hash),
            vs_const_size,
            fs_const_size,
            attr_remap: vsh.blob.attr_remap,
            num_attrs: vsh.blob.num_attrs,
            predefined,
            samplers,
            uniforms_layout,
            textures_layout,
            samplers_layout,
            layout_hash,
            is_compute,
            thread_counts: vsh.blob.thread_counts,
            compute: None,
        })
    }

    /// Dynamic-offset count the uniform bind group expects.
    pub fn num_uniform_bindings(&self) -> u32 {
        (self.vs_const_size > 0) as u32 + (self.fs_const_size > 0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NullBackend, RenderBackend};
    use crate::shader::{ShaderBlob, ShaderBlobWriter, ShaderKind, UniformType};

    fn make_shader(backend: &dyn RenderBackend, bytes: &[u8]) -> Shader {
        let blob = ShaderBlob::parse(bytes).unwrap();
        let module = backend.create_shader_module(&blob.code, "test").unwrap();
        Shader { blob, module }
    }

    fn vertex_shader(backend: &dyn RenderBackend) -> Shader {
        make_shader(
            backend,
            &ShaderBlobWriter::new(ShaderKind::Vertex)
                .uniform("u_viewProj", UniformType::Mat4, 1, 0)
                .code(b"@vertex fn main() {}")
                .attr(VertexAttribKind::Position)
                .const_size(64)
                .build(),
        )
    }

    fn fragment_shader(backend: &dyn RenderBackend) -> Shader {
        make_shader(
            backend,
            &ShaderBlobWriter::new(ShaderKind::Fragment)
                .sampler("s_albedo", 0)
                .uniform("u_tint", UniformType::Vec4, 1, 0)
                .code(b"@fragment fn main() {}")
                .const_size(16)
                .build(),
        )
    }

    #[test]
    fn test_link_graphics_program() {
        let backend = NullBackend::new();
        let registry = UniformRegistry::new(16);
        let vsh = vertex_shader(&backend);
        let fsh = fragment_shader(&backend);

        let program = Program::create(&backend, &vsh, Some(&fsh), &registry).unwrap();
        assert!(!program.is_compute);
        assert_eq!(program.vs_const_size, 64);
        assert_eq!(program.fs_const_size, 16);
        assert_eq!(program.num_uniform_bindings(), 2);
        assert_eq!(program.samplers.len(), 1);
        assert_eq!(program.predefined.len(), 1);
        // Three merged layouts created.
        assert_eq!(backend.stats().bind_group_layouts_created, 3);
    }

    #[test]
    fn test_vertex_only_program_has_one_uniform_binding() {
        let backend = NullBackend::new();
        let registry = UniformRegistry::new(16);
        let vsh = vertex_shader(&backend);

        let program = Program::create(&backend, &vsh, None, &registry).unwrap();
        assert_eq!(program.num_uniform_bindings(), 1);
        assert!(program.fs_module.is_none());
        assert!(program.fs_hash.is_none());
    }

    #[test]
    fn test_layout_hash_differs_with_sampler_set() {
        let backend = NullBackend::new();
        let registry = UniformRegistry::new(16);
        let vsh = vertex_shader(&backend);
        let fsh = fragment_shader(&backend);

        let with_sampler = Program::create(&backend, &vsh, Some(&fsh), &registry).unwrap();
        let without = Program::create(&backend, &vsh, None, &registry).unwrap();
        assert_ne!(with_sampler.layout_hash, without.layout_hash);
    }

    #[test]
    fn test_compute_program() {
        let backend = NullBackend::new();
        let registry = UniformRegistry::new(16);
        let csh = make_shader(
            &backend,
            &ShaderBlobWriter::new(ShaderKind::Compute)
                .thread_counts(8, 8, 1)
                .code(b"@compute fn main() {}")
                .const_size(32)
                .build(),
        );

        let program = Program::create(&backend, &csh, None, &registry).unwrap();
        assert!(program.is_compute);
        assert_eq!(program.thread_counts, [8, 8, 1]);
        assert!(program.compute.is_none());
    }

    #[test]
    fn test_sampler_uniform_resolved_from_registry() {
        let backend = NullBackend::new();
        let mut registry = UniformRegistry::new(16);
        let stage = registry.create("s_albedo", UniformType::Sampler, 1).unwrap();

        let vsh = vertex_shader(&backend);
        let fsh = fragment_shader(&backend);
        let program = Program::create(&backend, &vsh, Some(&fsh), &registry).unwrap();
        assert_eq!(program.samplers[0].uniform, Some(stage));
    }
}
