//! Uniform registry, staging area and opcode-stream commit.
//!
//! Shader constants flow in three steps each draw:
//!
//! 1. the frame's uniform-update log is decoded into the CPU staging
//!    area ([`StagingUniforms`]) at the registers the shader reflected;
//! 2. predefined uniforms (view/projection/model) are written from
//!    per-view state the same way;
//! 3. the staged bytes are copied into the current frame's scratch arena
//!    slot, and the resulting offsets become dynamic offsets of the
//!    uniform bind group.

pub mod bind;
pub mod scratch;

pub use bind::BindState;
pub use scratch::{ScratchAlloc, ScratchBuffer};

use std::collections::HashMap;

use crate::error::RenderError;
use crate::frame::UniformOp;
use crate::handle::{Handle, HandlePool};
use crate::shader::{PredefinedRef, PredefinedUniform, UniformType};

/// A registered uniform: a named CPU-side value draws can reference
/// indirectly from the uniform log.
#[derive(Debug, Clone)]
pub struct Uniform {
    pub name: String,
    pub ty: UniformType,
    pub num: u16,
    data: Vec<u8>,
}

impl Uniform {
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Handle to a registered uniform.
pub type UniformHandle = Handle<Uniform>;

/// Registry of named uniforms.
///
/// Sampler uniforms hold the texture stage index their program samplers
/// read from; value uniforms hold raw constant bytes.
pub struct UniformRegistry {
    pool: HandlePool<Uniform>,
    by_name: HashMap<String, UniformHandle>,
}

impl UniformRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: HandlePool::new(capacity, "uniform"),
            by_name: HashMap::new(),
        }
    }

    /// Register a uniform; re-registering a name replaces the old value.
    pub fn create(
        &mut self,
        name: &str,
        ty: UniformType,
        num: u16,
    ) -> Result<UniformHandle, RenderError> {
        if let Some(&existing) = self.by_name.get(name) {
            self.pool.remove(existing);
        }
        let size = (ty.byte_size() as usize * num as usize + 15) & !15;
        let handle = self.pool.insert(Uniform {
            name: name.to_string(),
            ty,
            num,
            data: vec![0; size.max(16)],
        })?;
        self.by_name.insert(name.to_string(), handle);
        log::trace!("registered uniform '{name}' ({ty:?} x {num})");
        Ok(handle)
    }

    pub fn destroy(&mut self, handle: UniformHandle) {
        if let Some(uniform) = self.pool.remove(handle) {
            self.by_name.remove(&uniform.name);
        }
    }

    /// Overwrite the stored value (clamped to the registered size).
    pub fn update(&mut self, handle: UniformHandle, data: &[u8]) {
        if let Some(uniform) = self.pool.get_mut(handle) {
            let len = data.len().min(uniform.data.len());
            uniform.data[..len].copy_from_slice(&data[..len]);
        }
    }

    pub fn find(&self, name: &str) -> Option<UniformHandle> {
        self.by_name.get(name).copied().filter(|&h| self.pool.contains(h))
    }

    pub fn get(&self, handle: UniformHandle) -> Option<&Uniform> {
        self.pool.get(handle)
    }

    /// A sampler uniform's value interpreted as a texture stage index.
    pub fn stage_index(&self, handle: UniformHandle) -> Option<u32> {
        let uniform = self.pool.get(handle)?;
        let bytes = uniform.data.get(..4)?;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }
}

/// Per-view transform state feeding the predefined uniforms.
#[derive(Debug, Clone, Copy)]
pub struct ViewTransforms {
    pub view: [f32; 16],
    pub proj: [f32; 16],
}

impl Default for ViewTransforms {
    fn default() -> Self {
        Self {
            view: IDENTITY,
            proj: IDENTITY,
        }
    }
}

pub(crate) const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Column-major 4x4 multiply, `a * b`.
pub(crate) fn mul_mtx(a: &[f32; 16], b: &[f32; 16]) -> [f32; 16] {
    let mut out = [0.0f32; 16];
    for col in 0..4 {
        for row in 0..4 {
            let mut sum = 0.0;
            for k in 0..4 {
                sum += a[k * 4 + row] * b[col * 4 + k];
            }
            out[col * 4 + row] = sum;
        }
    }
    out
}

/// CPU staging for the current draw's vertex and fragment constants.
pub struct StagingUniforms {
    vs: Vec<u8>,
    fs: Vec<u8>,
}

impl StagingUniforms {
    /// One register is 16 bytes; shaders address constants by register.
    pub const REGISTER_SIZE: usize = 16;

    pub fn new(registers_per_stage: usize) -> Self {
        Self {
            vs: vec![0; registers_per_stage * Self::REGISTER_SIZE],
            fs: vec![0; registers_per_stage * Self::REGISTER_SIZE],
        }
    }

    pub fn vs_bytes(&self, size: u32) -> &[u8] {
        &self.vs[..(size as usize).min(self.vs.len())]
    }

    pub fn fs_bytes(&self, size: u32) -> &[u8] {
        &self.fs[..(size as usize).min(self.fs.len())]
    }

    /// Write raw data at a register index in one stage's staging block.
    pub fn write(&mut self, fragment: bool, reg_index: u16, data: &[u8]) {
        let target = if fragment { &mut self.fs } else { &mut self.vs };
        let offset = reg_index as usize * Self::REGISTER_SIZE;
        if offset >= target.len() {
            return;
        }
        let len = data.len().min(target.len() - offset);
        target[offset..offset + len].copy_from_slice(&data[..len]);
    }

    /// Write a value, expanding 3x3 matrices to the 3-register layout
    /// constant blocks use (each column padded to one register).
    pub fn write_typed(&mut self, ty: UniformType, fragment: bool, reg_index: u16, data: &[u8]) {
        if ty == UniformType::Mat3 && data.len() >= 36 {
            let mut expanded = [0u8; 48];
            for col in 0..3 {
                expanded[col * 16..col * 16 + 12]
                    .copy_from_slice(&data[col * 12..col * 12 + 12]);
            }
            self.write(fragment, reg_index, &expanded);
        } else {
            self.write(fragment, reg_index, data);
        }
    }

    /// Decode a slice of the frame's uniform log into the staging blocks.
    pub fn commit_ops(&mut self, ops: &[UniformOp], registry: &UniformRegistry) {
        for op in ops {
            match op {
                UniformOp::Set {
                    ty,
                    loc,
                    fragment,
                    data,
                } => self.write_typed(*ty, *fragment, *loc, data),
                UniformOp::SetRef {
                    ty,
                    loc,
                    fragment,
                    uniform,
                } => {
                    if let Some(value) = registry.get(*uniform) {
                        self.write_typed(*ty, *fragment, *loc, value.data());
                    }
                }
            }
        }
    }

    /// Write the predefined uniforms a program references.
    pub fn commit_predefined(
        &mut self,
        predefined: &[PredefinedRef],
        transforms: &ViewTransforms,
        model: &[f32; 16],
    ) {
        for entry in predefined {
            let value = match entry.which {
                PredefinedUniform::View => transforms.view,
                PredefinedUniform::Proj => transforms.proj,
                PredefinedUniform::ViewProj => mul_mtx(&transforms.proj, &transforms.view),
                PredefinedUniform::Model => *model,
            };
            self.write(entry.fragment, entry.reg_index, bytemuck::cast_slice(&value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_create_find_update() {
        let mut registry = UniformRegistry::new(16);
        let tint = registry.create("u_tint", UniformType::Vec4, 1).unwrap();
        assert_eq!(registry.find("u_tint"), Some(tint));

        registry.update(tint, bytemuck::cast_slice(&[1.0f32, 0.5, 0.25, 1.0]));
        let value: &[f32] = bytemuck::cast_slice(registry.get(tint).unwrap().data());
        assert_eq!(value[1], 0.5);
    }

    #[test]
    fn test_registry_replaces_on_rename() {
        let mut registry = UniformRegistry::new(16);
        let first = registry.create("u_x", UniformType::Vec4, 1).unwrap();
        let second = registry.create("u_x", UniformType::Vec4, 1).unwrap();
        assert!(registry.get(first).is_none());
        assert_eq!(registry.find("u_x"), Some(second));
    }

    #[test]
    fn test_sampler_stage_index() {
        let mut registry = UniformRegistry::new(16);
        let s = registry.create("s_albedo", UniformType::Sampler, 1).unwrap();
        registry.update(s, &3u32.to_le_bytes());
        assert_eq!(registry.stage_index(s), Some(3));
    }

    #[test]
    fn test_staging_write_at_register() {
        let mut staging = StagingUniforms::new(64);
        staging.write(false, 2, &[7u8; 16]);
        assert_eq!(staging.vs_bytes(64)[32], 7);
        assert_eq!(staging.vs_bytes(64)[31], 0);
        // Fragment staging untouched.
        assert_eq!(staging.fs_bytes(64)[32], 0);
    }

    #[test]
    fn test_mat3_expansion() {
        let mut staging = StagingUniforms::new(16);
        let m: [f32; 9] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        staging.write_typed(UniformType::Mat3, false, 0, bytemuck::cast_slice(&m));
        let out: &[f32] = bytemuck::cast_slice(staging.vs_bytes(48));
        // Each column lands on a 16-byte register boundary.
        assert_eq!(&out[0..3], &[1.0, 2.0, 3.0]);
        assert_eq!(&out[4..7], &[4.0, 5.0, 6.0]);
        assert_eq!(&out[8..11], &[7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_commit_ops_inline_and_ref() {
        let mut registry = UniformRegistry::new(16);
        let color = registry.create("u_color", UniformType::Vec4, 1).unwrap();
        registry.update(color, bytemuck::cast_slice(&[9.0f32, 8.0, 7.0, 6.0]));

        let ops = vec![
            UniformOp::Set {
                ty: UniformType::Vec4,
                loc: 0,
                fragment: false,
                data: bytemuck::cast_slice(&[1.0f32, 2.0, 3.0, 4.0]).to_vec(),
            },
            UniformOp::SetRef {
                ty: UniformType::Vec4,
                loc: 1,
                fragment: false,
                uniform: color,
            },
        ];

        let mut staging = StagingUniforms::new(16);
        staging.commit_ops(&ops, &registry);
        let out: &[f32] = bytemuck::cast_slice(staging.vs_bytes(32));
        assert_eq!(&out[0..4], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(&out[4..8], &[9.0, 8.0, 7.0, 6.0]);
    }

    #[test]
    fn test_mul_mtx_identity() {
        let m: [f32; 16] = [
            2.0, 0.0, 0.0, 0.0, //
            0.0, 3.0, 0.0, 0.0, //
            0.0, 0.0, 4.0, 0.0, //
            1.0, 2.0, 3.0, 1.0,
        ];
        assert_eq!(mul_mtx(&IDENTITY, &m), m);
        assert_eq!(mul_mtx(&m, &IDENTITY), m);
    }
}
