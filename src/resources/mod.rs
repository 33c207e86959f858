//! Handle-indexed resource tables.
//!
//! The [`ResourcePool`] owns every CPU-side resource record: buffers,
//! textures, shaders, programs and frame buffers. Device objects inside
//! the records are dropped when the record leaves its table, except where
//! the command queue's deferred-release ring must outlive them (staging
//! buffers, resources of destroyed handles that in-flight frames still
//! reference).

pub mod buffer;
pub mod program;
pub mod sampler_cache;
pub mod texture;

pub use buffer::Buffer;
pub use program::{Program, ProgramSampler};
pub use sampler_cache::SamplerCache;
pub use texture::{Texture, TextureImage};

use crate::backend::GpuShaderModule;
use crate::handle::{Handle, HandlePool};
use crate::shader::ShaderBlob;
use crate::swapchain::FrameBuffer;

/// A compiled shader: reflection data plus the device module.
#[derive(Debug, Clone)]
pub struct Shader {
    pub blob: ShaderBlob,
    pub module: GpuShaderModule,
}

pub type BufferHandle = Handle<Buffer>;
pub type TextureHandle = Handle<Texture>;
pub type ShaderHandle = Handle<Shader>;
pub type ProgramHandle = Handle<Program>;
pub type FrameBufferHandle = Handle<FrameBuffer>;

/// Capacities of the fixed resource tables.
#[derive(Debug, Clone, Copy)]
pub struct PoolCapacities {
    pub buffers: usize,
    pub textures: usize,
    pub shaders: usize,
    pub programs: usize,
    pub frame_buffers: usize,
}

impl Default for PoolCapacities {
    fn default() -> Self {
        Self {
            buffers: 4096,
            textures: 4096,
            shaders: 512,
            programs: 512,
            frame_buffers: 128,
        }
    }
}

/// All resource tables.
pub struct ResourcePool {
    pub buffers: HandlePool<Buffer>,
    pub textures: HandlePool<Texture>,
    pub shaders: HandlePool<Shader>,
    pub programs: HandlePool<Program>,
    pub frame_buffers: HandlePool<FrameBuffer>,
}

impl ResourcePool {
    pub fn new(caps: PoolCapacities) -> Self {
        Self {
            buffers: HandlePool::new(caps.buffers, "buffer"),
            textures: HandlePool::new(caps.textures, "texture"),
            shaders: HandlePool::new(caps.shaders, "shader"),
            programs: HandlePool::new(caps.programs, "program"),
            frame_buffers: HandlePool::new(caps.frame_buffers, "frame buffer"),
        }
    }
}
