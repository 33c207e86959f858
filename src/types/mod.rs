//! Value types shared across the renderer.

pub mod buffer;
pub mod common;
pub mod sampler;
pub mod state;
pub mod texture;
pub mod vertex;

pub use buffer::{BufferDescriptor, BufferUsage, IndexFormat};
pub use common::{ClearFlags, ClearValues, Rect};
pub use sampler::{AddressMode, FilterMode, SamplerDescriptor, SamplerFlags};
pub use state::{
    BlendFactor, BlendOperation, CompareFunction, CullMode, PrimInfo, PrimitiveTopology,
    RenderState, StencilFace, StencilOperation, StencilState, WriteMask,
};
pub use texture::{
    TextureDescriptor, TextureDimension, TextureFlags, TextureFormat, TextureUsage,
};
pub use vertex::{
    VertexAttrib, VertexAttribKind, VertexAttribType, VertexFormat, VertexLayout, VertexStepMode,
};
