//! The consumed frame data model.
//!
//! A [`Frame`] is produced by the (external) recording layer: a pre-sorted
//! list of draw and compute items tagged with 64-bit sort keys, per-view
//! setup, batched blit requests, and a shared uniform-update log. This
//! module only defines the shapes; the submission loop walks them.

use std::ops::Range;
use std::sync::Arc;

use crate::resources::{BufferHandle, FrameBufferHandle, ProgramHandle, TextureHandle};
use crate::types::common::{ClearValues, Rect};
use crate::types::sampler::SamplerFlags;
use crate::types::state::{RenderState, StencilState};
use crate::types::vertex::VertexLayout;
use crate::uniforms::{UniformHandle, ViewTransforms};
use crate::MAX_TEXTURE_SAMPLERS;

/// Identifier of a view (an ordered render-target bucket).
pub type ViewId = u16;

/// Handle naming one occlusion query slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OcclusionQueryHandle(pub u16);

/// Decoded 64-bit sort key.
///
/// Encoding: `[55:40]` view id, `[39]` compute flag, `[31:0]` free sequence
/// bits owned by the producer (depth, program, material - opaque here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub view: ViewId,
    pub compute: bool,
    pub sequence: u32,
}

impl SortKey {
    const VIEW_SHIFT: u64 = 40;
    const COMPUTE_BIT: u64 = 1 << 39;

    pub fn encode(&self) -> u64 {
        (self.view as u64) << Self::VIEW_SHIFT
            | if self.compute { Self::COMPUTE_BIT } else { 0 }
            | self.sequence as u64
    }

    pub fn decode(bits: u64) -> Self {
        Self {
            view: ((bits >> Self::VIEW_SHIFT) & 0xffff) as u16,
            compute: bits & Self::COMPUTE_BIT != 0,
            sequence: bits as u32,
        }
    }

    pub fn draw(view: ViewId, sequence: u32) -> Self {
        Self {
            view,
            compute: false,
            sequence,
        }
    }

    pub fn dispatch(view: ViewId, sequence: u32) -> Self {
        Self {
            view,
            compute: true,
            sequence,
        }
    }
}

/// One vertex stream bound to a draw.
#[derive(Debug, Clone)]
pub struct VertexStream {
    pub buffer: BufferHandle,
    /// Explicit layout; falls back to the layout the buffer was created
    /// with when `None`.
    pub layout: Option<Arc<VertexLayout>>,
    pub start_vertex: u32,
}

/// One per-stage resource binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Binding {
    #[default]
    None,
    /// A sampled texture plus sampler flags.
    Texture {
        texture: TextureHandle,
        sampler: SamplerFlags,
    },
    /// A storage image at a given mip (compute).
    Image { texture: TextureHandle, mip: u8 },
    /// A storage buffer (compute).
    Buffer { buffer: BufferHandle },
}

/// The raw per-draw binding table, hashed for bind-state deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBindings {
    pub entries: [Binding; MAX_TEXTURE_SAMPLERS],
}

impl Default for ResourceBindings {
    fn default() -> Self {
        Self {
            entries: [Binding::None; MAX_TEXTURE_SAMPLERS],
        }
    }
}

impl ResourceBindings {
    /// Stable content hash over every slot.
    pub fn hash(&self) -> u64 {
        let mut hasher = xxhash_rust::xxh3::Xxh3::new();
        for entry in &self.entries {
            match entry {
                Binding::None => hasher.update(&[0]),
                Binding::Texture { texture, sampler } => {
                    hasher.update(&[1]);
                    hasher.update(&(texture.index() as u32).to_le_bytes());
                    hasher.update(&texture.generation().to_le_bytes());
                    hasher.update(&sampler.0.to_le_bytes());
                }
                Binding::Image { texture, mip } => {
                    hasher.update(&[2, *mip]);
                    hasher.update(&(texture.index() as u32).to_le_bytes());
                    hasher.update(&texture.generation().to_le_bytes());
                }
                Binding::Buffer { buffer } => {
                    hasher.update(&[3]);
                    hasher.update(&(buffer.index() as u32).to_le_bytes());
                    hasher.update(&buffer.generation().to_le_bytes());
                }
            }
        }
        hasher.digest()
    }
}

/// One draw item.
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub state: RenderState,
    pub stencil: StencilState,
    /// Blend-factor word; also carries per-attachment blend groups when
    /// independent blending is enabled.
    pub rgba: u32,
    pub program: ProgramHandle,
    pub streams: Vec<VertexStream>,
    pub index_buffer: Option<BufferHandle>,
    /// `u32::MAX` draws every vertex the first stream holds.
    pub num_vertices: u32,
    pub start_index: u32,
    /// `u32::MAX` draws every index the bound buffer holds.
    pub num_indices: u32,
    pub num_instances: u32,
    pub instance_buffer: Option<BufferHandle>,
    pub instance_offset: u32,
    /// Bytes per instance in the instance buffer.
    pub instance_stride: u16,
    /// Indirect argument buffer; encoding falls back to direct draws but
    /// the count is surfaced in statistics.
    pub indirect_buffer: Option<BufferHandle>,
    pub indirect_start: u32,
    pub indirect_num: u16,
    /// Index into [`Frame::scissors`]; `None` inherits the view scissor.
    pub scissor: Option<u16>,
    /// Index into [`Frame::transforms`] for the model matrix; identity
    /// when absent.
    pub transform: Option<u32>,
    /// Run an occlusion query around this draw's GPU work.
    pub occlusion: Option<OcclusionQueryHandle>,
    /// Skip this draw when the named query reported zero samples in
    /// [`Frame::occlusion_results`].
    pub condition: Option<OcclusionQueryHandle>,
    /// Slice of [`Frame::uniform_ops`] to commit before this draw.
    pub uniforms: Range<u32>,
    pub bindings: ResourceBindings,
}

impl Default for DrawItem {
    fn default() -> Self {
        Self {
            state: RenderState::opaque(),
            stencil: StencilState::NONE,
            rgba: 0,
            program: ProgramHandle::new(u16::MAX, u16::MAX),
            streams: Vec::new(),
            index_buffer: None,
            num_vertices: u32::MAX,
            start_index: 0,
            num_indices: u32::MAX,
            num_instances: 1,
            instance_buffer: None,
            instance_offset: 0,
            instance_stride: 0,
            indirect_buffer: None,
            indirect_start: 0,
            indirect_num: 0,
            scissor: None,
            transform: None,
            occlusion: None,
            condition: None,
            uniforms: 0..0,
            bindings: ResourceBindings::default(),
        }
    }
}

/// One compute dispatch item.
#[derive(Debug, Clone)]
pub struct ComputeItem {
    pub program: ProgramHandle,
    pub num_x: u32,
    pub num_y: u32,
    pub num_z: u32,
    pub indirect_buffer: Option<BufferHandle>,
    pub indirect_start: u32,
    pub uniforms: Range<u32>,
    pub bindings: ResourceBindings,
}

/// A sorted unit of work.
#[derive(Debug, Clone)]
pub enum RenderItem {
    Draw(DrawItem),
    Compute(ComputeItem),
}

/// A texture-to-texture copy, batched per view boundary.
#[derive(Debug, Clone, Copy)]
pub struct BlitItem {
    pub view: ViewId,
    pub src: TextureHandle,
    pub src_mip: u8,
    pub src_x: u16,
    pub src_y: u16,
    pub src_z: u16,
    pub dst: TextureHandle,
    pub dst_mip: u8,
    pub dst_x: u16,
    pub dst_y: u16,
    pub dst_z: u16,
    pub width: u16,
    pub height: u16,
    pub depth: u16,
}

/// Per-view setup consumed when the submission loop enters the view.
#[derive(Debug, Clone, Default)]
pub struct View {
    pub rect: Rect,
    pub scissor: Rect,
    pub clear: ClearValues,
    /// View/projection matrices feeding the predefined uniforms.
    pub transforms: ViewTransforms,
    /// `None` renders to the primary swap chain.
    pub framebuffer: Option<FrameBufferHandle>,
}

/// One entry of the shared uniform-update log.
#[derive(Debug, Clone)]
pub enum UniformOp {
    /// Inline data written at a register location.
    Set {
        ty: crate::shader::UniformType,
        loc: u16,
        fragment: bool,
        data: Vec<u8>,
    },
    /// Indirection through a registry uniform's current value.
    SetRef {
        ty: crate::shader::UniformType,
        loc: u16,
        fragment: bool,
        uniform: UniformHandle,
    },
}

/// Transient buffer contents uploaded before the frame is encoded.
#[derive(Debug, Clone)]
pub struct TransientUpdate {
    pub buffer: BufferHandle,
    pub data: Vec<u8>,
}

/// An externally produced, pre-sorted frame.
#[derive(Debug, Default)]
pub struct Frame {
    /// Items with their encoded sort keys, already sorted ascending.
    pub items: Vec<(u64, RenderItem)>,
    /// Per-view setup, indexed by view id.
    pub views: Vec<View>,
    /// Blit requests, sorted by view.
    pub blits: Vec<BlitItem>,
    /// Shared uniform-update log; items reference ranges into it.
    pub uniform_ops: Vec<UniformOp>,
    /// Scissor rectangles referenced by draw items.
    pub scissors: Vec<Rect>,
    /// Model matrix cache referenced by draw items.
    pub transforms: Vec<[f32; 16]>,
    /// Transient vertex/index data to upload before encoding.
    pub transient_vb: Option<TransientUpdate>,
    pub transient_ib: Option<TransientUpdate>,
    /// Occlusion query results, filled during submission.
    pub occlusion_results: Vec<i32>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// View setup for `id`, falling back to a default view.
    pub fn view(&self, id: ViewId) -> View {
        self.views.get(id as usize).cloned().unwrap_or_default()
    }

    /// Push an item under a sort key; the caller keeps keys ascending.
    pub fn push(&mut self, key: SortKey, item: RenderItem) {
        self.items.push((key.encode(), item));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_roundtrip() {
        let key = SortKey::dispatch(37, 0xdead_beef);
        let decoded = SortKey::decode(key.encode());
        assert_eq!(decoded.view, 37);
        assert!(decoded.compute);
        assert_eq!(decoded.sequence, 0xdead_beef);

        let draw = SortKey::draw(0, 1);
        assert!(!SortKey::decode(draw.encode()).compute);
    }

    #[test]
    fn test_sort_key_orders_by_view_first() {
        let early = SortKey::draw(1, u32::MAX).encode();
        let late = SortKey::draw(2, 0).encode();
        assert!(early < late);
    }

    #[test]
    fn test_binding_hash_changes_with_slot() {
        let mut a = ResourceBindings::default();
        let b = a.clone();
        assert_eq!(a.hash(), b.hash());

        a.entries[3] = Binding::Image {
            texture: TextureHandle::new(5, 0),
            mip: 2,
        };
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_binding_hash_sensitive_to_sampler_flags() {
        let tex = TextureHandle::new(1, 0);
        let mut a = ResourceBindings::default();
        a.entries[0] = Binding::Texture {
            texture: tex,
            sampler: SamplerFlags(0),
        };
        let mut b = a.clone();
        b.entries[0] = Binding::Texture {
            texture: tex,
            sampler: SamplerFlags(0).with_nearest(),
        };
        assert_ne!(a.hash(), b.hash());
    }
}
