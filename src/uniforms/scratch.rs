//! Per-frame scratch arena for shader constants.
//!
//! One [`ScratchBuffer`] exists per frame-in-flight slot. Within a frame it
//! is a plain bump allocator over a device-visible uniform buffer: offsets
//! only grow, so nothing the GPU may still read is ever overwritten. The
//! whole arena rewinds once per full GPU round-trip via [`reset`], which
//! also throws away every bind state allocated from the slot.
//!
//! [`reset`]: ScratchBuffer::reset

use crate::backend::{GpuBuffer, RenderBackend};
use crate::error::RenderError;
use crate::types::buffer::{BufferDescriptor, BufferUsage};

use super::bind::BindState;

/// A sub-range handed out by the bump allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchAlloc {
    pub offset: u32,
    pub size: u32,
}

/// One frame slot's uniform arena plus the bind states allocated from it.
pub struct ScratchBuffer {
    buffer: GpuBuffer,
    size: u32,
    offset: u32,
    alignment: u32,
    bind_states: Vec<BindState>,
}

impl ScratchBuffer {
    /// Create an arena of `size` bytes; offsets will be aligned to the
    /// device's minimum uniform-buffer offset alignment.
    pub fn new(
        backend: &dyn RenderBackend,
        size: u32,
        alignment: u32,
        label: &str,
    ) -> Result<Self, RenderError> {
        debug_assert!(alignment.is_power_of_two());
        let buffer = backend.create_buffer(
            &BufferDescriptor::new(
                size as u64,
                BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            )
            .with_label(label),
        )?;
        Ok(Self {
            buffer,
            size,
            offset: 0,
            alignment,
            bind_states: Vec::new(),
        })
    }

    pub fn buffer(&self) -> &GpuBuffer {
        &self.buffer
    }

    pub fn used(&self) -> u32 {
        self.offset
    }

    pub fn remaining(&self) -> u32 {
        self.size - self.offset
    }

    /// Rewind the arena. Only call once the GPU has retired the frame that
    /// consumed this slot; every bind state from the slot dies here.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.bind_states.clear();
    }

    /// Allocate `size` bytes at the alignment the device requires.
    ///
    /// Returns `None` when the arena is exhausted; callers must size the
    /// arena for the frame's peak uniform volume.
    pub fn alloc(&mut self, size: u32) -> Option<ScratchAlloc> {
        let offset = align_up(self.offset, self.alignment);
        let end = offset.checked_add(size)?;
        if end > self.size {
            debug_assert!(false, "scratch arena exhausted ({} + {size} > {})", offset, self.size);
            return None;
        }
        self.offset = end;
        Some(ScratchAlloc { offset, size })
    }

    /// Store a bind state allocated against this slot, returning its index.
    pub fn push_bind_state(&mut self, state: BindState) -> usize {
        self.bind_states.push(state);
        self.bind_states.len() - 1
    }

    pub fn bind_state(&self, index: usize) -> Option<&BindState> {
        self.bind_states.get(index)
    }
}

#[inline]
fn align_up(value: u32, alignment: u32) -> u32 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;

    fn scratch(size: u32) -> ScratchBuffer {
        let backend = NullBackend::new();
        ScratchBuffer::new(&backend, size, 256, "test_scratch").unwrap()
    }

    #[test]
    fn test_allocations_never_overlap() {
        let mut arena = scratch(4096);
        let a = arena.alloc(100).unwrap();
        let b = arena.alloc(100).unwrap();
        let c = arena.alloc(256).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 256);
        assert_eq!(c.offset, 512);
        assert!(a.offset + a.size <= b.offset);
        assert!(b.offset + b.size <= c.offset);
        assert_eq!(arena.used(), 768);
    }

    #[test]
    fn test_reset_rewinds_to_zero() {
        let mut arena = scratch(1024);
        arena.alloc(512).unwrap();
        assert_eq!(arena.used(), 512);
        arena.reset();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.alloc(64).unwrap().offset, 0);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "scratch arena exhausted"))]
    fn test_exhaustion() {
        let mut arena = scratch(512);
        arena.alloc(512).unwrap();
        assert!(arena.alloc(1).is_none());
    }

    #[test]
    fn test_exact_fit_succeeds() {
        let mut arena = scratch(512);
        let a = arena.alloc(256).unwrap();
        let b = arena.alloc(256).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 256);
        assert_eq!(arena.remaining(), 0);
    }
}
