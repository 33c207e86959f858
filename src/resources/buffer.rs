//! Vertex, index and generic buffer resources.

use std::sync::Arc;

use crate::backend::{GpuBuffer, GpuResource, RenderBackend};
use crate::error::RenderError;
use crate::submit::queue::CommandQueue;
use crate::types::buffer::{BufferDescriptor, BufferUsage, IndexFormat};
use crate::types::vertex::VertexLayout;

/// A device buffer plus the CPU-side state its update paths need.
pub struct Buffer {
    pub gpu: GpuBuffer,
    pub size: u32,
    pub usage: BufferUsage,
    /// Layout the buffer was created with (vertex buffers only).
    pub layout: Option<Arc<VertexLayout>>,
    /// Shadow copy kept for non-discard partial updates of index data,
    /// so unaligned edges can be re-sent from a coherent image.
    shadow: Option<Vec<u8>>,
}

impl Buffer {
    /// Create a buffer, optionally uploading initial contents.
    ///
    /// Sizes are padded to 4 bytes; all buffers get `COPY_DST` so the
    /// update paths can reach them.
    pub fn create(
        backend: &dyn RenderBackend,
        size: u32,
        data: Option<&[u8]>,
        usage: BufferUsage,
        layout: Option<Arc<VertexLayout>>,
        label: &str,
    ) -> Result<Self, RenderError> {
        if size == 0 {
            return Err(RenderError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }

        let padded = align4(size);
        let gpu = backend.create_buffer(
            &BufferDescriptor::new(padded as u64, usage | BufferUsage::COPY_DST)
                .with_label(label),
        )?;

        if let Some(data) = data {
            if data.len() as u32 % 4 != 0 {
                let mut tmp = data.to_vec();
                tmp.resize(align4(data.len() as u32) as usize, 0);
                backend.write_buffer(&gpu, 0, &tmp);
            } else {
                backend.write_buffer(&gpu, 0, data);
            }
        }

        log::trace!("created buffer '{label}' ({size} bytes, {usage:?})");

        Ok(Self {
            gpu,
            size,
            usage,
            layout,
            shadow: None,
        })
    }

    /// Update a sub-range.
    ///
    /// Non-discard partial updates of index buffers go through the shadow
    /// copy so the 4-byte-aligned copy window re-sends coherent bytes;
    /// everything else takes the direct staging path. Either way the
    /// staging buffer is enqueued on `cmd`'s deferred-release ring and the
    /// copy lands on the live encoder.
    pub fn update(
        &mut self,
        backend: &mut dyn RenderBackend,
        cmd: &mut CommandQueue,
        offset: u32,
        data: &[u8],
        discard: bool,
    ) -> Result<(), RenderError> {
        let len = data.len() as u32;
        if offset + len > self.size {
            return Err(RenderError::InvalidParameter(format!(
                "buffer update out of range: {offset}+{len} > {}",
                self.size
            )));
        }

        let index_like = self.usage.contains(BufferUsage::INDEX);

        let (staging, dst_offset, copy_size) = if index_like && !discard {
            let shadow = self
                .shadow
                .get_or_insert_with(|| vec![0; align4(self.size) as usize]);
            shadow[offset as usize..(offset + len) as usize].copy_from_slice(data);

            let start = offset & !3;
            let end = align4(offset + len);
            let staging = backend.create_buffer(
                &BufferDescriptor::new(
                    (end - start) as u64,
                    BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
                )
                .with_label("update_staging"),
            )?;
            backend.write_buffer(&staging, 0, &shadow[start as usize..end as usize]);
            (staging, start, end - start)
        } else {
            let padded = align4(len);
            let staging = backend.create_buffer(
                &BufferDescriptor::new(
                    padded as u64,
                    BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
                )
                .with_label("update_staging"),
            )?;
            if padded != len {
                let mut tmp = data.to_vec();
                tmp.resize(padded as usize, 0);
                backend.write_buffer(&staging, 0, &tmp);
            } else {
                backend.write_buffer(&staging, 0, data);
            }
            (staging, offset, padded)
        };

        backend.copy_buffer_to_buffer(&staging, 0, &self.gpu, dst_offset as u64, copy_size as u64);
        cmd.release(GpuResource::Buffer(staging));
        Ok(())
    }

    /// Index element width, from the creation flags.
    pub fn index_format(&self) -> IndexFormat {
        if self.usage.contains(BufferUsage::INDEX32) {
            IndexFormat::Uint32
        } else {
            IndexFormat::Uint16
        }
    }
}

#[inline]
fn align4(value: u32) -> u32 {
    (value + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;

    #[test]
    fn test_create_pads_odd_sizes() {
        let backend = NullBackend::new();
        let buffer = Buffer::create(
            &backend,
            10,
            Some(&[1u8; 10]),
            BufferUsage::INDEX,
            None,
            "ib",
        )
        .unwrap();
        assert_eq!(buffer.size, 10);
        assert_eq!(backend.stats().buffer_writes, 1);
    }

    #[test]
    fn test_zero_size_rejected() {
        let backend = NullBackend::new();
        assert!(Buffer::create(&backend, 0, None, BufferUsage::VERTEX, None, "vb").is_err());
    }

    #[test]
    fn test_update_out_of_range() {
        let mut backend = NullBackend::new();
        let mut cmd = CommandQueue::new(3);
        let mut buffer =
            Buffer::create(&backend, 16, None, BufferUsage::VERTEX, None, "vb").unwrap();
        backend.begin_encoder();
        let result = buffer.update(&mut backend, &mut cmd, 8, &[0u8; 12], true);
        assert!(result.is_err());
    }

    #[test]
    fn test_partial_index_update_uses_shadow() {
        let mut backend = NullBackend::new();
        let mut cmd = CommandQueue::new(3);
        let mut buffer =
            Buffer::create(&backend, 64, None, BufferUsage::INDEX, None, "ib").unwrap();

        backend.begin_encoder();
        buffer
            .update(&mut backend, &mut cmd, 2, &[0xffu8; 6], false)
            .unwrap();
        assert!(buffer.shadow.is_some());
        // Copy routed through a staging buffer released to the queue.
        assert_eq!(backend.stats().copies, 1);
        assert_eq!(cmd.pending_release_count(), 1);

        let shadow = buffer.shadow.as_ref().unwrap();
        assert_eq!(shadow[1], 0);
        assert_eq!(shadow[2], 0xff);
        assert_eq!(shadow[7], 0xff);
        assert_eq!(shadow[8], 0);
    }

    #[test]
    fn test_discard_update_skips_shadow() {
        let mut backend = NullBackend::new();
        let mut cmd = CommandQueue::new(3);
        let mut buffer =
            Buffer::create(&backend, 64, None, BufferUsage::INDEX, None, "ib").unwrap();

        backend.begin_encoder();
        buffer
            .update(&mut backend, &mut cmd, 0, &[1u8; 64], true)
            .unwrap();
        assert!(buffer.shadow.is_none());
        assert_eq!(backend.stats().copies, 1);
    }

    #[test]
    fn test_index_format_flag() {
        let backend = NullBackend::new();
        let b16 = Buffer::create(&backend, 4, None, BufferUsage::INDEX, None, "a").unwrap();
        let b32 = Buffer::create(
            &backend,
            4,
            None,
            BufferUsage::INDEX | BufferUsage::INDEX32,
            None,
            "b",
        )
        .unwrap();
        assert_eq!(b16.index_format(), IndexFormat::Uint16);
        assert_eq!(b32.index_format(), IndexFormat::Uint32);
    }
}
