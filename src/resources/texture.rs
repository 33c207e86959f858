//! Texture resources and the encoded image container they are created
//! from.

use crate::backend::{
    BufferImageLayout, CopyExtent, GpuBuffer, GpuResource, GpuSampler, GpuTexture,
    GpuTextureView, RenderBackend, TextureCopyLocation, TextureViewDesc,
};
use crate::error::RenderError;
use crate::submit::queue::CommandQueue;
use crate::types::buffer::{BufferDescriptor, BufferUsage};
use crate::types::common::Rect;
use crate::types::sampler::SamplerFlags;
use crate::types::texture::{
    TextureDescriptor, TextureDimension, TextureFlags, TextureFormat, TextureUsage,
};

use super::sampler_cache::SamplerCache;

/// Buffer/texture copies require row pitches aligned to this.
const ROW_PITCH_ALIGNMENT: u32 = 256;

/// An encoded image container: dimensions, format and tightly packed
/// texel data laid out side-major, then mip-major.
#[derive(Debug, Clone)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub num_layers: u16,
    pub num_mips: u8,
    pub cube: bool,
    pub format: TextureFormat,
    pub data: Vec<u8>,
}

impl TextureImage {
    /// A single-mip 2D image over existing pixel data.
    pub fn from_pixels(width: u32, height: u32, format: TextureFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            depth: 1,
            num_layers: 1,
            num_mips: 1,
            cube: false,
            format,
            data,
        }
    }

    /// A data-less container describing a render target.
    pub fn target(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            depth: 1,
            num_layers: 1,
            num_mips: 1,
            cube: false,
            format,
            data: Vec::new(),
        }
    }

    pub fn num_sides(&self) -> u32 {
        self.num_layers as u32 * if self.cube { 6 } else { 1 }
    }

    fn mip_byte_size(&self, mip: u8) -> usize {
        let w = (self.width >> mip).max(1) as usize;
        let h = (self.height >> mip).max(1) as usize;
        let d = (self.depth >> mip).max(1) as usize;
        w * h * d * self.format.bytes_per_pixel() as usize
    }

    /// Texel bytes of one side's mip level, `None` when the container
    /// carries no data (render targets) or the request is out of range.
    pub fn mip_data(&self, side: u32, mip: u8) -> Option<&[u8]> {
        if self.data.is_empty() || side >= self.num_sides() || mip >= self.num_mips {
            return None;
        }
        let side_size: usize = (0..self.num_mips).map(|m| self.mip_byte_size(m)).sum();
        let mut offset = side as usize * side_size;
        for m in 0..mip {
            offset += self.mip_byte_size(m);
        }
        let size = self.mip_byte_size(mip);
        self.data.get(offset..offset + size)
    }
}

/// A device texture plus its resolved format and cached views.
pub struct Texture {
    pub gpu: GpuTexture,
    /// Multisampled sibling, present when the creation flags request
    /// a sample count above 1.
    pub msaa: Option<GpuTexture>,
    /// Whole-texture view.
    pub view: GpuTextureView,
    /// Default sampler derived from the creation flags.
    pub sampler: GpuSampler,
    pub requested_format: TextureFormat,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub num_mips: u8,
    pub num_layers: u16,
    pub sample_count: u32,
    pub dimension: TextureDimension,
    pub flags: TextureFlags,
    mip_views: Vec<Option<GpuTextureView>>,
}

impl Texture {
    /// Create a texture from an encoded image container.
    ///
    /// Derives the shape from the container's top mip minus `skip`,
    /// resolves the requested format through the substitution table, and
    /// uploads every side and mip through staging buffers whose copies
    /// land on the live encoder.
    ///
    /// # Errors
    ///
    /// [`RenderError::UnsupportedFormat`] when the substitution table has
    /// no viable device format for the request - the documented fallback,
    /// never a crash.
    pub fn create(
        backend: &mut dyn RenderBackend,
        cmd: &mut CommandQueue,
        samplers: &mut SamplerCache,
        image: &TextureImage,
        flags: TextureFlags,
        skip: u8,
    ) -> Result<Self, RenderError> {
        let requested = image.format;
        let format = requested.resolve().ok_or_else(|| {
            RenderError::UnsupportedFormat(format!("{requested:?} has no viable device format"))
        })?;

        let start_lod = skip.min(image.num_mips.saturating_sub(1));
        let width = (image.width >> start_lod).max(1);
        let height = (image.height >> start_lod).max(1);
        let depth = (image.depth >> start_lod).max(1);
        let num_mips = image.num_mips - start_lod;

        let dimension = if image.cube {
            TextureDimension::Cube
        } else if image.depth > 1 {
            TextureDimension::D3
        } else {
            TextureDimension::D2
        };

        let mut usage = TextureUsage::SAMPLED | TextureUsage::COPY_DST;
        if flags.compute_write() {
            usage |= TextureUsage::STORAGE;
        }
        if flags.render_target() {
            usage |= TextureUsage::RENDER_ATTACHMENT;
        }
        if flags.read_back() {
            usage |= TextureUsage::COPY_SRC;
        }

        let desc = TextureDescriptor {
            label: None,
            width,
            height,
            depth,
            mip_count: num_mips,
            layer_count: image.num_layers,
            sample_count: 1,
            dimension,
            format,
            usage,
        };
        let gpu = backend.create_texture(&desc)?;

        let sample_count = flags.sample_count();
        let msaa = if sample_count > 1 {
            let msaa_desc = TextureDescriptor {
                sample_count,
                mip_count: 1,
                usage: TextureUsage::RENDER_ATTACHMENT,
                ..desc.clone()
            };
            Some(backend.create_texture(&msaa_desc)?)
        } else {
            None
        };

        let view = backend.create_texture_view(
            &gpu,
            &TextureViewDesc {
                dimension: Some(dimension),
                ..TextureViewDesc::default()
            },
        );

        let sampler = samplers.get(backend, SamplerFlags(flags.sampler_bits()));

        log::trace!(
            "created texture {width}x{height}x{depth} {format:?} (requested {requested:?}), \
             {num_mips} mips, {} layers, {sample_count}x",
            image.num_layers,
        );

        let texture = Self {
            gpu,
            msaa,
            view,
            sampler,
            requested_format: requested,
            format,
            width,
            height,
            depth,
            num_mips,
            num_layers: image.num_layers,
            sample_count,
            dimension,
            flags,
            mip_views: vec![None; num_mips as usize],
        };

        // Upload the container's texel data, one copy per side and mip.
        for side in 0..image.num_sides() {
            for mip in 0..num_mips {
                if let Some(data) = image.mip_data(side, mip + start_lod) {
                    texture.upload_level(backend, cmd, side, mip, data)?;
                }
            }
        }

        Ok(texture)
    }

    fn upload_level(
        &self,
        backend: &mut dyn RenderBackend,
        cmd: &mut CommandQueue,
        side: u32,
        mip: u8,
        data: &[u8],
    ) -> Result<(), RenderError> {
        let w = (self.width >> mip).max(1);
        let h = (self.height >> mip).max(1);
        let d = (self.depth >> mip).max(1);
        let pitch = w * self.format.bytes_per_pixel();
        if pitch == 0 {
            return Ok(());
        }

        let staging = stage_rows(backend, data, pitch, h * d)?;
        backend.copy_buffer_to_texture(
            &staging,
            BufferImageLayout {
                offset: 0,
                bytes_per_row: align_pitch(pitch),
                rows_per_image: h,
            },
            &TextureCopyLocation {
                texture: &self.gpu,
                mip,
                origin: [0, 0, side],
            },
            CopyExtent {
                width: w,
                height: h,
                depth: d,
            },
        );
        cmd.release(GpuResource::Buffer(staging));
        Ok(())
    }

    /// Upload a sub-region of one mip of one side.
    pub fn update(
        &self,
        backend: &mut dyn RenderBackend,
        cmd: &mut CommandQueue,
        side: u32,
        mip: u8,
        rect: Rect,
        z: u16,
        src_pitch: Option<u32>,
        data: &[u8],
    ) -> Result<(), RenderError> {
        let bpp = self.format.bytes_per_pixel();
        let rect_pitch = rect.width as u32 * bpp;
        let src_pitch = src_pitch.unwrap_or(rect_pitch);

        // Repack the source rows tightly before re-pitching for the copy.
        let mut rows = Vec::with_capacity((rect_pitch * rect.height as u32) as usize);
        for y in 0..rect.height as usize {
            let start = y * src_pitch as usize;
            let Some(row) = data.get(start..start + rect_pitch as usize) else {
                return Err(RenderError::InvalidParameter(
                    "texture update data too small".to_string(),
                ));
            };
            rows.extend_from_slice(row);
        }

        let staging = stage_rows(backend, &rows, rect_pitch, rect.height as u32)?;
        backend.copy_buffer_to_texture(
            &staging,
            BufferImageLayout {
                offset: 0,
                bytes_per_row: align_pitch(rect_pitch),
                rows_per_image: rect.height as u32,
            },
            &TextureCopyLocation {
                texture: &self.gpu,
                mip,
                origin: [
                    rect.x as u32,
                    rect.y as u32,
                    if self.dimension == TextureDimension::D3 {
                        z as u32
                    } else {
                        side
                    },
                ],
            },
            CopyExtent {
                width: rect.width as u32,
                height: rect.height as u32,
                depth: 1,
            },
        );
        cmd.release(GpuResource::Buffer(staging));
        Ok(())
    }

    /// A cached single-mip view, created on first use.
    pub fn mip_view(&mut self, backend: &dyn RenderBackend, mip: u8) -> GpuTextureView {
        let mip = mip.min(self.num_mips.saturating_sub(1)) as usize;
        if self.mip_views[mip].is_none() {
            self.mip_views[mip] = Some(backend.create_texture_view(
                &self.gpu,
                &TextureViewDesc {
                    base_mip: mip as u8,
                    mip_count: Some(1),
                    dimension: Some(TextureDimension::D2),
                    ..TextureViewDesc::default()
                },
            ));
        }
        match &self.mip_views[mip] {
            Some(view) => view.clone(),
            None => self.view.clone(),
        }
    }

    /// The device objects to hand to the deferred-release ring when this
    /// texture's handle is destroyed.
    pub fn into_released(self) -> Vec<GpuResource> {
        let mut out = vec![GpuResource::Texture(self.gpu)];
        if let Some(msaa) = self.msaa {
            out.push(GpuResource::Texture(msaa));
        }
        out
    }
}

/// Copy tightly packed rows into a staging buffer at the 256-byte pitch
/// buffer/texture copies require.
fn stage_rows(
    backend: &dyn RenderBackend,
    data: &[u8],
    pitch: u32,
    rows: u32,
) -> Result<GpuBuffer, RenderError> {
    let dst_pitch = align_pitch(pitch);
    let staging = backend.create_buffer(
        &BufferDescriptor::new(
            dst_pitch as u64 * rows as u64,
            BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
        )
        .with_label("texture_staging"),
    )?;

    if dst_pitch == pitch {
        backend.write_buffer(&staging, 0, data);
    } else {
        let mut repitched = vec![0u8; (dst_pitch * rows) as usize];
        for row in 0..rows as usize {
            let src = row * pitch as usize;
            let dst = row * dst_pitch as usize;
            if let Some(chunk) = data.get(src..src + pitch as usize) {
                repitched[dst..dst + pitch as usize].copy_from_slice(chunk);
            }
        }
        backend.write_buffer(&staging, 0, &repitched);
    }
    Ok(staging)
}

#[inline]
fn align_pitch(pitch: u32) -> u32 {
    (pitch + ROW_PITCH_ALIGNMENT - 1) & !(ROW_PITCH_ALIGNMENT - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;

    fn checkerboard(size: u32) -> TextureImage {
        let mut data = vec![0u8; (size * size * 4) as usize];
        for (i, px) in data.chunks_exact_mut(4).enumerate() {
            let v = if (i / size as usize + i % size as usize) % 2 == 0 {
                0xff
            } else {
                0x00
            };
            px.copy_from_slice(&[v, v, v, 0xff]);
        }
        TextureImage::from_pixels(size, size, TextureFormat::Rgba8, data)
    }

    #[test]
    fn test_create_uploads_mip_zero() {
        let mut backend = NullBackend::new();
        let mut cmd = CommandQueue::new(3);
        let mut samplers = SamplerCache::new();

        backend.begin_encoder();
        let texture = Texture::create(
            &mut backend,
            &mut cmd,
            &mut samplers,
            &checkerboard(8),
            TextureFlags::default(),
            0,
        )
        .unwrap();

        assert_eq!(texture.width, 8);
        assert_eq!(texture.format, TextureFormat::Rgba8);
        assert!(texture.msaa.is_none());
        let stats = backend.stats();
        assert_eq!(stats.textures_created, 1);
        assert_eq!(stats.copies, 1);
        // Staging buffer deferred, not dropped inline.
        assert_eq!(cmd.pending_release_count(), 1);
    }

    #[test]
    fn test_unsupported_format_resolves_to_fallback_error() {
        let mut backend = NullBackend::new();
        let mut cmd = CommandQueue::new(3);
        let mut samplers = SamplerCache::new();

        let image = TextureImage::from_pixels(4, 4, TextureFormat::Bc3, vec![0; 16]);
        let result = Texture::create(
            &mut backend,
            &mut cmd,
            &mut samplers,
            &image,
            TextureFlags::default(),
            0,
        );
        assert!(matches!(result, Err(RenderError::UnsupportedFormat(_))));
        assert_eq!(backend.stats().textures_created, 0);
    }

    #[test]
    fn test_skip_drops_top_mips() {
        let mut backend = NullBackend::new();
        let mut cmd = CommandQueue::new(3);
        let mut samplers = SamplerCache::new();

        let mut image = checkerboard(16);
        // 16x16 + 8x8 + 4x4 mips, tightly packed.
        image.num_mips = 3;
        let total: usize = (16 * 16 + 8 * 8 + 4 * 4) * 4;
        image.data.resize(total, 0);

        backend.begin_encoder();
        let texture = Texture::create(
            &mut backend,
            &mut cmd,
            &mut samplers,
            &image,
            TextureFlags::default(),
            1,
        )
        .unwrap();
        assert_eq!(texture.width, 8);
        assert_eq!(texture.num_mips, 2);
        assert_eq!(backend.stats().copies, 2);
    }

    #[test]
    fn test_msaa_sibling_created() {
        let mut backend = NullBackend::new();
        let mut cmd = CommandQueue::new(3);
        let mut samplers = SamplerCache::new();

        backend.begin_encoder();
        let texture = Texture::create(
            &mut backend,
            &mut cmd,
            &mut samplers,
            &TextureImage::target(64, 64, TextureFormat::Rgba8),
            TextureFlags::default().with_render_target().with_msaa_level(2),
            0,
        )
        .unwrap();
        assert!(texture.msaa.is_some());
        assert_eq!(texture.sample_count, 4);
        assert_eq!(backend.stats().textures_created, 2);
    }

    #[test]
    fn test_mip_view_cached() {
        let mut backend = NullBackend::new();
        let mut cmd = CommandQueue::new(3);
        let mut samplers = SamplerCache::new();

        let mut image = checkerboard(8);
        image.num_mips = 2;
        image.data.resize((8 * 8 + 4 * 4) * 4, 0);

        backend.begin_encoder();
        let mut texture = Texture::create(
            &mut backend,
            &mut cmd,
            &mut samplers,
            &image,
            TextureFlags::default(),
            0,
        )
        .unwrap();

        let before = backend.stats().views_created;
        texture.mip_view(&backend, 1);
        texture.mip_view(&backend, 1);
        assert_eq!(backend.stats().views_created, before + 1);
    }

    #[test]
    fn test_image_mip_offsets() {
        let mut image = checkerboard(4);
        image.num_mips = 2;
        image.data.resize((4 * 4 + 2 * 2) * 4, 7);

        let mip0 = image.mip_data(0, 0).unwrap();
        let mip1 = image.mip_data(0, 1).unwrap();
        assert_eq!(mip0.len(), 64);
        assert_eq!(mip1.len(), 16);
        assert!(image.mip_data(0, 2).is_none());
        assert!(image.mip_data(1, 0).is_none());
    }
}
