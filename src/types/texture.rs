//! Pixel formats, texture creation flags and device texture descriptors.

use bitflags::bitflags;

/// Requested pixel format of a texture.
///
/// The list deliberately includes formats the device cannot express
/// (compressed families, packed 16-bit formats); those resolve through the
/// substitution table in [`TextureFormat::resolve`] and are rejected at
/// texture-creation time rather than crashing deeper in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TextureFormat {
    // Compressed families; no device support, resolve to `None`.
    Bc1,
    Bc2,
    Bc3,
    Bc4,
    Bc5,
    Bc6h,
    Bc7,
    Etc1,
    Etc2,
    Etc2a,
    Astc4x4,
    Astc8x8,

    Unknown,

    // Color formats.
    A8,
    R8,
    R8I,
    R8U,
    R8S,
    R16,
    R16F,
    R32F,
    Rg8,
    Rg8U,
    Rg16F,
    Rg32F,
    Rgb9E5F,
    Bgra8,
    Rgba8,
    Rgba8I,
    Rgba8U,
    Rgba8S,
    Rgba16F,
    Rgba32F,
    R5G6B5,
    Rgba4,
    Rgb5A1,
    Rgb10A2,

    UnknownDepth,

    // Depth formats.
    D16,
    D24,
    D24S8,
    D32,
    D32F,
}

impl TextureFormat {
    /// Resolve the requested format to a viable device format.
    ///
    /// This is the single format-substitution table the texture path
    /// consumes: formats the device supports map to themselves, everything
    /// else maps to `None` and is rejected upstream.
    pub fn resolve(self) -> Option<TextureFormat> {
        match self {
            Self::R8
            | Self::R8U
            | Self::Rg8
            | Self::Rg8U
            | Self::Bgra8
            | Self::Rgba8
            | Self::Rgba8U
            | Self::D24
            | Self::D24S8
            | Self::D32F => Some(self),
            _ => None,
        }
    }

    pub fn is_supported(self) -> bool {
        self.resolve().is_some()
    }

    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            Self::Bc1
                | Self::Bc2
                | Self::Bc3
                | Self::Bc4
                | Self::Bc5
                | Self::Bc6h
                | Self::Bc7
                | Self::Etc1
                | Self::Etc2
                | Self::Etc2a
                | Self::Astc4x4
                | Self::Astc8x8
        )
    }

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Self::UnknownDepth | Self::D16 | Self::D24 | Self::D24S8 | Self::D32 | Self::D32F
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Self::D24S8)
    }

    /// Bytes per texel for uncompressed formats, 0 for compressed ones.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::A8 | Self::R8 | Self::R8I | Self::R8U | Self::R8S => 1,
            Self::R16 | Self::R16F | Self::Rg8 | Self::Rg8U | Self::R5G6B5 | Self::Rgba4
            | Self::Rgb5A1 | Self::D16 => 2,
            Self::R32F
            | Self::Rg16F
            | Self::Rgb9E5F
            | Self::Bgra8
            | Self::Rgba8
            | Self::Rgba8I
            | Self::Rgba8U
            | Self::Rgba8S
            | Self::Rgb10A2
            | Self::D24
            | Self::D24S8
            | Self::D32
            | Self::D32F => 4,
            Self::Rg32F | Self::Rgba16F => 8,
            Self::Rgba32F => 16,
            _ => 0,
        }
    }
}

/// Shape of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    #[default]
    D2,
    D3,
    Cube,
}

/// Packed texture creation flag word.
///
/// Bit layout:
///
/// ```text
/// [    0] render target     [    1] compute write
/// [    2] read back         [    3] sRGB sampling
/// [ 6: 4] MSAA level (sample count = 1 << level)
/// [31:16] default sampler flags for the texture
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureFlags(pub u32);

impl TextureFlags {
    pub const RENDER_TARGET: u32 = 1 << 0;
    pub const COMPUTE_WRITE: u32 = 1 << 1;
    pub const READ_BACK: u32 = 1 << 2;
    pub const SRGB: u32 = 1 << 3;

    pub const MSAA_SHIFT: u32 = 4;
    pub const MSAA_MASK: u32 = 0x7 << Self::MSAA_SHIFT;

    pub const SAMPLER_SHIFT: u32 = 16;

    pub fn render_target(self) -> bool {
        self.0 & Self::RENDER_TARGET != 0
    }

    pub fn compute_write(self) -> bool {
        self.0 & Self::COMPUTE_WRITE != 0
    }

    pub fn read_back(self) -> bool {
        self.0 & Self::READ_BACK != 0
    }

    pub fn with_render_target(self) -> Self {
        Self(self.0 | Self::RENDER_TARGET)
    }

    /// Request `1 << level` samples; level 0 means no multisampling.
    pub fn with_msaa_level(self, level: u32) -> Self {
        Self((self.0 & !Self::MSAA_MASK) | ((level & 0x7) << Self::MSAA_SHIFT))
    }

    /// Requested sample count, collapsed to a count the device supports.
    pub fn sample_count(self) -> u32 {
        let level = (self.0 & Self::MSAA_MASK) >> Self::MSAA_SHIFT;
        // The device guarantees 1 and 4 only; other requests collapse down.
        match 1u32 << level {
            1 | 2 => 1,
            _ => 4,
        }
    }

    /// Sampler flag bits embedded in the texture flags.
    pub fn sampler_bits(self) -> u32 {
        self.0 >> Self::SAMPLER_SHIFT
    }
}

bitflags! {
    /// How a device texture may be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u8 {
        const COPY_SRC          = 1 << 0;
        const COPY_DST          = 1 << 1;
        const SAMPLED           = 1 << 2;
        const STORAGE           = 1 << 3;
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

/// Description of a device texture, consumed by backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_count: u8,
    pub layer_count: u16,
    pub sample_count: u32,
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            width,
            height,
            depth: 1,
            mip_count: 1,
            layer_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format,
            usage,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
