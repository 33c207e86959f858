//! Vertex layout declarations.
//!
//! A [`VertexLayout`] describes one vertex stream: which attributes it
//! carries, their component type/count and byte offsets, and the stride.
//! Layouts carry a content hash so the pipeline cache can key on them
//! without walking the attribute table.

use xxhash_rust::xxh3::Xxh3;

/// Semantic identity of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VertexAttribKind {
    Position,
    Normal,
    Tangent,
    Bitangent,
    Color0,
    Color1,
    Indices,
    Weight,
    TexCoord0,
    TexCoord1,
    TexCoord2,
    TexCoord3,
}

impl VertexAttribKind {
    pub const COUNT: usize = 12;

    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            0 => Some(Self::Position),
            1 => Some(Self::Normal),
            2 => Some(Self::Tangent),
            3 => Some(Self::Bitangent),
            4 => Some(Self::Color0),
            5 => Some(Self::Color1),
            6 => Some(Self::Indices),
            7 => Some(Self::Weight),
            8 => Some(Self::TexCoord0),
            9 => Some(Self::TexCoord1),
            10 => Some(Self::TexCoord2),
            11 => Some(Self::TexCoord3),
            _ => None,
        }
    }

    pub fn id(self) -> u16 {
        self as u16
    }
}

/// Component type of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VertexAttribType {
    Uint8,
    Int16,
    Half,
    Float,
}

impl VertexAttribType {
    pub fn byte_size(self) -> u16 {
        match self {
            Self::Uint8 => 1,
            Self::Int16 | Self::Half => 2,
            Self::Float => 4,
        }
    }
}

/// Device-facing vertex attribute format, derived from
/// (type, component count, normalized).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Uint8x2,
    Uint8x4,
    Unorm8x2,
    Unorm8x4,
    Int16x2,
    Int16x4,
    Snorm16x2,
    Snorm16x4,
    Half2,
    Half4,
    Float,
    Float2,
    Float3,
    Float4,
}

/// Map (type, count, normalized) to the device format. Odd component
/// counts of integer/half types round up to the next expressible width.
pub fn device_vertex_format(
    ty: VertexAttribType,
    count: u8,
    normalized: bool,
) -> VertexFormat {
    match ty {
        VertexAttribType::Uint8 => match (count > 2, normalized) {
            (false, false) => VertexFormat::Uint8x2,
            (false, true) => VertexFormat::Unorm8x2,
            (true, false) => VertexFormat::Uint8x4,
            (true, true) => VertexFormat::Unorm8x4,
        },
        VertexAttribType::Int16 => match (count > 2, normalized) {
            (false, false) => VertexFormat::Int16x2,
            (false, true) => VertexFormat::Snorm16x2,
            (true, false) => VertexFormat::Int16x4,
            (true, true) => VertexFormat::Snorm16x4,
        },
        VertexAttribType::Half => {
            if count > 2 {
                VertexFormat::Half4
            } else {
                VertexFormat::Half2
            }
        }
        VertexAttribType::Float => match count {
            1 => VertexFormat::Float,
            2 => VertexFormat::Float2,
            3 => VertexFormat::Float3,
            _ => VertexFormat::Float4,
        },
    }
}

/// One attribute inside a [`VertexLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttrib {
    pub offset: u16,
    pub count: u8,
    pub ty: VertexAttribType,
    pub normalized: bool,
}

impl VertexAttrib {
    pub fn device_format(&self) -> VertexFormat {
        device_vertex_format(self.ty, self.count, self.normalized)
    }
}

/// How a bound vertex buffer advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepMode {
    #[default]
    Vertex,
    Instance,
}

/// Declaration of one vertex stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    attribs: [Option<VertexAttrib>; VertexAttribKind::COUNT],
    stride: u16,
    hash: u64,
}

impl VertexLayout {
    /// Start building a layout.
    pub fn builder() -> VertexLayoutBuilder {
        VertexLayoutBuilder {
            attribs: [None; VertexAttribKind::COUNT],
            stride: 0,
        }
    }

    pub fn stride(&self) -> u16 {
        self.stride
    }

    /// Content hash over stride and every declared attribute.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn has(&self, kind: VertexAttribKind) -> bool {
        self.attribs[kind as usize].is_some()
    }

    pub fn attrib(&self, kind: VertexAttribKind) -> Option<&VertexAttrib> {
        self.attribs[kind as usize].as_ref()
    }

    /// Iterate declared attributes with their kinds.
    pub fn attribs(&self) -> impl Iterator<Item = (VertexAttribKind, &VertexAttrib)> {
        self.attribs.iter().enumerate().filter_map(|(i, a)| {
            a.as_ref()
                .map(|a| (VertexAttribKind::from_id(i as u16).unwrap(), a))
        })
    }
}

/// Builder accumulating attributes at increasing offsets.
pub struct VertexLayoutBuilder {
    attribs: [Option<VertexAttrib>; VertexAttribKind::COUNT],
    stride: u16,
}

impl VertexLayoutBuilder {
    /// Append an attribute at the current stride offset.
    pub fn add(
        mut self,
        kind: VertexAttribKind,
        count: u8,
        ty: VertexAttribType,
        normalized: bool,
    ) -> Self {
        debug_assert!((1..=4).contains(&count));
        let attrib = VertexAttrib {
            offset: self.stride,
            count,
            ty,
            normalized,
        };
        self.stride += ty.byte_size() * count as u16;
        self.attribs[kind as usize] = Some(attrib);
        self
    }

    /// Leave a gap of `bytes` in the stride without declaring an attribute.
    pub fn skip(mut self, bytes: u16) -> Self {
        self.stride += bytes;
        self
    }

    /// Finish and compute the content hash.
    pub fn build(self) -> VertexLayout {
        let mut hasher = Xxh3::new();
        hasher.update(&self.stride.to_le_bytes());
        for (i, attrib) in self.attribs.iter().enumerate() {
            if let Some(a) = attrib {
                hasher.update(&(i as u16).to_le_bytes());
                hasher.update(&a.offset.to_le_bytes());
                hasher.update(&[a.count, a.ty as u8, a.normalized as u8]);
            }
        }
        VertexLayout {
            attribs: self.attribs,
            stride: self.stride,
            hash: hasher.digest(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos_normal_uv() -> VertexLayout {
        VertexLayout::builder()
            .add(VertexAttribKind::Position, 3, VertexAttribType::Float, false)
            .add(VertexAttribKind::Normal, 3, VertexAttribType::Float, false)
            .add(VertexAttribKind::TexCoord0, 2, VertexAttribType::Float, false)
            .build()
    }

    #[test]
    fn test_offsets_and_stride() {
        let layout = pos_normal_uv();
        assert_eq!(layout.stride(), 32);
        assert_eq!(layout.attrib(VertexAttribKind::Position).unwrap().offset, 0);
        assert_eq!(layout.attrib(VertexAttribKind::Normal).unwrap().offset, 12);
        assert_eq!(
            layout.attrib(VertexAttribKind::TexCoord0).unwrap().offset,
            24
        );
        assert!(!layout.has(VertexAttribKind::Color0));
    }

    #[test]
    fn test_hash_distinguishes_layouts() {
        let a = pos_normal_uv();
        let b = VertexLayout::builder()
            .add(VertexAttribKind::Position, 3, VertexAttribType::Float, false)
            .build();
        let c = pos_normal_uv();
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), c.hash());
    }

    #[test]
    fn test_skip_affects_hash() {
        let a = VertexLayout::builder()
            .add(VertexAttribKind::Position, 3, VertexAttribType::Float, false)
            .build();
        let b = VertexLayout::builder()
            .add(VertexAttribKind::Position, 3, VertexAttribType::Float, false)
            .skip(4)
            .build();
        assert_ne!(a.hash(), b.hash());
        assert_eq!(b.stride(), 16);
    }

    #[test]
    fn test_device_format_mapping() {
        assert_eq!(
            device_vertex_format(VertexAttribType::Float, 3, false),
            VertexFormat::Float3
        );
        assert_eq!(
            device_vertex_format(VertexAttribType::Uint8, 4, true),
            VertexFormat::Unorm8x4
        );
        // 3-component int16 rounds up to 4.
        assert_eq!(
            device_vertex_format(VertexAttribType::Int16, 3, false),
            VertexFormat::Int16x4
        );
    }
}
