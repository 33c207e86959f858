//! Shader binary container parsing and reflection.
//!
//! A shader arrives as a self-describing binary blob: a small header, a
//! reflected uniform table, the backend bytecode, a vertex-attribute usage
//! table and the size of the shader's constant block. [`ShaderBlob::parse`]
//! decodes the container; [`ShaderBlobWriter`] produces it (offline tooling
//! and tests).
//!
//! Container layout:
//!
//! ```text
//! magic            4 bytes  "CVSH" | "CFSH" | "CCSH"
//! hash_in          u32      input (source) hash
//! hash_out         u32      output (bytecode) hash
//! uniform count    u16
//!   per uniform:   name_len u8, name bytes,
//!                  type u8 (low nibble = UniformType,
//!                           0x10 = fragment stage, 0x20 = sampler),
//!                  num u8, reg_index u16, reg_count u16
//! [compute only]   thread counts 3 x u16
//! code size        u32, followed by the bytecode
//! attribute count  u8, followed by u16 attribute ids
//! constant size    u16      shader constant block, bytes
//! ```

use crate::error::RenderError;
use crate::types::vertex::VertexAttribKind;
use xxhash_rust::xxh3::Xxh3;

/// Stage of a shader blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderKind {
    fn magic(self) -> &'static [u8; 4] {
        match self {
            Self::Vertex => b"CVSH",
            Self::Fragment => b"CFSH",
            Self::Compute => b"CCSH",
        }
    }
}

/// Type of a reflected uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UniformType {
    /// Sampler stage index (one `u32`).
    Sampler = 0,
    Vec4 = 1,
    Mat3 = 2,
    Mat4 = 3,
}

impl UniformType {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Sampler),
            1 => Some(Self::Vec4),
            2 => Some(Self::Mat3),
            3 => Some(Self::Mat4),
            _ => None,
        }
    }

    /// Size in bytes of one element, as laid out in the constant block.
    pub fn byte_size(self) -> u32 {
        match self {
            Self::Sampler => 4,
            Self::Vec4 => 16,
            Self::Mat3 => 48,
            Self::Mat4 => 64,
        }
    }
}

const FRAGMENT_BIT: u8 = 0x10;
const SAMPLER_BIT: u8 = 0x20;

/// Uniforms whose values the renderer supplies from per-view state rather
/// than the frame's uniform log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredefinedUniform {
    View,
    Proj,
    ViewProj,
    Model,
}

impl PredefinedUniform {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "u_view" => Some(Self::View),
            "u_proj" => Some(Self::Proj),
            "u_viewProj" => Some(Self::ViewProj),
            "u_model" => Some(Self::Model),
            _ => None,
        }
    }
}

/// One entry of the reflected uniform table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderUniform {
    pub name: String,
    pub ty: UniformType,
    pub num: u8,
    pub reg_index: u16,
    pub reg_count: u16,
    pub fragment: bool,
}

/// A texture/sampler pair slot reflected from a shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerSlot {
    pub name: String,
    /// Binding register inside the texture/sampler bind groups.
    pub reg_index: u16,
}

/// A predefined uniform reference inside one shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredefinedRef {
    pub which: PredefinedUniform,
    pub reg_index: u16,
    pub fragment: bool,
}

/// Fully decoded shader container.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderBlob {
    pub kind: ShaderKind,
    pub hash_in: u32,
    pub hash_out: u32,
    /// User uniforms driven by the frame's uniform log.
    pub uniforms: Vec<ShaderUniform>,
    /// Texture/sampler slots, in declaration order.
    pub samplers: Vec<SamplerSlot>,
    /// Predefined uniforms referenced by this shader.
    pub predefined: Vec<PredefinedRef>,
    /// Attribute kind -> shader input location.
    pub attr_remap: [Option<u8>; VertexAttribKind::COUNT],
    pub num_attrs: u8,
    /// Compute thread-group size; `[1, 1, 1]` for graphics stages.
    pub thread_counts: [u16; 3],
    /// Backend bytecode.
    pub code: Vec<u8>,
    /// Constant block size in bytes, rounded up to 16.
    pub const_size: u32,
    /// Content hash over hashes, code and attribute usage.
    pub hash: u64,
}

impl ShaderBlob {
    /// Parse a shader binary container.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::ShaderParseFailed`] on truncated or malformed
    /// input.
    pub fn parse(bytes: &[u8]) -> Result<ShaderBlob, RenderError> {
        let mut r = Reader::new(bytes);

        let magic = r.bytes(4)?;
        let kind = match magic {
            b"CVSH" => ShaderKind::Vertex,
            b"CFSH" => ShaderKind::Fragment,
            b"CCSH" => ShaderKind::Compute,
            _ => {
                return Err(RenderError::ShaderParseFailed(format!(
                    "bad magic {magic:02x?}"
                )))
            }
        };

        let hash_in = r.u32()?;
        let hash_out = r.u32()?;

        let count = r.u16()?;
        let mut uniforms = Vec::new();
        let mut samplers = Vec::new();
        let mut predefined = Vec::new();

        for _ in 0..count {
            let name_len = r.u8()? as usize;
            let name = std::str::from_utf8(r.bytes(name_len)?)
                .map_err(|_| RenderError::ShaderParseFailed("uniform name not UTF-8".into()))?
                .to_string();
            let type_byte = r.u8()?;
            let num = r.u8()?;
            let reg_index = r.u16()?;
            let reg_count = r.u16()?;

            let fragment = type_byte & FRAGMENT_BIT != 0;
            let ty = UniformType::from_bits(type_byte & 0x0f).ok_or_else(|| {
                RenderError::ShaderParseFailed(format!("unknown uniform type {type_byte:#x}"))
            })?;

            if type_byte & SAMPLER_BIT != 0 {
                samplers.push(SamplerSlot { name, reg_index });
            } else if let Some(which) = PredefinedUniform::from_name(&name) {
                predefined.push(PredefinedRef {
                    which,
                    reg_index,
                    fragment,
                });
            } else {
                uniforms.push(ShaderUniform {
                    name,
                    ty,
                    num,
                    reg_index,
                    reg_count,
                    fragment,
                });
            }
        }

        let thread_counts = if kind == ShaderKind::Compute {
            [r.u16()?, r.u16()?, r.u16()?]
        } else {
            [1, 1, 1]
        };

        let code_size = r.u32()? as usize;
        let code = r.bytes(code_size)?.to_vec();

        let num_attrs = r.u8()?;
        let mut attr_remap = [None; VertexAttribKind::COUNT];
        let mut attr_ids = Vec::with_capacity(num_attrs as usize);
        for location in 0..num_attrs {
            let id = r.u16()?;
            attr_ids.push(id);
            if let Some(kind) = VertexAttribKind::from_id(id) {
                attr_remap[kind as usize] = Some(location);
            }
        }

        let const_size = (r.u16()? as u32 + 15) & !15;

        let mut hasher = Xxh3::new();
        hasher.update(&hash_in.to_le_bytes());
        hasher.update(&hash_out.to_le_bytes());
        hasher.update(&code);
        hasher.update(&[num_attrs]);
        for id in &attr_ids {
            hasher.update(&id.to_le_bytes());
        }
        let hash = hasher.digest();

        log::trace!(
            "parsed {kind:?} shader: {} uniforms, {} samplers, {} attrs, {} const bytes",
            uniforms.len(),
            samplers.len(),
            num_attrs,
            const_size,
        );

        Ok(ShaderBlob {
            kind,
            hash_in,
            hash_out,
            uniforms,
            samplers,
            predefined,
            attr_remap,
            num_attrs,
            thread_counts,
            code,
            const_size,
            hash,
        })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], RenderError> {
        if self.pos + len > self.bytes.len() {
            return Err(RenderError::ShaderParseFailed(format!(
                "truncated at byte {}",
                self.pos
            )));
        }
        let out = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, RenderError> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, RenderError> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, RenderError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Builder producing the binary container [`ShaderBlob::parse`] consumes.
pub struct ShaderBlobWriter {
    kind: ShaderKind,
    hash_in: u32,
    hash_out: u32,
    uniforms: Vec<(String, u8, u8, u16, u16)>,
    thread_counts: [u16; 3],
    code: Vec<u8>,
    attrs: Vec<u16>,
    const_size: u16,
}

impl ShaderBlobWriter {
    pub fn new(kind: ShaderKind) -> Self {
        Self {
            kind,
            hash_in: 0,
            hash_out: 0,
            uniforms: Vec::new(),
            thread_counts: [1, 1, 1],
            code: Vec::new(),
            attrs: Vec::new(),
            const_size: 0,
        }
    }

    pub fn hashes(mut self, hash_in: u32, hash_out: u32) -> Self {
        self.hash_in = hash_in;
        self.hash_out = hash_out;
        self
    }

    pub fn uniform(mut self, name: &str, ty: UniformType, num: u8, reg_index: u16) -> Self {
        let reg_count = num as u16 * (ty.byte_size() / 16).max(1) as u16;
        let type_byte = ty as u8 | if self.kind == ShaderKind::Fragment { FRAGMENT_BIT } else { 0 };
        self.uniforms
            .push((name.to_string(), type_byte, num, reg_index, reg_count));
        self
    }

    pub fn sampler(mut self, name: &str, reg_index: u16) -> Self {
        let type_byte = UniformType::Sampler as u8
            | SAMPLER_BIT
            | if self.kind == ShaderKind::Fragment { FRAGMENT_BIT } else { 0 };
        self.uniforms.push((name.to_string(), type_byte, 1, reg_index, 1));
        self
    }

    pub fn thread_counts(mut self, x: u16, y: u16, z: u16) -> Self {
        self.thread_counts = [x, y, z];
        self
    }

    pub fn code(mut self, code: &[u8]) -> Self {
        self.code = code.to_vec();
        self
    }

    pub fn attr(mut self, kind: VertexAttribKind) -> Self {
        self.attrs.push(kind.id());
        self
    }

    pub fn const_size(mut self, size: u16) -> Self {
        self.const_size = size;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.kind.magic());
        out.extend_from_slice(&self.hash_in.to_le_bytes());
        out.extend_from_slice(&self.hash_out.to_le_bytes());
        out.extend_from_slice(&(self.uniforms.len() as u16).to_le_bytes());
        for (name, type_byte, num, reg_index, reg_count) in &self.uniforms {
            out.push(name.len() as u8);
            out.extend_from_slice(name.as_bytes());
            out.push(*type_byte);
            out.push(*num);
            out.extend_from_slice(&reg_index.to_le_bytes());
            out.extend_from_slice(&reg_count.to_le_bytes());
        }
        if self.kind == ShaderKind::Compute {
            for n in self.thread_counts {
                out.extend_from_slice(&n.to_le_bytes());
            }
        }
        out.extend_from_slice(&(self.code.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.code);
        out.push(self.attrs.len() as u8);
        for id in &self.attrs {
            out.extend_from_slice(&id.to_le_bytes());
        }
        out.extend_from_slice(&self.const_size.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vertex_blob() -> Vec<u8> {
        ShaderBlobWriter::new(ShaderKind::Vertex)
            .hashes(0x1111, 0x2222)
            .uniform("u_tint", UniformType::Vec4, 1, 4)
            .uniform("u_viewProj", UniformType::Mat4, 1, 0)
            .code(b"@vertex fn main() {}")
            .attr(VertexAttribKind::Position)
            .attr(VertexAttribKind::TexCoord0)
            .const_size(80)
            .build()
    }

    #[test]
    fn test_parse_roundtrip() {
        let blob = ShaderBlob::parse(&sample_vertex_blob()).unwrap();
        assert_eq!(blob.kind, ShaderKind::Vertex);
        assert_eq!(blob.hash_in, 0x1111);
        assert_eq!(blob.uniforms.len(), 1);
        assert_eq!(blob.uniforms[0].name, "u_tint");
        assert!(!blob.uniforms[0].fragment);
        assert_eq!(blob.predefined.len(), 1);
        assert_eq!(blob.predefined[0].which, PredefinedUniform::ViewProj);
        assert_eq!(blob.num_attrs, 2);
        assert_eq!(
            blob.attr_remap[VertexAttribKind::Position as usize],
            Some(0)
        );
        assert_eq!(
            blob.attr_remap[VertexAttribKind::TexCoord0 as usize],
            Some(1)
        );
        assert_eq!(blob.const_size, 80);
        assert_eq!(blob.code, b"@vertex fn main() {}");
    }

    #[test]
    fn test_const_size_rounds_up() {
        let bytes = ShaderBlobWriter::new(ShaderKind::Vertex)
            .code(b"x")
            .const_size(17)
            .build();
        let blob = ShaderBlob::parse(&bytes).unwrap();
        assert_eq!(blob.const_size, 32);
    }

    #[test]
    fn test_fragment_sampler_table() {
        let bytes = ShaderBlobWriter::new(ShaderKind::Fragment)
            .sampler("s_albedo", 0)
            .sampler("s_normal", 1)
            .uniform("u_params", UniformType::Vec4, 2, 0)
            .code(b"@fragment fn main() {}")
            .const_size(32)
            .build();
        let blob = ShaderBlob::parse(&bytes).unwrap();
        assert_eq!(blob.kind, ShaderKind::Fragment);
        assert_eq!(blob.samplers.len(), 2);
        assert_eq!(blob.samplers[0].name, "s_albedo");
        assert_eq!(blob.samplers[1].reg_index, 1);
        assert_eq!(blob.uniforms.len(), 1);
        assert!(blob.uniforms[0].fragment);
    }

    #[test]
    fn test_compute_thread_counts() {
        let bytes = ShaderBlobWriter::new(ShaderKind::Compute)
            .thread_counts(8, 8, 1)
            .code(b"@compute fn main() {}")
            .build();
        let blob = ShaderBlob::parse(&bytes).unwrap();
        assert_eq!(blob.thread_counts, [8, 8, 1]);
    }

    #[test]
    fn test_truncated_blob_fails() {
        let bytes = sample_vertex_blob();
        for cut in [0, 3, 10, bytes.len() - 1] {
            assert!(
                ShaderBlob::parse(&bytes[..cut]).is_err(),
                "cut at {cut} must fail"
            );
        }
    }

    #[test]
    fn test_bad_magic_fails() {
        let mut bytes = sample_vertex_blob();
        bytes[0] = b'X';
        assert!(matches!(
            ShaderBlob::parse(&bytes),
            Err(RenderError::ShaderParseFailed(_))
        ));
    }

    #[test]
    fn test_hash_changes_with_code_and_attrs() {
        let a = ShaderBlob::parse(&sample_vertex_blob()).unwrap();

        let other_code = ShaderBlobWriter::new(ShaderKind::Vertex)
            .hashes(0x1111, 0x2222)
            .uniform("u_tint", UniformType::Vec4, 1, 4)
            .uniform("u_viewProj", UniformType::Mat4, 1, 0)
            .code(b"@vertex fn main2() {}")
            .attr(VertexAttribKind::Position)
            .attr(VertexAttribKind::TexCoord0)
            .const_size(80)
            .build();
        let b = ShaderBlob::parse(&other_code).unwrap();
        assert_ne!(a.hash, b.hash);
    }
}
