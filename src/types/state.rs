//! Packed render-state and stencil-state words.
//!
//! Draw items carry their fixed-function state as one `u64`
//! ([`RenderState`]) plus one packed stencil word ([`StencilState`]), so the
//! submission loop can diff consecutive draws with a couple of XORs and the
//! pipeline cache can hash exactly the bits that affect pipeline shape.

use bitflags::bitflags;

/// Depth/stencil comparison function.
///
/// The discriminants are the 4-bit codes used inside packed state words;
/// `0` means "disabled" at the packing layer and decodes to `Always`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    Less = 1,
    LessEqual = 2,
    Equal = 3,
    GreaterEqual = 4,
    Greater = 5,
    NotEqual = 6,
    Never = 7,
    #[default]
    Always = 8,
}

impl CompareFunction {
    pub fn from_bits(bits: u32) -> Self {
        match bits {
            1 => Self::Less,
            2 => Self::LessEqual,
            3 => Self::Equal,
            4 => Self::GreaterEqual,
            5 => Self::Greater,
            6 => Self::NotEqual,
            7 => Self::Never,
            _ => Self::Always,
        }
    }

    pub fn to_bits(self) -> u32 {
        self as u32
    }
}

/// Source/destination blend factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    DstColor,
    OneMinusDstColor,
    SrcAlphaSaturated,
    Constant,
    OneMinusConstant,
}

impl BlendFactor {
    /// Decode a 4-bit factor code. Color-channel factors degrade to their
    /// alpha-channel counterparts when `alpha` is set, matching how a
    /// single packed word drives both blend components.
    pub fn from_bits(bits: u32, alpha: bool) -> Self {
        match (bits, alpha) {
            (1, _) => Self::Zero,
            (2, _) => Self::One,
            (3, false) => Self::SrcColor,
            (3, true) => Self::SrcAlpha,
            (4, false) => Self::OneMinusSrcColor,
            (4, true) => Self::OneMinusSrcAlpha,
            (5, _) => Self::SrcAlpha,
            (6, _) => Self::OneMinusSrcAlpha,
            (7, _) => Self::DstAlpha,
            (8, _) => Self::OneMinusDstAlpha,
            (9, false) => Self::DstColor,
            (9, true) => Self::DstAlpha,
            (10, false) => Self::OneMinusDstColor,
            (10, true) => Self::OneMinusDstAlpha,
            (11, false) => Self::SrcAlphaSaturated,
            (11, true) => Self::One,
            (12, _) => Self::Constant,
            (13, _) => Self::OneMinusConstant,
            _ => Self::One,
        }
    }

    /// Packing code for the color channel of this factor.
    pub fn to_bits(self) -> u32 {
        match self {
            Self::Zero => 1,
            Self::One => 2,
            Self::SrcColor => 3,
            Self::OneMinusSrcColor => 4,
            Self::SrcAlpha => 5,
            Self::OneMinusSrcAlpha => 6,
            Self::DstAlpha => 7,
            Self::OneMinusDstAlpha => 8,
            Self::DstColor => 9,
            Self::OneMinusDstColor => 10,
            Self::SrcAlphaSaturated => 11,
            Self::Constant => 12,
            Self::OneMinusConstant => 13,
        }
    }
}

/// Blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    #[default]
    Add = 0,
    Subtract = 1,
    ReverseSubtract = 2,
    Min = 3,
    Max = 4,
}

impl BlendOperation {
    pub fn from_bits(bits: u32) -> Self {
        match bits {
            1 => Self::Subtract,
            2 => Self::ReverseSubtract,
            3 => Self::Min,
            4 => Self::Max,
            _ => Self::Add,
        }
    }
}

/// Stencil operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    Zero = 0,
    #[default]
    Keep = 1,
    Replace = 2,
    IncrementWrap = 3,
    IncrementClamp = 4,
    DecrementWrap = 5,
    DecrementClamp = 6,
    Invert = 7,
}

impl StencilOperation {
    pub fn from_bits(bits: u32) -> Self {
        match bits {
            0 => Self::Zero,
            2 => Self::Replace,
            3 => Self::IncrementWrap,
            4 => Self::IncrementClamp,
            5 => Self::DecrementWrap,
            6 => Self::DecrementClamp,
            7 => Self::Invert,
            _ => Self::Keep,
        }
    }
}

/// Face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None = 0,
    Front = 1,
    Back = 2,
}

/// Primitive assembly topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList = 0,
    TriangleStrip = 1,
    LineList = 2,
    LineStrip = 3,
    PointList = 4,
}

/// Per-topology vertex-to-primitive arithmetic.
///
/// `prims = count / div - sub`, with `min` the smallest drawable count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimInfo {
    pub topology: PrimitiveTopology,
    pub min: u32,
    pub div: u32,
    pub sub: u32,
}

const PRIM_INFO: [PrimInfo; 5] = [
    PrimInfo {
        topology: PrimitiveTopology::TriangleList,
        min: 3,
        div: 3,
        sub: 0,
    },
    PrimInfo {
        topology: PrimitiveTopology::TriangleStrip,
        min: 3,
        div: 1,
        sub: 2,
    },
    PrimInfo {
        topology: PrimitiveTopology::LineList,
        min: 2,
        div: 2,
        sub: 0,
    },
    PrimInfo {
        topology: PrimitiveTopology::LineStrip,
        min: 2,
        div: 1,
        sub: 1,
    },
    PrimInfo {
        topology: PrimitiveTopology::PointList,
        min: 1,
        div: 1,
        sub: 0,
    },
];

impl PrimInfo {
    /// Look up by the 3-bit topology code packed into a state word.
    pub fn from_index(index: u8) -> PrimInfo {
        PRIM_INFO[(index as usize).min(PRIM_INFO.len() - 1)]
    }

    /// Number of primitives a vertex/index count yields, zero below `min`.
    pub fn prim_count(&self, count: u32) -> u32 {
        if count < self.min {
            0
        } else {
            count / self.div - self.sub
        }
    }
}

bitflags! {
    /// Color channel write mask, extracted from a state word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WriteMask: u8 {
        const RED   = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE  = 1 << 2;
        const ALPHA = 1 << 3;
    }
}

/// Packed draw state word.
///
/// Bit layout:
///
/// ```text
/// [ 4: 0] write R/G/B/A/Z
/// [11: 8] depth test function (0 = disabled)
/// [27:12] blend factors: src rgb, dst rgb, src a, dst a (4 bits each)
/// [33:28] blend equations: rgb, a (3 bits each)
/// [   34] independent per-attachment blending
/// [   35] alpha to coverage
/// [37:36] cull mode
/// [42:40] primitive topology
/// [   44] MSAA            [   45] line AA     [   46] conservative raster
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderState(pub u64);

impl RenderState {
    pub const WRITE_R: u64 = 1 << 0;
    pub const WRITE_G: u64 = 1 << 1;
    pub const WRITE_B: u64 = 1 << 2;
    pub const WRITE_A: u64 = 1 << 3;
    pub const WRITE_Z: u64 = 1 << 4;
    pub const WRITE_RGB: u64 = Self::WRITE_R | Self::WRITE_G | Self::WRITE_B;

    pub const DEPTH_TEST_SHIFT: u64 = 8;
    pub const DEPTH_TEST_MASK: u64 = 0xf << Self::DEPTH_TEST_SHIFT;

    pub const BLEND_SHIFT: u64 = 12;
    pub const BLEND_MASK: u64 = 0xffff << Self::BLEND_SHIFT;

    pub const BLEND_EQUATION_SHIFT: u64 = 28;
    pub const BLEND_EQUATION_MASK: u64 = 0x3f << Self::BLEND_EQUATION_SHIFT;

    pub const BLEND_INDEPENDENT: u64 = 1 << 34;
    pub const BLEND_ALPHA_TO_COVERAGE: u64 = 1 << 35;

    pub const CULL_SHIFT: u64 = 36;
    pub const CULL_MASK: u64 = 0x3 << Self::CULL_SHIFT;

    pub const PT_SHIFT: u64 = 40;
    pub const PT_MASK: u64 = 0x7 << Self::PT_SHIFT;

    pub const MSAA: u64 = 1 << 44;
    pub const LINEAA: u64 = 1 << 45;
    pub const CONSERVATIVE_RASTER: u64 = 1 << 46;

    /// Everything that affects compiled pipeline shape. The pipeline cache
    /// masks incoming state with this before hashing.
    pub const PIPELINE_MASK: u64 = Self::WRITE_RGB
        | Self::WRITE_A
        | Self::WRITE_Z
        | Self::DEPTH_TEST_MASK
        | Self::BLEND_MASK
        | Self::BLEND_EQUATION_MASK
        | Self::BLEND_INDEPENDENT
        | Self::BLEND_ALPHA_TO_COVERAGE
        | Self::CULL_MASK
        | Self::MSAA
        | Self::LINEAA
        | Self::CONSERVATIVE_RASTER
        | Self::PT_MASK;

    /// Opaque default: write color + depth, depth test Less, no blend.
    pub fn opaque() -> Self {
        Self(Self::WRITE_RGB | Self::WRITE_A | Self::WRITE_Z)
            .with_depth_test(CompareFunction::Less)
    }

    pub fn contains(self, bits: u64) -> bool {
        self.0 & bits == bits
    }

    pub fn masked(self, mask: u64) -> Self {
        Self(self.0 & mask)
    }

    pub fn with_depth_test(self, func: CompareFunction) -> Self {
        Self((self.0 & !Self::DEPTH_TEST_MASK) | ((func.to_bits() as u64) << Self::DEPTH_TEST_SHIFT))
    }

    /// Set one pair of blend factors for both color and alpha.
    pub fn with_blend(self, src: BlendFactor, dst: BlendFactor) -> Self {
        let s = src.to_bits() as u64;
        let d = dst.to_bits() as u64;
        let packed = s | d << 4 | s << 8 | d << 12;
        Self((self.0 & !Self::BLEND_MASK) | packed << Self::BLEND_SHIFT)
    }

    pub fn with_cull(self, mode: CullMode) -> Self {
        Self((self.0 & !Self::CULL_MASK) | ((mode as u64) << Self::CULL_SHIFT))
    }

    pub fn with_topology(self, topology: PrimitiveTopology) -> Self {
        Self((self.0 & !Self::PT_MASK) | ((topology as u64) << Self::PT_SHIFT))
    }

    pub fn write_mask(self) -> WriteMask {
        let mut mask = WriteMask::empty();
        if self.contains(Self::WRITE_R) {
            mask |= WriteMask::RED;
        }
        if self.contains(Self::WRITE_G) {
            mask |= WriteMask::GREEN;
        }
        if self.contains(Self::WRITE_B) {
            mask |= WriteMask::BLUE;
        }
        if self.contains(Self::WRITE_A) {
            mask |= WriteMask::ALPHA;
        }
        mask
    }

    pub fn depth_write(self) -> bool {
        self.contains(Self::WRITE_Z)
    }

    /// Depth comparison, `None` when depth testing is disabled.
    pub fn depth_test(self) -> Option<CompareFunction> {
        let code = ((self.0 & Self::DEPTH_TEST_MASK) >> Self::DEPTH_TEST_SHIFT) as u32;
        if code == 0 {
            None
        } else {
            Some(CompareFunction::from_bits(code))
        }
    }

    pub fn blend_enabled(self) -> bool {
        self.0 & Self::BLEND_MASK != 0
    }

    /// (src, dst, equation) for the color channel.
    pub fn blend_rgb(self) -> (BlendFactor, BlendFactor, BlendOperation) {
        let blend = ((self.0 & Self::BLEND_MASK) >> Self::BLEND_SHIFT) as u32;
        let equation = ((self.0 & Self::BLEND_EQUATION_MASK) >> Self::BLEND_EQUATION_SHIFT) as u32;
        (
            BlendFactor::from_bits(blend & 0xf, false),
            BlendFactor::from_bits((blend >> 4) & 0xf, false),
            BlendOperation::from_bits(equation & 0x7),
        )
    }

    /// (src, dst, equation) for the alpha channel.
    pub fn blend_alpha(self) -> (BlendFactor, BlendFactor, BlendOperation) {
        let blend = ((self.0 & Self::BLEND_MASK) >> Self::BLEND_SHIFT) as u32;
        let equation = ((self.0 & Self::BLEND_EQUATION_MASK) >> Self::BLEND_EQUATION_SHIFT) as u32;
        (
            BlendFactor::from_bits((blend >> 8) & 0xf, true),
            BlendFactor::from_bits((blend >> 12) & 0xf, true),
            BlendOperation::from_bits((equation >> 3) & 0x7),
        )
    }

    pub fn cull_mode(self) -> CullMode {
        match (self.0 & Self::CULL_MASK) >> Self::CULL_SHIFT {
            1 => CullMode::Front,
            2 => CullMode::Back,
            _ => CullMode::None,
        }
    }

    /// 3-bit topology code.
    pub fn topology_index(self) -> u8 {
        ((self.0 & Self::PT_MASK) >> Self::PT_SHIFT) as u8
    }

    pub fn alpha_to_coverage(self) -> bool {
        self.contains(Self::BLEND_ALPHA_TO_COVERAGE)
    }

    pub fn independent_blend(self) -> bool {
        self.contains(Self::BLEND_INDEPENDENT)
    }
}

/// Decode one 11-bit independent-blend group from the blend-factor word:
/// src factor (4 bits), dst factor (4 bits), equation (3 bits).
pub fn decode_independent_blend(group: u32) -> (BlendFactor, BlendFactor, BlendOperation) {
    (
        BlendFactor::from_bits(group & 0xf, false),
        BlendFactor::from_bits((group >> 4) & 0xf, false),
        BlendOperation::from_bits((group >> 8) & 0x7),
    )
}

/// Stencil state for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StencilFace {
    pub compare: CompareFunction,
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
    pub reference: u8,
    pub read_mask: u8,
}

/// Packed stencil word: front face in the low 32 bits, back face in the
/// high 32 bits. A zero word disables stencil; a zero back face mirrors
/// the front face.
///
/// Per-face layout:
///
/// ```text
/// [ 3: 0] test function (0 = disabled)
/// [11: 4] reference value
/// [19:12] read mask
/// [23:20] fail op    [27:24] depth-fail op    [31:28] pass op
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StencilState(pub u64);

impl StencilState {
    pub const NONE: StencilState = StencilState(0);

    pub const TEST_SHIFT: u32 = 0;
    pub const REF_SHIFT: u32 = 4;
    pub const READ_MASK_SHIFT: u32 = 12;
    pub const FAIL_S_SHIFT: u32 = 20;
    pub const FAIL_Z_SHIFT: u32 = 24;
    pub const PASS_Z_SHIFT: u32 = 28;

    /// Pack separate front/back words.
    pub fn pack(front: u32, back: u32) -> Self {
        Self(front as u64 | (back as u64) << 32)
    }

    pub fn front_bits(self) -> u32 {
        self.0 as u32
    }

    pub fn back_bits(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn enabled(self) -> bool {
        self.0 != 0
    }

    /// Decoded front face.
    pub fn front(self) -> StencilFace {
        decode_face(self.front_bits())
    }

    /// Decoded back face; a zero back word mirrors the front face.
    pub fn back(self) -> StencilFace {
        let back = self.back_bits();
        if back == 0 {
            self.front()
        } else {
            decode_face(back)
        }
    }

    /// Build one face word.
    pub fn face(
        compare: CompareFunction,
        reference: u8,
        read_mask: u8,
        fail_op: StencilOperation,
        depth_fail_op: StencilOperation,
        pass_op: StencilOperation,
    ) -> u32 {
        compare.to_bits() << Self::TEST_SHIFT
            | (reference as u32) << Self::REF_SHIFT
            | (read_mask as u32) << Self::READ_MASK_SHIFT
            | (fail_op as u32) << Self::FAIL_S_SHIFT
            | (depth_fail_op as u32) << Self::FAIL_Z_SHIFT
            | (pass_op as u32) << Self::PASS_Z_SHIFT
    }
}

fn decode_face(bits: u32) -> StencilFace {
    StencilFace {
        compare: if bits & 0xf == 0 {
            CompareFunction::Always
        } else {
            CompareFunction::from_bits(bits & 0xf)
        },
        reference: ((bits >> StencilState::REF_SHIFT) & 0xff) as u8,
        read_mask: ((bits >> StencilState::READ_MASK_SHIFT) & 0xff) as u8,
        fail_op: StencilOperation::from_bits((bits >> StencilState::FAIL_S_SHIFT) & 0xf),
        depth_fail_op: StencilOperation::from_bits((bits >> StencilState::FAIL_Z_SHIFT) & 0xf),
        pass_op: StencilOperation::from_bits((bits >> StencilState::PASS_Z_SHIFT) & 0xf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prim_info_counts() {
        let tris = PrimInfo::from_index(0);
        assert_eq!(tris.prim_count(3), 1);
        assert_eq!(tris.prim_count(6), 2);
        assert_eq!(tris.prim_count(2), 0);

        let strip = PrimInfo::from_index(1);
        assert_eq!(strip.prim_count(3), 1);
        assert_eq!(strip.prim_count(5), 3);

        let lines = PrimInfo::from_index(2);
        assert_eq!(lines.prim_count(4), 2);
    }

    #[test]
    fn test_depth_test_roundtrip() {
        let state = RenderState::default().with_depth_test(CompareFunction::GreaterEqual);
        assert_eq!(state.depth_test(), Some(CompareFunction::GreaterEqual));
        assert_eq!(RenderState::default().depth_test(), None);
    }

    #[test]
    fn test_blend_roundtrip() {
        let state = RenderState::default()
            .with_blend(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
        assert!(state.blend_enabled());
        let (src, dst, op) = state.blend_rgb();
        assert_eq!(src, BlendFactor::SrcAlpha);
        assert_eq!(dst, BlendFactor::OneMinusSrcAlpha);
        assert_eq!(op, BlendOperation::Add);

        // Alpha channel mirrors the same factors.
        let (src_a, dst_a, _) = state.blend_alpha();
        assert_eq!(src_a, BlendFactor::SrcAlpha);
        assert_eq!(dst_a, BlendFactor::OneMinusSrcAlpha);
    }

    #[test]
    fn test_color_factor_degrades_for_alpha() {
        assert_eq!(BlendFactor::from_bits(3, false), BlendFactor::SrcColor);
        assert_eq!(BlendFactor::from_bits(3, true), BlendFactor::SrcAlpha);
        assert_eq!(BlendFactor::from_bits(9, true), BlendFactor::DstAlpha);
        assert_eq!(BlendFactor::from_bits(11, true), BlendFactor::One);
    }

    #[test]
    fn test_topology_and_cull() {
        let state = RenderState::opaque()
            .with_topology(PrimitiveTopology::LineStrip)
            .with_cull(CullMode::Back);
        assert_eq!(state.topology_index(), 3);
        assert_eq!(state.cull_mode(), CullMode::Back);
        assert_eq!(
            PrimInfo::from_index(state.topology_index()).topology,
            PrimitiveTopology::LineStrip
        );
    }

    #[test]
    fn test_write_mask() {
        let state = RenderState(RenderState::WRITE_R | RenderState::WRITE_A);
        assert_eq!(state.write_mask(), WriteMask::RED | WriteMask::ALPHA);
    }

    #[test]
    fn test_pipeline_mask_strips_irrelevant_bits() {
        // A bit outside the pipeline mask must not survive masking.
        let state = RenderState(RenderState::WRITE_RGB | 1 << 60);
        assert_eq!(
            state.masked(RenderState::PIPELINE_MASK).0,
            RenderState::WRITE_RGB
        );
    }

    #[test]
    fn test_stencil_pack_unpack() {
        let front = StencilState::face(
            CompareFunction::Equal,
            0x80,
            0xff,
            StencilOperation::Keep,
            StencilOperation::IncrementClamp,
            StencilOperation::Replace,
        );
        let packed = StencilState::pack(front, 0);
        assert!(packed.enabled());

        let face = packed.front();
        assert_eq!(face.compare, CompareFunction::Equal);
        assert_eq!(face.reference, 0x80);
        assert_eq!(face.read_mask, 0xff);
        assert_eq!(face.depth_fail_op, StencilOperation::IncrementClamp);
        assert_eq!(face.pass_op, StencilOperation::Replace);

        // Zero back face mirrors the front.
        assert_eq!(packed.back(), face);
    }

    #[test]
    fn test_independent_blend_group_decode() {
        let group = BlendFactor::SrcAlpha.to_bits()
            | BlendFactor::OneMinusSrcAlpha.to_bits() << 4
            | (BlendOperation::ReverseSubtract as u32) << 8;
        let (src, dst, op) = decode_independent_blend(group);
        assert_eq!(src, BlendFactor::SrcAlpha);
        assert_eq!(dst, BlendFactor::OneMinusSrcAlpha);
        assert_eq!(op, BlendOperation::ReverseSubtract);
    }
}
