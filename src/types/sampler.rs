//! Sampler flag words and their decoded descriptor form.
//!
//! Samplers are requested through a packed `u32` flag word so the sampler
//! cache can key directly on the masked bits. [`SamplerDescriptor::decode`]
//! expands a flag word into the value type backends consume.

use super::state::CompareFunction;

/// Texture coordinate addressing outside [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Repeat,
    Mirror,
    Clamp,
}

/// Texel filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Linear,
    Nearest,
}

/// Packed sampler state word.
///
/// Bit layout:
///
/// ```text
/// [ 1: 0] address U      [ 3: 2] address V      [ 5: 4] address W
/// [ 7: 6] min filter     [ 9: 8] mag filter     [   10] mip filter
/// [15:12] compare function (0 = disabled)
/// [   31] use the texture's own sampler instead of the cache
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerFlags(pub u32);

impl SamplerFlags {
    pub const U_SHIFT: u32 = 0;
    pub const V_SHIFT: u32 = 2;
    pub const W_SHIFT: u32 = 4;
    pub const MIN_SHIFT: u32 = 6;
    pub const MAG_SHIFT: u32 = 8;
    pub const MIP_SHIFT: u32 = 10;
    pub const COMPARE_SHIFT: u32 = 12;

    pub const ADDRESS_MASK: u32 = 0x3;
    pub const FILTER_MASK: u32 = 0x3;
    pub const COMPARE_MASK: u32 = 0xf;

    /// All bits that participate in sampler-cache keys.
    pub const CACHE_MASK: u32 = 0x0000_f7ff;

    /// Marker: bind the texture's own default sampler.
    pub const INTERNAL_DEFAULT: u32 = 1 << 31;

    pub fn address_u(self) -> AddressMode {
        decode_address((self.0 >> Self::U_SHIFT) & Self::ADDRESS_MASK)
    }

    pub fn address_v(self) -> AddressMode {
        decode_address((self.0 >> Self::V_SHIFT) & Self::ADDRESS_MASK)
    }

    pub fn address_w(self) -> AddressMode {
        decode_address((self.0 >> Self::W_SHIFT) & Self::ADDRESS_MASK)
    }

    pub fn min_filter(self) -> FilterMode {
        decode_filter((self.0 >> Self::MIN_SHIFT) & Self::FILTER_MASK)
    }

    pub fn mag_filter(self) -> FilterMode {
        decode_filter((self.0 >> Self::MAG_SHIFT) & Self::FILTER_MASK)
    }

    pub fn mip_filter(self) -> FilterMode {
        decode_filter((self.0 >> Self::MIP_SHIFT) & 0x1)
    }

    pub fn compare(self) -> Option<CompareFunction> {
        let code = (self.0 >> Self::COMPARE_SHIFT) & Self::COMPARE_MASK;
        if code == 0 {
            None
        } else {
            Some(CompareFunction::from_bits(code))
        }
    }

    pub fn uses_internal_default(self) -> bool {
        self.0 & Self::INTERNAL_DEFAULT != 0
    }

    /// The bits used as the sampler-cache key.
    pub fn cache_key(self) -> u32 {
        self.0 & Self::CACHE_MASK
    }

    pub fn with_clamp(self) -> Self {
        let clamp = 2u32;
        Self(
            self.0
                | clamp << Self::U_SHIFT
                | clamp << Self::V_SHIFT
                | clamp << Self::W_SHIFT,
        )
    }

    pub fn with_nearest(self) -> Self {
        Self(self.0 | 1 << Self::MIN_SHIFT | 1 << Self::MAG_SHIFT | 1 << Self::MIP_SHIFT)
    }

    pub fn with_compare(self, func: CompareFunction) -> Self {
        Self(self.0 | (func.to_bits() & Self::COMPARE_MASK) << Self::COMPARE_SHIFT)
    }
}

fn decode_address(bits: u32) -> AddressMode {
    match bits {
        1 => AddressMode::Mirror,
        2 => AddressMode::Clamp,
        _ => AddressMode::Repeat,
    }
}

fn decode_filter(bits: u32) -> FilterMode {
    match bits {
        1 => FilterMode::Nearest,
        _ => FilterMode::Linear,
    }
}

/// Decoded sampler state, consumed by backends.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SamplerDescriptor {
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mip_filter: FilterMode,
    pub compare: Option<CompareFunction>,
}

impl SamplerDescriptor {
    /// Expand a packed flag word.
    pub fn decode(flags: SamplerFlags) -> Self {
        Self {
            address_u: flags.address_u(),
            address_v: flags.address_v(),
            address_w: flags.address_w(),
            min_filter: flags.min_filter(),
            mag_filter: flags.mag_filter(),
            mip_filter: flags.mip_filter(),
            compare: flags.compare(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags_decode() {
        let desc = SamplerDescriptor::decode(SamplerFlags::default());
        assert_eq!(desc.address_u, AddressMode::Repeat);
        assert_eq!(desc.min_filter, FilterMode::Linear);
        assert!(desc.compare.is_none());
    }

    #[test]
    fn test_clamp_nearest() {
        let flags = SamplerFlags::default().with_clamp().with_nearest();
        let desc = SamplerDescriptor::decode(flags);
        assert_eq!(desc.address_u, AddressMode::Clamp);
        assert_eq!(desc.address_v, AddressMode::Clamp);
        assert_eq!(desc.address_w, AddressMode::Clamp);
        assert_eq!(desc.min_filter, FilterMode::Nearest);
        assert_eq!(desc.mag_filter, FilterMode::Nearest);
        assert_eq!(desc.mip_filter, FilterMode::Nearest);
    }

    #[test]
    fn test_compare_roundtrip() {
        let flags = SamplerFlags::default().with_compare(CompareFunction::LessEqual);
        assert_eq!(flags.compare(), Some(CompareFunction::LessEqual));
    }

    #[test]
    fn test_internal_default_not_in_cache_key() {
        let flags = SamplerFlags(SamplerFlags::INTERNAL_DEFAULT | 0x2);
        assert_eq!(flags.cache_key(), 0x2);
        assert!(flags.uses_internal_default());
    }
}
