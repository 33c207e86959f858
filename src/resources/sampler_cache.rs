//! Sampler cache keyed by masked sampler-flag words.

use std::collections::HashMap;

use crate::backend::{GpuSampler, RenderBackend};
use crate::types::sampler::{SamplerDescriptor, SamplerFlags};

/// Append-only map from sampler-flag bits to device samplers.
///
/// Single-threaded by design; shard or lock it before introducing a
/// second submission thread.
#[derive(Default)]
pub struct SamplerCache {
    map: HashMap<u32, GpuSampler>,
}

impl SamplerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the sampler for a flag word.
    pub fn get(&mut self, backend: &dyn RenderBackend, flags: SamplerFlags) -> GpuSampler {
        let key = flags.cache_key();
        if let Some(sampler) = self.map.get(&key) {
            return sampler.clone();
        }
        let sampler = backend.create_sampler(&SamplerDescriptor::decode(SamplerFlags(key)));
        log::trace!("created sampler for flags {key:#06x}");
        self.map.insert(key, sampler.clone());
        sampler
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop every cached sampler.
    pub fn invalidate(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;

    #[test]
    fn test_cache_hit_on_same_flags() {
        let backend = NullBackend::new();
        let mut cache = SamplerCache::new();

        cache.get(&backend, SamplerFlags::default().with_clamp());
        cache.get(&backend, SamplerFlags::default().with_clamp());
        assert_eq!(cache.len(), 1);
        assert_eq!(backend.stats().samplers_created, 1);
    }

    #[test]
    fn test_distinct_flags_create_distinct_samplers() {
        let backend = NullBackend::new();
        let mut cache = SamplerCache::new();

        cache.get(&backend, SamplerFlags::default());
        cache.get(&backend, SamplerFlags::default().with_nearest());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_internal_default_bit_ignored_in_key() {
        let backend = NullBackend::new();
        let mut cache = SamplerCache::new();

        cache.get(&backend, SamplerFlags(0x2));
        cache.get(&backend, SamplerFlags(0x2 | SamplerFlags::INTERNAL_DEFAULT));
        assert_eq!(cache.len(), 1);
    }
}
