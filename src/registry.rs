//! Per-cache engine ownership.
//!
//! The host plugin surface is free-standing functions that receive a cache
//! handle; each handle owns exactly one engine, located here. No global
//! state is involved.

use std::collections::BTreeMap;

use crate::access::{Access, Fill};
use crate::config::{BuildError, EngineConfig};
use crate::engine::Engine;
use crate::host::CacheHost;

/// An opaque host-assigned cache identifier.
pub type CacheId = u64;

/// Maps each cache to the engine it owns.
#[derive(Default)]
pub struct EngineRegistry {
    engines: BTreeMap<CacheId, Engine>,
}
impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct an engine for a cache. Replaces any previous engine for
    /// the same cache.
    pub fn register(&mut self, cache: CacheId, cfg: EngineConfig) -> Result<(), BuildError> {
        let engine = cfg.build()?;
        self.engines.insert(cache, engine);
        Ok(())
    }

    pub fn get(&self, cache: CacheId) -> Option<&Engine> {
        self.engines.get(&cache)
    }

    pub fn get_mut(&mut self, cache: CacheId) -> Option<&mut Engine> {
        self.engines.get_mut(&cache)
    }

    pub fn remove(&mut self, cache: CacheId) -> Option<Engine> {
        self.engines.remove(&cache)
    }

    /// Host pass-through. An unregistered cache is a no-op that returns
    /// the metadata unchanged.
    pub fn on_access(&mut self, cache: CacheId, host: &mut dyn CacheHost, a: Access) -> u32 {
        match self.engines.get_mut(&cache) {
            Some(engine) => engine.on_access(host, a),
            None => a.metadata,
        }
    }

    pub fn on_fill(&mut self, cache: CacheId, f: Fill) -> u32 {
        match self.engines.get_mut(&cache) {
            Some(engine) => engine.on_fill(f),
            None => f.metadata,
        }
    }

    pub fn on_cycle(&mut self, cache: CacheId) {
        if let Some(engine) = self.engines.get_mut(&cache) {
            engine.on_cycle();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CacheId, &Engine)> {
        self.engines.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::access::AccessKind;
    use crate::host::ModelHost;

    #[test]
    fn unregistered_cache_is_inert() {
        let mut reg = EngineRegistry::new();
        let mut host = ModelHost::new(8, 16, 1, 6);
        let a = Access {
            addr: 0x4000,
            pc: 0x100,
            cache_hit: false,
            useful_prefetch: false,
            kind: AccessKind::Load,
            metadata: 7,
        };
        assert_eq!(reg.on_access(9, &mut host, a), 7);
        assert!(host.accepted.is_empty());
    }

    #[test]
    fn each_cache_owns_its_engine() {
        let mut reg = EngineRegistry::new();
        reg.register(0, EngineConfig::bop()).unwrap();
        reg.register(1, EngineConfig::caerus()).unwrap();
        assert_eq!(reg.get(0).unwrap().config().name, "bop");
        assert_eq!(reg.get(1).unwrap().config().name, "caerus");
        assert!(reg.get(2).is_none());
    }
}
