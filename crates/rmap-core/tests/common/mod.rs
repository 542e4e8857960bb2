//! Shared wiring for resolver integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rmap_core::{ConsoleLevel, ResolverConfig, ResourceMapResolver};
use rmap_state::fakes::{
    MemoryIndex, MemoryKeyValueStore, MemoryResourceMapFetcher, MemorySysmetaSource,
};
use rmap_state::ResourceMapModel;

pub const NODE: &str = "urn:node:TEST";

pub fn config() -> ResolverConfig {
    ResolverConfig::new(NODE).with_console_level(ConsoleLevel::Off)
}

/// A resolver over in-memory fakes, with handles kept for assertions.
pub struct Harness {
    pub index: Arc<MemoryIndex>,
    pub storage: Arc<MemoryKeyValueStore>,
    pub sysmeta: Arc<MemorySysmetaSource>,
    pub fetcher: Arc<MemoryResourceMapFetcher>,
    pub resolver: ResourceMapResolver,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(config())
    }

    pub fn with_config(config: ResolverConfig) -> Self {
        Self::build(
            config,
            MemoryIndex::new(),
            MemoryKeyValueStore::new(),
            MemorySysmetaSource::new(),
            MemoryResourceMapFetcher::new(),
        )
    }

    pub fn build(
        config: ResolverConfig,
        index: MemoryIndex,
        storage: MemoryKeyValueStore,
        sysmeta: MemorySysmetaSource,
        fetcher: MemoryResourceMapFetcher,
    ) -> Self {
        let index = Arc::new(index);
        let storage = Arc::new(storage);
        let sysmeta = Arc::new(sysmeta);
        let fetcher = Arc::new(fetcher);
        let resolver = ResourceMapResolver::builder(config)
            .index(index.clone())
            .storage(storage.clone())
            .sysmeta(sysmeta.clone())
            .fetcher(fetcher.clone())
            .build()
            .expect("resolver should build");
        Self {
            index,
            storage,
            sysmeta,
            fetcher,
            resolver,
        }
    }

    /// Register a resource map aggregating `members`.
    pub fn map(&self, rm: &str, members: &[&str]) {
        self.fetcher
            .insert(ResourceMapModel::new(rm, members.iter().copied()));
    }

    pub fn labels(&self, pid: &str) -> Vec<rmap_core::StatusLabel> {
        self.resolver
            .get_log(pid)
            .map(|log| log.labels())
            .unwrap_or_default()
    }
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}
