//! In-memory fakes for collaborator traits (testing only)
//!
//! Provides `MemoryKeyValueStore`, `MemoryIndex`, `MemorySysmetaSource`, and
//! `MemoryResourceMapFetcher` that satisfy the trait contracts without any
//! external dependencies. Each fake records the keys it was called with so
//! tests can assert which strategies ran.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryKeyValueStore
// ---------------------------------------------------------------------------

/// In-memory key/value store backed by a `HashMap<key, value>`.
///
/// An optional `quota` caps the number of distinct keys; writes of new keys
/// beyond it fail with `StorageError::QuotaExceeded`. An optional `delay`
/// slows down reads only.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    items: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
    reads: Mutex<Vec<String>>,
    quota: Option<usize>,
    delay: Option<Duration>,
    fail_reads: bool,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects new keys once `quota` keys are held.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::default()
        }
    }

    /// Store that sleeps before answering every read.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Store whose reads always fail with a backend error.
    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    /// Seed an entry without recording it as a write.
    pub fn seed(&self, key: &str, value: &str) {
        self.items
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    /// Every successful `set_item` call, in order.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().unwrap().clone()
    }

    /// Every `get_item` key, in order.
    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        self.reads.lock().unwrap().push(key.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads {
            return Err(StorageError::Backend("read failure".to_string()));
        }
        Ok(self.items.lock().unwrap().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut items = self.items.lock().unwrap();
        if let Some(quota) = self.quota {
            if !items.contains_key(key) && items.len() >= quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }
        items.insert(key.to_string(), value.to_string());
        self.writes
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_string()));
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.items.lock().unwrap().remove(key);
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.items.lock().unwrap().clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryIndex
// ---------------------------------------------------------------------------

/// In-memory search index over a list of documents.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    docs: Mutex<Vec<IndexDocument>>,
    queries: Mutex<Vec<String>>,
    delay: Option<Duration>,
    unavailable: bool,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index that sleeps before answering every query.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Index whose queries always fail with a network error.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, doc: IndexDocument) {
        self.docs.lock().unwrap().push(doc);
    }

    /// Every queried PID, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl IndexBackend for MemoryIndex {
    async fn query_by_id_or_series(&self, pid: &str) -> StorageResult<Vec<IndexDocument>> {
        self.queries.lock().unwrap().push(pid.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable {
            return Err(StorageError::Network("index unavailable".to_string()));
        }
        let docs = self.docs.lock().unwrap();
        Ok(docs
            .iter()
            .filter(|d| d.id == pid || d.series_id.as_deref() == Some(pid))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemorySysmetaSource
// ---------------------------------------------------------------------------

/// In-memory system metadata service backed by a `HashMap<pid, SystemMetadata>`.
///
/// Series IDs resolve to the sysmeta registered for them with
/// [`MemorySysmetaSource::insert_series`].
#[derive(Debug, Default)]
pub struct MemorySysmetaSource {
    records: Mutex<HashMap<String, SystemMetadata>>,
    series: Mutex<HashMap<String, SystemMetadata>>,
    unauthorized: Mutex<HashSet<String>>,
    fetches: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MemorySysmetaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Register sysmeta under its own identifier.
    pub fn insert(&self, sysmeta: SystemMetadata) {
        let pid = sysmeta.identifier.clone().unwrap_or_default();
        self.records.lock().unwrap().insert(pid, sysmeta);
    }

    /// Register the sysmeta returned when `sid` is requested.
    pub fn insert_series(&self, sid: &str, sysmeta: SystemMetadata) {
        self.series
            .lock()
            .unwrap()
            .insert(sid.to_string(), sysmeta);
    }

    /// Make every fetch of `pid` fail with `StorageError::Unauthorized`.
    pub fn deny(&self, pid: &str) {
        self.unauthorized.lock().unwrap().insert(pid.to_string());
    }

    /// Register a linear revision chain, oldest first.
    pub fn insert_chain(&self, pids: &[&str]) {
        for (i, pid) in pids.iter().enumerate() {
            let mut sm = SystemMetadata::new(*pid);
            if i > 0 {
                sm.obsoletes = Some(pids[i - 1].to_string());
            }
            if let Some(next) = pids.get(i + 1) {
                sm.obsoleted_by = Some(next.to_string());
            }
            self.insert(sm);
        }
    }

    /// Every fetched PID, in order.
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SysmetaSource for MemorySysmetaSource {
    async fn fetch_sysmeta(&self, pid: &str) -> StorageResult<Option<SystemMetadata>> {
        self.fetches.lock().unwrap().push(pid.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unauthorized.lock().unwrap().contains(pid) {
            return Err(StorageError::Unauthorized {
                pid: pid.to_string(),
            });
        }
        if let Some(sm) = self.records.lock().unwrap().get(pid) {
            return Ok(Some(sm.clone()));
        }
        Ok(self.series.lock().unwrap().get(pid).cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryResourceMapFetcher
// ---------------------------------------------------------------------------

/// In-memory resource map service. Unknown maps answer with status 404.
#[derive(Debug, Default)]
pub struct MemoryResourceMapFetcher {
    maps: Mutex<HashMap<String, ResourceMapModel>>,
    statuses: Mutex<HashMap<String, u16>>,
    fetches: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MemoryResourceMapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn insert(&self, model: ResourceMapModel) {
        self.maps.lock().unwrap().insert(model.id.clone(), model);
    }

    /// Force the service to answer `status` for `rm`.
    pub fn set_status(&self, rm: &str, status: u16) {
        self.statuses
            .lock()
            .unwrap()
            .insert(rm.to_string(), status);
    }

    /// Every fetched resource map PID, in order.
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceMapFetcher for MemoryResourceMapFetcher {
    async fn fetch_resource_map(&self, rm: &str) -> StorageResult<FetchedResourceMap> {
        self.fetches.lock().unwrap().push(rm.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = self.statuses.lock().unwrap().get(rm) {
            return Ok(FetchedResourceMap::failed(*status));
        }
        let maps = self.maps.lock().unwrap();
        Ok(match maps.get(rm) {
            Some(model) => FetchedResourceMap::ok(model.clone()),
            None => FetchedResourceMap::failed(404),
        })
    }
}
