//! Object PID to resource map PID associations.
//!
//! The cache is advisory: a hit is always re-verified by the resolver, and
//! every read or write failure degrades to a miss or a dropped write.

use std::sync::Arc;
use std::time::Duration;

use rmap_state::{KeyValueStore, StorageError};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::fetch::with_deadline;
use crate::metrics::METRICS;
use crate::obs;

/// Outcome of a cache read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheLookup {
    pub rm: Option<String>,
}

/// Association store wrapper used by the resolver.
#[derive(Clone)]
pub struct ResolutionCache {
    store: Arc<dyn KeyValueStore>,
    max_fetch_time: Duration,
}

impl std::fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("max_fetch_time", &self.max_fetch_time)
            .finish_non_exhaustive()
    }
}

impl ResolutionCache {
    pub fn new(store: Arc<dyn KeyValueStore>, max_fetch_time: Duration) -> Self {
        Self {
            store,
            max_fetch_time,
        }
    }

    /// Look up the resource map remembered for `pid`. Never fails.
    pub async fn check_storage(&self, pid: &str) -> CacheLookup {
        let read = with_deadline(
            "storage",
            pid,
            self.max_fetch_time,
            self.store.get_item(pid),
        )
        .await;
        match read {
            Ok(rm) => CacheLookup {
                rm: rm.filter(|v| !v.is_empty()),
            },
            Err(FetchError::Timeout(_)) => CacheLookup::default(),
            Err(e) => {
                obs::emit_fetch_error("storage", pid, &e);
                CacheLookup::default()
            }
        }
    }

    /// Remember `pid → rm`.
    ///
    /// A full store is cleared and the write retried once; any remaining
    /// failure is logged and swallowed.
    pub async fn store(&self, pid: &str, rm: &str) {
        match self.write(pid, rm).await {
            Ok(()) => {}
            Err(FetchError::Storage(StorageError::QuotaExceeded { .. })) => {
                tracing::warn!(pid = %pid, "association store full, clearing and retrying");
                self.clear_storage().await;
                if let Err(e) = self.write(pid, rm).await {
                    tracing::warn!(pid = %pid, error = %e, "association dropped after retry");
                }
            }
            Err(e) => {
                tracing::warn!(pid = %pid, error = %e, "failed to store association");
            }
        }
    }

    async fn write(&self, pid: &str, rm: &str) -> Result<(), FetchError> {
        with_deadline(
            "storage",
            pid,
            self.max_fetch_time,
            self.store.set_item(pid, rm),
        )
        .await?;
        METRICS.inc_cache_writes();
        Ok(())
    }

    /// Remove every remembered association.
    pub async fn clear_storage(&self) {
        match with_deadline("storage", "*", self.max_fetch_time, self.store.clear()).await {
            Ok(()) => tracing::info!("association store cleared"),
            Err(e) => tracing::warn!(error = %e, "failed to clear association store"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmap_state::fakes::MemoryKeyValueStore;

    fn cache(store: Arc<MemoryKeyValueStore>) -> ResolutionCache {
        ResolutionCache::new(store, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn miss_and_hit() {
        let store = Arc::new(MemoryKeyValueStore::new());
        store.seed("obj.1", "rm.1");
        let cache = cache(store);

        assert_eq!(cache.check_storage("obj.1").await.rm.as_deref(), Some("rm.1"));
        assert_eq!(cache.check_storage("obj.2").await, CacheLookup::default());
    }

    #[tokio::test]
    async fn read_failure_is_a_miss() {
        let cache = cache(Arc::new(MemoryKeyValueStore::failing_reads()));
        assert!(cache.check_storage("obj.1").await.rm.is_none());
    }

    #[tokio::test]
    async fn full_store_is_cleared_then_written() {
        let store = Arc::new(MemoryKeyValueStore::with_quota(1));
        store.seed("old", "rm.old");
        let cache = cache(store.clone());

        cache.store("new", "rm.new").await;

        assert_eq!(store.len(), 1);
        assert_eq!(cache.check_storage("new").await.rm.as_deref(), Some("rm.new"));
        assert!(cache.check_storage("old").await.rm.is_none());
    }

    #[tokio::test]
    async fn second_quota_failure_is_swallowed() {
        let store = Arc::new(MemoryKeyValueStore::with_quota(0));
        let cache = cache(store.clone());
        cache.store("obj", "rm").await;
        assert!(store.is_empty());
        assert!(store.writes().is_empty());
    }
}
