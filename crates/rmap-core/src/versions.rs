//! Revision lineage over system metadata.
//!
//! A [`VersionTracker`] answers "what is the version `n` steps away from this
//! one" and "what are this version's neighbours". The default tracker reads
//! `obsoletes`/`obsoletedBy` links from a [`SysmetaSource`].

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use rmap_state::{StorageError, StorageResult, SysmetaSource, SystemMetadata};
use serde::{Deserialize, Serialize};

/// A version and its immediate neighbours in the lineage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjacent {
    pub pid: String,
    /// The version this one obsoletes.
    pub prev: Option<String>,
    /// The version that obsoletes this one.
    pub next: Option<String>,
}

#[async_trait]
pub trait VersionTracker: Send + Sync {
    /// Sysmeta of the version `offset` steps from `pid` (negative is older).
    ///
    /// Offset 0 is the sysmeta the service returns for `pid` itself; for a
    /// series ID that is the current version of the series. `Ok(None)` when
    /// the lineage ends before `offset` steps.
    async fn get_nth(&self, pid: &str, offset: i64) -> StorageResult<Option<SystemMetadata>>;

    /// Immediate neighbours of `pid`. Unknown PIDs have none.
    async fn adjacent(&self, pid: &str) -> StorageResult<Adjacent>;
}

/// [`VersionTracker`] that follows sysmeta links one fetch per hop.
pub struct SysmetaVersionTracker {
    source: Arc<dyn SysmetaSource>,
    max_hops: usize,
}

impl SysmetaVersionTracker {
    pub fn new(source: Arc<dyn SysmetaSource>, max_hops: usize) -> Self {
        Self { source, max_hops }
    }
}

#[async_trait]
impl VersionTracker for SysmetaVersionTracker {
    async fn get_nth(&self, pid: &str, offset: i64) -> StorageResult<Option<SystemMetadata>> {
        let hops = offset.unsigned_abs() as usize;
        if hops > self.max_hops {
            return Err(StorageError::Backend(format!(
                "offset {offset} exceeds the {} hop limit",
                self.max_hops
            )));
        }

        let mut current = match self.source.fetch_sysmeta(pid).await? {
            Some(sm) => sm,
            None => return Ok(None),
        };
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(pid.to_string());

        for _ in 0..hops {
            let link = if offset < 0 {
                current.obsoletes.clone()
            } else {
                current.obsoleted_by.clone()
            };
            let Some(next_pid) = link else {
                return Ok(None);
            };
            if !visited.insert(next_pid.clone()) {
                return Err(StorageError::Backend(format!(
                    "revision cycle at {next_pid}"
                )));
            }
            current = match self.source.fetch_sysmeta(&next_pid).await? {
                Some(sm) => sm,
                None => return Ok(None),
            };
        }
        Ok(Some(current))
    }

    async fn adjacent(&self, pid: &str) -> StorageResult<Adjacent> {
        let sysmeta = self.source.fetch_sysmeta(pid).await?;
        Ok(match sysmeta {
            Some(sm) => Adjacent {
                pid: pid.to_string(),
                prev: sm.obsoletes.filter(|p| !p.is_empty()),
                next: sm.obsoleted_by.filter(|p| !p.is_empty()),
            },
            None => Adjacent {
                pid: pid.to_string(),
                ..Adjacent::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmap_state::fakes::MemorySysmetaSource;

    fn tracker(source: MemorySysmetaSource, max_hops: usize) -> SysmetaVersionTracker {
        SysmetaVersionTracker::new(Arc::new(source), max_hops)
    }

    fn identifier(sm: Option<SystemMetadata>) -> Option<String> {
        sm.and_then(|s| s.identifier)
    }

    #[tokio::test]
    async fn walks_both_directions() {
        let source = MemorySysmetaSource::new();
        source.insert_chain(&["v1", "v2", "v3", "v4"]);
        let t = tracker(source, 10);

        assert_eq!(identifier(t.get_nth("v3", -2).await.unwrap()).as_deref(), Some("v1"));
        assert_eq!(identifier(t.get_nth("v1", 3).await.unwrap()).as_deref(), Some("v4"));
        assert_eq!(identifier(t.get_nth("v2", 0).await.unwrap()).as_deref(), Some("v2"));
        assert!(t.get_nth("v2", -5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn series_offset_zero_is_current_version() {
        let source = MemorySysmetaSource::new();
        source.insert_series("sid.1", SystemMetadata::new("v7").with_series_id("sid.1"));
        let t = tracker(source, 10);
        let sm = t.get_nth("sid.1", 0).await.unwrap().unwrap();
        assert_eq!(sm.identifier.as_deref(), Some("v7"));
    }

    #[tokio::test]
    async fn cycles_are_errors() {
        let source = MemorySysmetaSource::new();
        source.insert(SystemMetadata::new("a").with_obsoletes("b"));
        source.insert(SystemMetadata::new("b").with_obsoletes("a"));
        let t = tracker(source, 10);
        let err = t.get_nth("a", -4).await.unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[tokio::test]
    async fn hop_limit_is_enforced() {
        let t = tracker(MemorySysmetaSource::new(), 3);
        assert!(t.get_nth("a", -4).await.is_err());
    }

    #[tokio::test]
    async fn adjacent_of_unknown_pid_is_empty() {
        let source = MemorySysmetaSource::new();
        source.insert_chain(&["v1", "v2"]);
        let t = tracker(source, 10);

        let v1 = t.adjacent("v1").await.unwrap();
        assert_eq!(v1.prev, None);
        assert_eq!(v1.next.as_deref(), Some("v2"));
        assert_eq!(t.adjacent("ghost").await.unwrap(), Adjacent {
            pid: "ghost".to_string(),
            ..Adjacent::default()
        });
    }

    #[tokio::test]
    async fn unauthorized_propagates() {
        let source = MemorySysmetaSource::new();
        source.insert(SystemMetadata::new("secret"));
        source.deny("secret");
        let t = tracker(source, 10);
        assert!(matches!(
            t.adjacent("secret").await,
            Err(StorageError::Unauthorized { .. })
        ));
    }
}
