//! Narrowing several indexed resource maps down to one.
//!
//! The index can list more than one map for an object when a package was
//! revised and the old map is not yet de-indexed. If the listed maps form
//! one lineage and exactly one of them has no successor, that one is current.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::fetch::with_deadline;
use crate::versions::{Adjacent, VersionTracker};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiRmMeta {
    pub rms: Vec<String>,
    /// Some listed map is not a neighbour of any other listed map.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub not_versions: bool,
    /// The maps form a lineage but none, or several, are current.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub all_obsoleted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiRmResult {
    pub pid: String,
    pub rm: Option<String>,
    pub meta: MultiRmMeta,
}

#[derive(Clone)]
pub struct MultiRmChecker {
    tracker: Arc<dyn VersionTracker>,
    max_fetch_time: Duration,
}

impl MultiRmChecker {
    pub fn new(tracker: Arc<dyn VersionTracker>, max_fetch_time: Duration) -> Self {
        Self {
            tracker,
            max_fetch_time,
        }
    }

    /// Pick the single current map among `rms`, if there is one.
    ///
    /// Neighbour lookups run concurrently; a failed lookup counts as a map
    /// with no neighbours.
    pub async fn check(&self, pid: &str, rms: &[String]) -> MultiRmResult {
        let mut meta = MultiRmMeta {
            rms: rms.to_vec(),
            ..MultiRmMeta::default()
        };

        let lookups = rms.iter().map(|rm| async move {
            with_deadline(
                "sysmeta",
                rm,
                self.max_fetch_time,
                self.tracker.adjacent(rm),
            )
            .await
        });
        let records: Vec<Adjacent> = join_all(lookups)
            .await
            .into_iter()
            .zip(rms)
            .map(|(res, rm)| match res {
                Ok(adjacent) => adjacent,
                Err(e) => {
                    meta.errors.push(format!("{rm}: {e}"));
                    Adjacent {
                        pid: rm.clone(),
                        ..Adjacent::default()
                    }
                }
            })
            .collect();

        let neighbours: HashSet<&str> = records
            .iter()
            .flat_map(|r| [r.prev.as_deref(), r.next.as_deref()])
            .flatten()
            .collect();

        if !rms.iter().all(|rm| neighbours.contains(rm.as_str())) {
            meta.not_versions = true;
            return MultiRmResult {
                pid: pid.to_string(),
                rm: None,
                meta,
            };
        }

        let current: Vec<&Adjacent> = records.iter().filter(|r| r.next.is_none()).collect();
        let rm = match current.as_slice() {
            [only] => Some(only.pid.clone()),
            _ => {
                meta.all_obsoleted = true;
                None
            }
        };

        MultiRmResult {
            pid: pid.to_string(),
            rm,
            meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versions::SysmetaVersionTracker;
    use rmap_state::fakes::MemorySysmetaSource;
    use rmap_state::SystemMetadata;

    fn checker(source: MemorySysmetaSource) -> MultiRmChecker {
        MultiRmChecker::new(
            Arc::new(SysmetaVersionTracker::new(Arc::new(source), 10)),
            Duration::from_secs(5),
        )
    }

    fn rms(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn lineage_resolves_to_unobsoleted_map() {
        let source = MemorySysmetaSource::new();
        source.insert_chain(&["rm.1", "rm.2", "rm.3"]);
        let result = checker(source)
            .check("obj", &rms(&["rm.1", "rm.2", "rm.3"]))
            .await;
        assert_eq!(result.rm.as_deref(), Some("rm.3"));
        assert_eq!(result.meta.rms.len(), 3);
    }

    #[tokio::test]
    async fn unrelated_maps_are_not_versions() {
        let source = MemorySysmetaSource::new();
        source.insert(SystemMetadata::new("rm.a"));
        source.insert(SystemMetadata::new("rm.b"));
        let result = checker(source).check("obj", &rms(&["rm.a", "rm.b"])).await;
        assert!(result.rm.is_none());
        assert!(result.meta.not_versions);
    }

    #[tokio::test]
    async fn lineage_without_current_listed_map() {
        let source = MemorySysmetaSource::new();
        source.insert_chain(&["rm.1", "rm.2", "rm.3"]);
        let result = checker(source).check("obj", &rms(&["rm.1", "rm.2"])).await;
        assert!(result.rm.is_none());
        assert!(result.meta.all_obsoleted);
    }
}
