//! Search-index lookup for precomputed resource map associations.

use std::sync::Arc;
use std::time::Duration;

use rmap_state::{IndexBackend, IndexDocument};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::fetch::with_deadline;
use crate::obs;

/// What the index said about a PID, independent of the association itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub num_found: usize,
    /// Some document lists the PID as its series ID.
    pub is_sid: bool,
    /// Some document is a data object.
    pub is_data: bool,
    /// Some document is itself a resource map.
    pub is_rm: bool,
    /// Distinct associated resource maps, in first-seen order.
    pub rms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IndexMeta {
    /// Summarise the documents returned for `pid`.
    pub fn from_documents(pid: &str, docs: &[IndexDocument]) -> Self {
        let mut rms: Vec<String> = Vec::new();
        for rm in docs.iter().flat_map(|d| d.resource_map.iter()) {
            if !rms.contains(rm) {
                rms.push(rm.clone());
            }
        }
        Self {
            num_found: docs.len(),
            is_sid: docs.iter().any(|d| d.series_id.as_deref() == Some(pid)),
            is_data: docs.iter().any(IndexDocument::is_data),
            is_rm: docs.iter().any(IndexDocument::is_resource_map),
            rms,
            error: None,
        }
    }

    /// The association these facts support, if exactly one is trustworthy.
    ///
    /// A resource map resolves to itself. A single listed map is accepted
    /// only when the PID is neither data nor a series ID, since data objects
    /// and series can legitimately belong to several packages.
    pub fn association(&self, pid: &str) -> Option<String> {
        if self.is_rm {
            return Some(pid.to_string());
        }
        match self.rms.as_slice() {
            [only] if !self.is_data && !self.is_sid => Some(only.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResult {
    pub pid: String,
    pub rm: Option<String>,
    pub meta: IndexMeta,
}

/// Runs `id:"pid" OR seriesId:"pid"` lookups against an [`IndexBackend`].
#[derive(Clone)]
pub struct IndexSearcher {
    backend: Arc<dyn IndexBackend>,
    max_fetch_time: Duration,
}

impl IndexSearcher {
    pub fn new(backend: Arc<dyn IndexBackend>, max_fetch_time: Duration) -> Self {
        Self {
            backend,
            max_fetch_time,
        }
    }

    /// Query the index for `pid`. Failures and timeouts yield an empty result.
    pub async fn search(&self, pid: &str) -> IndexResult {
        let docs = with_deadline(
            "index",
            pid,
            self.max_fetch_time,
            self.backend.query_by_id_or_series(pid),
        )
        .await;

        let meta = match docs {
            Ok(docs) => IndexMeta::from_documents(pid, &docs),
            Err(e) => {
                if !matches!(e, FetchError::Timeout(_)) {
                    obs::emit_fetch_error("index", pid, &e);
                }
                IndexMeta {
                    error: Some(e.to_string()),
                    ..IndexMeta::default()
                }
            }
        };

        IndexResult {
            pid: pid.to_string(),
            rm: meta.association(pid),
            meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmap_state::fakes::MemoryIndex;
    use rmap_state::RESOURCE_MAP_FORMAT_ID;

    fn searcher(index: MemoryIndex) -> IndexSearcher {
        IndexSearcher::new(Arc::new(index), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn single_association_is_returned() {
        let index = MemoryIndex::new();
        index.insert(IndexDocument::new("obj.1").with_resource_map("rm.1"));
        let result = searcher(index).search("obj.1").await;
        assert_eq!(result.rm.as_deref(), Some("rm.1"));
        assert_eq!(result.meta.num_found, 1);
    }

    #[tokio::test]
    async fn resource_map_resolves_to_itself() {
        let index = MemoryIndex::new();
        index.insert(IndexDocument::new("rm.1").with_format_id(RESOURCE_MAP_FORMAT_ID));
        let result = searcher(index).search("rm.1").await;
        assert_eq!(result.rm.as_deref(), Some("rm.1"));
        assert!(result.meta.is_rm);
    }

    #[tokio::test]
    async fn series_id_is_flagged_without_association() {
        let index = MemoryIndex::new();
        index.insert(
            IndexDocument::new("obj.3")
                .with_series_id("sid.1")
                .with_resource_map("rm.3"),
        );
        let result = searcher(index).search("sid.1").await;
        assert!(result.meta.is_sid);
        assert!(result.rm.is_none());
        assert_eq!(result.meta.rms, vec!["rm.3"]);
    }

    #[tokio::test]
    async fn data_objects_need_more_than_the_index() {
        let index = MemoryIndex::new();
        index.insert(
            IndexDocument::new("data.1")
                .with_format_type("DATA")
                .with_resource_map("rm.1"),
        );
        let result = searcher(index).search("data.1").await;
        assert!(result.meta.is_data);
        assert!(result.rm.is_none());
    }

    #[tokio::test]
    async fn several_maps_are_listed_in_first_seen_order() {
        let index = MemoryIndex::new();
        index.insert(
            IndexDocument::new("obj.1")
                .with_resource_map("rm.b")
                .with_resource_map("rm.a"),
        );
        index.insert(
            IndexDocument::new("obj.1")
                .with_resource_map("rm.a")
                .with_resource_map("rm.c"),
        );
        let result = searcher(index).search("obj.1").await;
        assert!(result.rm.is_none());
        assert_eq!(result.meta.rms, vec!["rm.b", "rm.a", "rm.c"]);
    }

    #[tokio::test]
    async fn unavailable_index_is_an_empty_result() {
        let result = searcher(MemoryIndex::unavailable()).search("obj.1").await;
        assert!(result.rm.is_none());
        assert_eq!(result.meta.num_found, 0);
        assert!(result.meta.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_index_times_out() {
        let index = MemoryIndex::with_delay(Duration::from_secs(60));
        index.insert(IndexDocument::new("obj.1").with_resource_map("rm.1"));
        let result = searcher(index).search("obj.1").await;
        assert!(result.rm.is_none());
    }
}
