//! Collaborator trait definitions for resource map resolution
//!
//! These traits define the external sources the resolver reconciles:
//! - `KeyValueStore`: Persistent object PID → resource map PID associations
//! - `IndexBackend`: Search index documents for a PID or series ID
//! - `SysmetaSource`: System metadata (identifier, obsoletes links)
//! - `ResourceMapFetcher`: Fetch and parse an OAI-ORE resource map
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Format identifier the index uses for OAI-ORE resource maps.
pub const RESOURCE_MAP_FORMAT_ID: &str = "http://www.openarchives.org/ore/terms";

/// Format type the index uses for data objects.
pub const DATA_FORMAT_TYPE: &str = "DATA";

// ---------------------------------------------------------------------------
// KeyValueStore: association storage
// ---------------------------------------------------------------------------

/// Arbitrary persistent string key/value store.
///
/// Guarantees:
/// - `get_item` returns `Ok(None)` for absent keys, never an error.
/// - `set_item` is last-write-wins.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove `key`. No-op if absent.
    async fn remove_item(&self, key: &str) -> StorageResult<()>;

    /// Remove every key.
    async fn clear(&self) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// IndexBackend: search index
// ---------------------------------------------------------------------------

/// One search-index document, restricted to the fields resolution needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    pub id: String,
    #[serde(default)]
    pub series_id: Option<String>,
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub format_type: Option<String>,
    /// Resource maps the index has already associated with this object.
    #[serde(default)]
    pub resource_map: Vec<String>,
}

impl IndexDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_series_id(mut self, sid: impl Into<String>) -> Self {
        self.series_id = Some(sid.into());
        self
    }

    pub fn with_format_id(mut self, format_id: impl Into<String>) -> Self {
        self.format_id = Some(format_id.into());
        self
    }

    pub fn with_format_type(mut self, format_type: impl Into<String>) -> Self {
        self.format_type = Some(format_type.into());
        self
    }

    pub fn with_resource_map(mut self, rm: impl Into<String>) -> Self {
        self.resource_map.push(rm.into());
        self
    }

    /// Whether this document describes an OAI-ORE resource map.
    pub fn is_resource_map(&self) -> bool {
        self.format_id.as_deref() == Some(RESOURCE_MAP_FORMAT_ID)
    }

    /// Whether this document describes a data (not metadata) object.
    pub fn is_data(&self) -> bool {
        self.format_type.as_deref() == Some(DATA_FORMAT_TYPE)
    }
}

/// Search index query service.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Return every document whose `id` or `seriesId` equals `pid`.
    async fn query_by_id_or_series(&self, pid: &str) -> StorageResult<Vec<IndexDocument>>;
}

// ---------------------------------------------------------------------------
// SysmetaSource: system metadata
// ---------------------------------------------------------------------------

/// The subset of DataONE system metadata used to walk revision history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetadata {
    /// Concrete version PID. Absent when a series lookup found nothing usable.
    pub identifier: Option<String>,
    pub series_id: Option<String>,
    /// The previous version in the lineage.
    pub obsoletes: Option<String>,
    /// The next version in the lineage.
    pub obsoleted_by: Option<String>,
    pub format_id: Option<String>,
}

impl SystemMetadata {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            ..Default::default()
        }
    }

    pub fn with_series_id(mut self, sid: impl Into<String>) -> Self {
        self.series_id = Some(sid.into());
        self
    }

    pub fn with_obsoletes(mut self, pid: impl Into<String>) -> Self {
        self.obsoletes = Some(pid.into());
        self
    }

    pub fn with_obsoleted_by(mut self, pid: impl Into<String>) -> Self {
        self.obsoleted_by = Some(pid.into());
        self
    }

    pub fn with_format_id(mut self, format_id: impl Into<String>) -> Self {
        self.format_id = Some(format_id.into());
        self
    }
}

/// System metadata service.
///
/// Implementations resolve a series ID to the sysmeta of the current version
/// of that series, the way the DataONE `/meta` endpoint does.
#[async_trait]
pub trait SysmetaSource: Send + Sync {
    /// Fetch system metadata. `Ok(None)` when the PID is unknown,
    /// `StorageError::Unauthorized` when access is denied.
    async fn fetch_sysmeta(&self, pid: &str) -> StorageResult<Option<SystemMetadata>>;
}

// ---------------------------------------------------------------------------
// ResourceMapFetcher: OAI-ORE documents
// ---------------------------------------------------------------------------

/// A parsed OAI-ORE aggregation. Only membership matters for resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMapModel {
    pub id: String,
    pub member_ids: BTreeSet<String>,
}

impl ResourceMapModel {
    pub fn new<I, S>(id: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            member_ids: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, pid: &str) -> bool {
        self.member_ids.contains(pid)
    }
}

/// Result of fetching a resource map: the parsed model (if any) and the
/// HTTP-style status the object service answered with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedResourceMap {
    pub model: Option<ResourceMapModel>,
    pub status: u16,
}

impl FetchedResourceMap {
    pub fn ok(model: ResourceMapModel) -> Self {
        Self {
            model: Some(model),
            status: 200,
        }
    }

    pub fn failed(status: u16) -> Self {
        Self {
            model: None,
            status,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Resource map document service.
#[async_trait]
pub trait ResourceMapFetcher: Send + Sync {
    /// Fetch and parse the resource map identified by `rm`.
    async fn fetch_resource_map(&self, rm: &str) -> StorageResult<FetchedResourceMap>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_document_deserializes_solr_field_names() {
        let json = serde_json::json!({
            "id": "doc.1",
            "seriesId": "series.1",
            "formatType": "METADATA",
            "resourceMap": ["rm.1"]
        });
        let doc: IndexDocument = serde_json::from_value(json).unwrap();
        assert_eq!(doc.series_id.as_deref(), Some("series.1"));
        assert_eq!(doc.resource_map, vec!["rm.1".to_string()]);
        assert!(doc.format_id.is_none());
        assert!(!doc.is_data());
    }

    #[test]
    fn resource_map_format_is_detected() {
        let doc = IndexDocument::new("rm.1").with_format_id(RESOURCE_MAP_FORMAT_ID);
        assert!(doc.is_resource_map());
    }

    #[test]
    fn model_membership() {
        let model = ResourceMapModel::new("rm", ["a", "b"]);
        assert!(model.contains("a"));
        assert!(!model.contains("rm"));
    }
}
