//! HTTP client for a DataONE node
//!
//! Implements the resolver's remote collaborators against the DataONE v2
//! REST API:
//! - `IndexBackend` via `GET {base}/query/solr/`
//! - `SysmetaSource` via `GET {base}/meta/{pid}`
//! - `ResourceMapFetcher` via `GET {base}/object/{pid}`

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use rmap_state::{
    FetchedResourceMap, IndexBackend, IndexDocument, ResourceMapFetcher, StorageError,
    StorageResult, SysmetaSource, SystemMetadata,
};
use tracing::{debug, warn};

use crate::config::DataOneConfig;
use crate::error::DataOneError;
use crate::parse;
use crate::Result;

/// Maximum documents requested per index query.
const SOLR_ROWS: &str = "1000";

/// DataONE REST client
#[derive(Debug, Clone)]
pub struct DataOneClient {
    config: DataOneConfig,
    base: Url,
    http_client: reqwest::Client,
}

impl DataOneClient {
    pub fn new(config: DataOneConfig) -> Result<Self> {
        let base = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            DataOneError::InvalidUrl {
                url: config.base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        if base.cannot_be_a_base() {
            return Err(DataOneError::InvalidUrl {
                url: config.base_url.clone(),
                reason: "cannot be a base URL".to_string(),
            });
        }

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("rmap-dataone/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(DataOneClient {
            config,
            base,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(DataOneConfig::from_env())
    }

    pub fn config(&self) -> &DataOneConfig {
        &self.config
    }

    /// `{base}/{segments...}` with every segment percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.http_client.get(url);
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, url: Url, pid: &str) -> StorageResult<(StatusCode, String)> {
        debug!(url = %url, "GET");
        let response = self
            .get(url)
            .send()
            .await
            .map_err(|e| StorageError::from(DataOneError::Http(e)))?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StorageError::Unauthorized {
                pid: pid.to_string(),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|e| StorageError::from(DataOneError::Http(e)))?;
        Ok((status, body))
    }
}

#[async_trait]
impl IndexBackend for DataOneClient {
    async fn query_by_id_or_series(&self, pid: &str) -> StorageResult<Vec<IndexDocument>> {
        let mut url = self.endpoint(&["query", "solr", ""]);
        url.query_pairs_mut()
            .append_pair("q", &parse::solr_query(pid))
            .append_pair("fl", parse::SOLR_FIELDS)
            .append_pair("rows", SOLR_ROWS)
            .append_pair("wt", "json");

        let (status, body) = self.send(url, pid).await?;
        if !status.is_success() {
            return Err(StorageError::Status {
                pid: pid.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(parse::parse_solr(&body)?)
    }
}

#[async_trait]
impl SysmetaSource for DataOneClient {
    async fn fetch_sysmeta(&self, pid: &str) -> StorageResult<Option<SystemMetadata>> {
        let (status, body) = self.send(self.endpoint(&["meta", pid]), pid).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(StorageError::Status {
                pid: pid.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(Some(parse::parse_sysmeta(&body)?))
    }
}

#[async_trait]
impl ResourceMapFetcher for DataOneClient {
    async fn fetch_resource_map(&self, rm: &str) -> StorageResult<FetchedResourceMap> {
        let (status, body) = match self.send(self.endpoint(&["object", rm]), rm).await {
            Ok(answer) => answer,
            Err(StorageError::Unauthorized { .. }) => {
                return Ok(FetchedResourceMap::failed(StatusCode::UNAUTHORIZED.as_u16()))
            }
            Err(e) => return Err(e),
        };
        if status != StatusCode::OK {
            debug!(rm = %rm, status = status.as_u16(), "resource map not available");
            return Ok(FetchedResourceMap::failed(status.as_u16()));
        }
        match parse::parse_resource_map(rm, &body) {
            Ok(model) => Ok(FetchedResourceMap::ok(model)),
            Err(e) => {
                warn!(rm = %rm, error = %e, "object is not a resource map");
                Err(e.into())
            }
        }
    }
}
