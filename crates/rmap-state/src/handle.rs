//! SurrealDB-backed KeyValueStore
//!
//! Persists object PID → resource map PID associations in the
//! `rm_associations` table. Supports in-memory, local (SurrealKV) and cloud
//! (WebSocket) connections.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Database;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::{StateError, StorageError};
use crate::migrations::{self, ASSOCIATIONS_TABLE};
use crate::storage_traits::{KeyValueStore, StorageResult};
use crate::Result;

/// Every node's associations live in this namespace, one database per node.
const NAMESPACE: &str = "rmap";
const TEST_DATABASE: &str = "test";
const LOCAL_PATH: &str = ".rmap/db";

/// A remote SurrealDB instance reached over WebSocket with a database user.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    /// e.g. `wss://xxx.aws-use1.surrealdb.cloud`
    pub endpoint: String,
    pub username: String,
    pub password: String,
}

impl RemoteStore {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// `SURREALDB_ENDPOINT`, `SURREALDB_USERNAME` and `SURREALDB_PASSWORD`;
    /// `None` unless all three are set and non-empty.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Some(Self::new(
            var("SURREALDB_ENDPOINT")?,
            var("SURREALDB_USERNAME")?,
            var("SURREALDB_PASSWORD")?,
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AssociationRow {
    key: String,
    value: String,
}

/// SurrealDB-backed implementation of [`KeyValueStore`].
///
/// The database name is derived from the repository node the resolver
/// serves, so associations from different nodes never mix.
#[derive(Clone)]
pub struct SurrealKeyValueStore {
    db: Surreal<Any>,
}

impl SurrealKeyValueStore {
    /// Fresh in-memory store.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("mem://", TEST_DATABASE).await
    }

    /// Open any SurrealDB URL (`mem://`, `surrealkv://path`, `ws://...`)
    /// without authentication.
    #[instrument(skip_all, fields(url = %url, database = %database))]
    pub async fn connect(url: &str, database: &str) -> Result<Self> {
        let db = open(url).await?;
        Self::select(db, database).await
    }

    /// Sign in to a remote instance as a database user and select `database`.
    #[instrument(skip_all, fields(endpoint = %remote.endpoint, database = %database))]
    pub async fn connect_remote(remote: &RemoteStore, database: &str) -> Result<Self> {
        let db = open(&remote.endpoint).await?;
        db.signin(Database {
            namespace: NAMESPACE,
            database,
            username: &remote.username,
            password: &remote.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("sign-in as {} failed: {e}", remote.username)))?;
        Self::select(db, database).await
    }

    /// Pick a backend from the environment: a remote instance when
    /// [`RemoteStore::from_env`] finds credentials, then `SURREALDB_URL`,
    /// then a SurrealKV directory under `.rmap/db`.
    pub async fn from_env(database: &str) -> Result<Self> {
        if let Some(remote) = RemoteStore::from_env() {
            return Self::connect_remote(&remote, database).await;
        }
        if let Some(url) = std::env::var("SURREALDB_URL").ok().filter(|u| !u.is_empty()) {
            return Self::connect(&url, database).await;
        }
        std::fs::create_dir_all(LOCAL_PATH)
            .map_err(|e| StateError::Connection(format!("cannot create {LOCAL_PATH}: {e}")))?;
        Self::connect(&format!("surrealkv://{LOCAL_PATH}"), database).await
    }

    async fn select(db: Surreal<Any>, database: &str) -> Result<Self> {
        db.use_ns(NAMESPACE)
            .use_db(database)
            .await
            .map_err(|e| StateError::Connection(format!("cannot select {NAMESPACE}/{database}: {e}")))?;
        migrations::init_schema(&db).await?;
        info!(database = %database, "association store ready");
        Ok(Self { db })
    }
}

async fn open(url: &str) -> Result<Surreal<Any>> {
    surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("cannot reach {url}: {e}")))
}

/// Turn a repository node id into a database name SurrealDB accepts.
pub fn database_name_for_node(node_id: &str) -> String {
    let normal: String = node_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("rmap_{}", normal)
}

#[async_trait]
impl KeyValueStore for SurrealKeyValueStore {
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        let key_owned = key.to_string();
        let mut res = self
            .db
            .query("SELECT key, value FROM rm_associations WHERE key = $key LIMIT 1")
            .bind(("key", key_owned))
            .await?;

        let rows: Vec<AssociationRow> = res.take(0)?;
        Ok(rows.into_iter().next().map(|r| r.value))
    }

    async fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(key = %key, value = %value, "storing association");

        self.db
            .query(
                r#"
                BEGIN TRANSACTION;
                DELETE rm_associations WHERE key = $key;
                CREATE rm_associations CONTENT { key: $key, value: $value };
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("key", key.to_string()))
            .bind(("value", value.to_string()))
            .await?
            .check()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.db
            .query("DELETE rm_associations WHERE key = $key")
            .bind(("key", key.to_string()))
            .await?
            .check()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.db
            .query(format!("DELETE {}", ASSOCIATIONS_TABLE))
            .await?
            .check()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_become_safe_database_names() {
        assert_eq!(
            database_name_for_node("https://arcticdata.io/metacat/d1/mn"),
            "rmap_https___arcticdata_io_metacat_d1_mn"
        );
        assert_eq!(database_name_for_node("urn:node:KNB"), "rmap_urn_node_knb");
    }

    #[tokio::test]
    async fn in_memory_stores_are_isolated() {
        let a = SurrealKeyValueStore::in_memory().await.unwrap();
        let b = SurrealKeyValueStore::in_memory().await.unwrap();
        a.set_item("obj.1", "rm.1").await.unwrap();
        assert_eq!(b.get_item("obj.1").await.unwrap(), None);
    }
}
