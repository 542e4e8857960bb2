//! rmap-state: Collaborator contracts and persistence for resource map resolution
//!
//! This crate defines the external sources the resolver reconciles and the
//! storage it writes verified associations to.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: Backend-agnostic async contracts and the SurrealDB association store.
//!
//! ## Key Components
//!
//! - `KeyValueStore`: Object PID → resource map PID association storage
//! - `IndexBackend`, `SysmetaSource`, `ResourceMapFetcher`: Remote sources
//! - `SurrealKeyValueStore`: SurrealDB implementation of `KeyValueStore`
//! - `fakes`: In-memory implementations of every trait for tests

mod error;
pub mod fakes;
mod handle;
mod migrations;
pub mod storage_traits;

pub use error::{StateError, StorageError};
pub use handle::{database_name_for_node, RemoteStore, SurrealKeyValueStore};
pub use storage_traits::{
    FetchedResourceMap, IndexBackend, IndexDocument, KeyValueStore, ResourceMapFetcher,
    ResourceMapModel, StorageResult, SysmetaSource, SystemMetadata, DATA_FORMAT_TYPE,
    RESOURCE_MAP_FORMAT_ID,
};

/// Result type for rmap-state connection operations
pub type Result<T> = std::result::Result<T, StateError>;
