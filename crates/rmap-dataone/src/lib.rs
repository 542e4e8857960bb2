//! rmap-dataone: DataONE REST backends for resource map resolution
//!
//! `DataOneClient` implements the index, system metadata and resource map
//! collaborators from `rmap-state` over HTTP.

mod client;
mod config;
mod error;
pub mod parse;

pub use client::DataOneClient;
pub use config::{DataOneConfig, DEFAULT_BASE_URL};
pub use error::DataOneError;

/// Result type for DataONE client construction
pub type Result<T> = std::result::Result<T, DataOneError>;
