//! Error types for the DataONE client

use rmap_state::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataOneError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid base URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },
}

impl From<DataOneError> for StorageError {
    fn from(err: DataOneError) -> Self {
        match err {
            DataOneError::Http(e) => StorageError::Network(e.to_string()),
            DataOneError::InvalidUrl { url, reason } => {
                StorageError::Backend(format!("invalid base URL {url}: {reason}"))
            }
            DataOneError::Parse { what, reason } => StorageError::Parse { what, reason },
        }
    }
}
