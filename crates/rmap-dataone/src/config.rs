//! DataONE endpoint configuration

use serde::{Deserialize, Serialize};

/// Default coordinating node API.
pub const DEFAULT_BASE_URL: &str = "https://cn.dataone.org/cn/v2";

/// DataONE client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataOneConfig {
    /// REST API root, e.g. `https://cn.dataone.org/cn/v2`
    pub base_url: String,
    /// Bearer token for restricted objects (optional)
    pub token: Option<String>,
}

impl Default for DataOneConfig {
    fn default() -> Self {
        DataOneConfig {
            base_url: std::env::var("DATAONE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            token: std::env::var("DATAONE_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }
}

impl DataOneConfig {
    /// Read `DATAONE_BASE_URL` and `DATAONE_TOKEN`.
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(base_url: &str) -> Self {
        DataOneConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}
