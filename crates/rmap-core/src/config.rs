//! Resolver configuration.
//!
//! A [`ResolverConfig`] is set once when the resolver is built and never
//! changes afterwards. Out-of-range numeric settings fall back to their
//! defaults instead of failing, so a bad environment variable degrades to the
//! stock behaviour.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ResolverError, Result};

/// Default number of revisions `walk_sysmeta` may step back.
pub const DEFAULT_MAX_STEPS: usize = 200;

/// Default bound on any single index, cache, sysmeta or resource map fetch.
pub const DEFAULT_MAX_FETCH_TIME: Duration = Duration::from_millis(45_000);

/// Default number of entries retained per PID in the event log.
pub const DEFAULT_MAX_EVENTS: usize = 500;

/// Default number of PIDs the event log keeps logs for.
pub const DEFAULT_MAX_LOGS: usize = 1_000;

/// Node id used when none is configured.
pub const DEFAULT_NODE_ID: &str = "unknown";

/// Minimum severity the event log mirrors to `tracing`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    #[default]
    Info,
    Warning,
    Error,
    /// Never mirror entries.
    Off,
}

impl FromStr for ConsoleLevel {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(ConsoleLevel::Info),
            "warning" | "warn" => Ok(ConsoleLevel::Warning),
            "error" => Ok(ConsoleLevel::Error),
            "off" | "false" | "none" => Ok(ConsoleLevel::Off),
            other => Err(ResolverError::InvalidConfig(format!(
                "unknown console level: {other}"
            ))),
        }
    }
}

impl fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsoleLevel::Info => "info",
            ConsoleLevel::Warning => "warning",
            ConsoleLevel::Error => "error",
            ConsoleLevel::Off => "off",
        };
        f.write_str(s)
    }
}

/// One resolution strategy. The resolver tries the configured strategies in
/// order and stops at the first one that yields a trustworthy answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Precomputed association in the search index (also detects series IDs).
    Index,
    /// Association remembered from an earlier verified resolution.
    Storage,
    /// Previous revisions of the object, looked up in the index.
    Sysmeta,
    /// `resource_map_<pid>` naming convention.
    Guess,
}

impl Strategy {
    /// The stock order: cheapest trustworthy source first.
    pub const DEFAULT_ORDER: [Strategy; 4] = [
        Strategy::Index,
        Strategy::Storage,
        Strategy::Sysmeta,
        Strategy::Guess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Index => "index",
            Strategy::Storage => "storage",
            Strategy::Sysmeta => "sysmeta",
            Strategy::Guess => "guess",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Repository node the resolver serves; scopes the association store.
    pub node_id: String,
    /// Maximum revisions to step back while walking system metadata.
    pub max_steps: usize,
    /// Bound on each individual fetch.
    pub max_fetch_time: Duration,
    /// Event-log mirroring threshold.
    pub console_level: ConsoleLevel,
    /// Strategy order.
    pub strategies: Vec<Strategy>,
    /// Entries retained per PID log.
    pub max_events: usize,
    /// PID logs retained.
    pub max_logs: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            node_id: DEFAULT_NODE_ID.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            max_fetch_time: DEFAULT_MAX_FETCH_TIME,
            console_level: ConsoleLevel::default(),
            strategies: Strategy::DEFAULT_ORDER.to_vec(),
            max_events: DEFAULT_MAX_EVENTS,
            max_logs: DEFAULT_MAX_LOGS,
        }
    }
}

impl ResolverConfig {
    /// Default settings for the given node.
    pub fn new(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            node_id: if node_id.is_empty() {
                DEFAULT_NODE_ID.to_string()
            } else {
                node_id
            },
            ..Self::default()
        }
    }

    /// Set the step budget. Zero keeps the default.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = if max_steps > 0 {
            max_steps
        } else {
            DEFAULT_MAX_STEPS
        };
        self
    }

    /// Set the per-fetch bound. A zero duration keeps the default.
    pub fn with_max_fetch_time(mut self, max_fetch_time: Duration) -> Self {
        self.max_fetch_time = if max_fetch_time.is_zero() {
            DEFAULT_MAX_FETCH_TIME
        } else {
            max_fetch_time
        };
        self
    }

    pub fn with_console_level(mut self, level: ConsoleLevel) -> Self {
        self.console_level = level;
        self
    }

    pub fn with_strategies(mut self, strategies: impl Into<Vec<Strategy>>) -> Self {
        self.strategies = strategies.into();
        self
    }

    /// Set event-log bounds. Zero keeps the corresponding default.
    pub fn with_log_capacity(mut self, max_events: usize, max_logs: usize) -> Self {
        self.max_events = if max_events > 0 {
            max_events
        } else {
            DEFAULT_MAX_EVENTS
        };
        self.max_logs = if max_logs > 0 {
            max_logs
        } else {
            DEFAULT_MAX_LOGS
        };
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - RMAP_NODE_ID (optional, default: "unknown")
    /// - RMAP_MAX_STEPS (optional, default: 200)
    /// - RMAP_MAX_FETCH_MS (optional, default: 45000)
    /// - RMAP_CONSOLE_LEVEL (optional, default: "info")
    pub fn from_env() -> Result<Self> {
        let node_id = std::env::var("RMAP_NODE_ID").unwrap_or_default();
        let max_steps = std::env::var("RMAP_MAX_STEPS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_STEPS);
        let max_fetch_time = std::env::var("RMAP_MAX_FETCH_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_MAX_FETCH_TIME);
        let console_level = match std::env::var("RMAP_CONSOLE_LEVEL") {
            Ok(v) => v.parse()?,
            Err(_) => ConsoleLevel::default(),
        };

        let config = Self::new(node_id)
            .with_max_steps(max_steps)
            .with_max_fetch_time(max_fetch_time)
            .with_console_level(console_level);
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the resolver cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.strategies.is_empty() {
            return Err(ResolverError::InvalidConfig(
                "at least one strategy is required".to_string(),
            ));
        }
        for (i, s) in self.strategies.iter().enumerate() {
            if self.strategies[..i].contains(s) {
                return Err(ResolverError::InvalidConfig(format!(
                    "strategy {s} listed more than once"
                )));
            }
        }
        Ok(())
    }
}
