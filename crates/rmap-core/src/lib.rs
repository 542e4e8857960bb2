//! rmap-core: resource map resolution
//!
//! Given the PID of an object in a DataONE-style repository, find the
//! OAI-ORE resource map of the package that contains it. The resolver
//! reconciles the search index, a local association cache, the object's
//! revision history and a naming convention into a single verified answer.
//!
//! ## Key Components
//!
//! - `ResourceMapResolver`: strategy orchestration, built with `ResourceMapResolver::builder`
//! - `StatusRecorder`: the `status()` chokepoint (cache write, event log, notifications)
//! - `EventLog` / `StatusBus`: per-PID diagnostics and publish/subscribe notifications
//! - `VersionTracker`: revision lineage over system metadata

pub mod cache;
pub mod config;
pub mod error;
pub mod event_log;
pub mod events;
pub mod fetch;
pub mod index;
pub mod metrics;
pub mod multi_rm;
pub mod obs;
pub mod recorder;
pub mod resolver;
pub mod status;
pub mod telemetry;
pub mod verify;
pub mod versions;
pub mod walker;

pub use cache::{CacheLookup, ResolutionCache};
pub use config::{
    ConsoleLevel, ResolverConfig, Strategy, DEFAULT_MAX_EVENTS, DEFAULT_MAX_FETCH_TIME,
    DEFAULT_MAX_LOGS, DEFAULT_MAX_STEPS, DEFAULT_NODE_ID,
};
pub use error::{FetchError, ResolverError, Result};
pub use event_log::{EventLog, LogEntry, LogFlags, LogLevel, ResolutionLog};
pub use events::{StatusBus, StatusEvent};
pub use index::{IndexMeta, IndexResult, IndexSearcher};
pub use metrics::METRICS;
pub use multi_rm::{MultiRmChecker, MultiRmMeta, MultiRmResult};
pub use recorder::StatusRecorder;
pub use resolver::{ResolverBuilder, ResourceMapResolver, MAX_SERIES_DEPTH, RM_PREFIX};
pub use status::{ResolutionResult, StatusLabel};
pub use telemetry::init_tracing;
pub use verify::{contains_pid, Verifier};
pub use versions::{Adjacent, SysmetaVersionTracker, VersionTracker};
pub use walker::{SysmetaWalker, WalkMeta, WalkResult};
