//! Resource map resolution.
//!
//! [`ResourceMapResolver::resolve`] tries the configured strategies in order
//! (index, cache, revision walk, naming-convention guess by default) and stops
//! at the first one that yields an association verified against the resource
//! map itself. Index hits are trusted as-is. Every call ends with exactly one
//! terminal `status()`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use rmap_state::{IndexBackend, KeyValueStore, ResourceMapFetcher, SysmetaSource};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::cache::{CacheLookup, ResolutionCache};
use crate::config::{ResolverConfig, Strategy};
use crate::error::{ResolverError, Result};
use crate::event_log::{EventLog, ResolutionLog};
use crate::events::{StatusBus, StatusEvent};
use crate::fetch::with_deadline;
use crate::index::{IndexMeta, IndexResult, IndexSearcher};
use crate::metrics::METRICS;
use crate::multi_rm::{MultiRmChecker, MultiRmMeta, MultiRmResult};
use crate::obs;
use crate::recorder::StatusRecorder;
use crate::status::{ResolutionResult, StatusLabel};
use crate::verify::{contains_pid, Verifier};
use crate::versions::{SysmetaVersionTracker, VersionTracker};
use crate::walker::{SysmetaWalker, WalkMeta, WalkResult};

/// Prefix of conventionally named resource maps.
pub const RM_PREFIX: &str = "resource_map_";

/// How many series IDs may be followed through one another before giving up.
pub const MAX_SERIES_DEPTH: usize = 4;

/// What one strategy concluded.
enum Attempt {
    Found {
        label: StatusLabel,
        rm: String,
        meta: Value,
    },
    /// The PID is a series ID; resolve its current version instead.
    Series,
    /// Stop without trying further strategies.
    Halt { label: StatusLabel, meta: Value },
    Miss,
}

/// Why every strategy missed, attached to the `allMiss` entry.
#[derive(Debug, Default, Serialize)]
struct Diagnostics {
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<IndexMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    multi_rm: Option<MultiRmMeta>,
    /// Cached map that failed verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    stale_storage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sysmeta: Option<WalkMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guessed_pid: Option<String>,
}

// ----- Builder -----

/// Assembles a [`ResourceMapResolver`] from its collaborators.
pub struct ResolverBuilder {
    config: ResolverConfig,
    index: Option<Arc<dyn IndexBackend>>,
    storage: Option<Arc<dyn KeyValueStore>>,
    sysmeta: Option<Arc<dyn SysmetaSource>>,
    tracker: Option<Arc<dyn VersionTracker>>,
    fetcher: Option<Arc<dyn ResourceMapFetcher>>,
    event_log: Option<Arc<EventLog>>,
    bus: Option<Arc<StatusBus>>,
}

impl ResolverBuilder {
    pub fn index(mut self, index: Arc<dyn IndexBackend>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn sysmeta(mut self, sysmeta: Arc<dyn SysmetaSource>) -> Self {
        self.sysmeta = Some(sysmeta);
        self
    }

    /// Use a custom version tracker instead of one built over `sysmeta`.
    pub fn version_tracker(mut self, tracker: Arc<dyn VersionTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ResourceMapFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Share an event log between resolvers.
    pub fn event_log(mut self, log: Arc<EventLog>) -> Self {
        self.event_log = Some(log);
        self
    }

    pub fn status_bus(mut self, bus: Arc<StatusBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<ResourceMapResolver> {
        let config = self.config;
        config.validate()?;

        let index = self.index.ok_or(ResolverError::MissingCollaborator("index"))?;
        let storage = self
            .storage
            .ok_or(ResolverError::MissingCollaborator("storage"))?;
        let fetcher = self
            .fetcher
            .ok_or(ResolverError::MissingCollaborator("fetcher"))?;
        let tracker: Arc<dyn VersionTracker> = match (self.tracker, self.sysmeta) {
            (Some(tracker), _) => tracker,
            (None, Some(source)) => Arc::new(SysmetaVersionTracker::new(source, config.max_steps)),
            (None, None) => return Err(ResolverError::MissingCollaborator("sysmeta")),
        };

        let t = config.max_fetch_time;
        let log = self.event_log.unwrap_or_else(|| {
            Arc::new(EventLog::new(
                config.max_events,
                config.max_logs,
                config.console_level,
            ))
        });
        let bus = self.bus.unwrap_or_default();

        let recorder = StatusRecorder::new(ResolutionCache::new(storage, t), log, bus);
        let index = IndexSearcher::new(index, t);

        Ok(ResourceMapResolver {
            verifier: Verifier::new(fetcher, recorder.clone(), t),
            walker: SysmetaWalker::new(tracker.clone(), index.clone(), config.max_steps, t),
            multi_rm: MultiRmChecker::new(tracker.clone(), t),
            tracker,
            index,
            recorder,
            config,
        })
    }
}

// ----- Resolver -----

/// Finds the resource map that aggregates an object.
///
/// Cheap to share behind an `Arc`; concurrent resolutions only contend on the
/// cache and the event log.
pub struct ResourceMapResolver {
    config: ResolverConfig,
    recorder: StatusRecorder,
    index: IndexSearcher,
    verifier: Verifier,
    walker: SysmetaWalker,
    multi_rm: MultiRmChecker,
    tracker: Arc<dyn VersionTracker>,
}

impl std::fmt::Debug for ResourceMapResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMapResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResourceMapResolver {
    pub fn builder(config: ResolverConfig) -> ResolverBuilder {
        ResolverBuilder {
            config,
            index: None,
            storage: None,
            sysmeta: None,
            tracker: None,
            fetcher: None,
            event_log: None,
            bus: None,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve the resource map for `pid`. Never fails; a miss is a result
    /// with `success == false`.
    pub async fn resolve(&self, pid: &str) -> ResolutionResult {
        let span = obs::resolve_span(pid, &self.config.node_id);
        async {
            let started = Instant::now();
            obs::emit_resolve_started(pid);
            let result = self.resolve_at_depth(pid, 0).await;
            METRICS.record_resolution(result.success);
            obs::emit_resolve_finished(
                pid,
                result.rm.as_deref(),
                result.success,
                started.elapsed(),
            );
            result
        }
        .instrument(span)
        .await
    }

    fn resolve_at_depth<'a>(&'a self, pid: &'a str, depth: usize) -> BoxFuture<'a, ResolutionResult> {
        async move {
            let mut diag = Diagnostics::default();

            for strategy in &self.config.strategies {
                let attempt = match strategy {
                    Strategy::Index => self.attempt_index(pid, &mut diag).await,
                    Strategy::Storage => self.attempt_storage(pid, &mut diag).await,
                    Strategy::Sysmeta => self.attempt_sysmeta(pid, &mut diag).await,
                    Strategy::Guess => self.attempt_guess(pid, &mut diag).await,
                };
                match attempt {
                    Attempt::Found { label, rm, meta } => {
                        return self.recorder.status(pid, label, Some(&rm), meta).await;
                    }
                    Attempt::Series => return self.resolve_series(pid, depth).await,
                    Attempt::Halt { label, meta } => {
                        return self.recorder.status(pid, label, None, meta).await;
                    }
                    Attempt::Miss => obs::emit_strategy_miss(pid, *strategy),
                }
            }

            let meta = serde_json::to_value(&diag).unwrap_or(Value::Null);
            self.recorder
                .status(pid, StatusLabel::AllMiss, None, meta)
                .await
        }
        .boxed()
    }

    async fn attempt_index(&self, pid: &str, diag: &mut Diagnostics) -> Attempt {
        let IndexResult { rm, meta, .. } = self.index.search(pid).await;
        if let Some(rm) = rm {
            return Attempt::Found {
                label: StatusLabel::FoundInIndex,
                rm,
                meta: json!({ "index": meta }),
            };
        }

        let is_sid = meta.is_sid;
        let rms = meta.rms.clone();
        diag.index = Some(meta);
        if is_sid {
            return Attempt::Series;
        }

        if rms.len() > 1 {
            let multi = self.multi_rm.check(pid, &rms).await;
            if let Some(rm) = multi.rm {
                return Attempt::Found {
                    label: StatusLabel::MultiRmMatch,
                    rm,
                    meta: json!({ "multi_rm": multi.meta }),
                };
            }
            diag.multi_rm = Some(multi.meta);
        }
        Attempt::Miss
    }

    async fn attempt_storage(&self, pid: &str, diag: &mut Diagnostics) -> Attempt {
        let Some(rm) = self.recorder.cache().check_storage(pid).await.rm else {
            return Attempt::Miss;
        };
        if self.verifier.verify(&rm, pid).await {
            return Attempt::Found {
                label: StatusLabel::StorageMatch,
                rm,
                meta: Value::Null,
            };
        }
        tracing::debug!(pid = %pid, rm = %rm, "cached association failed verification");
        diag.stale_storage = Some(rm);
        Attempt::Miss
    }

    async fn attempt_sysmeta(&self, pid: &str, diag: &mut Diagnostics) -> Attempt {
        let WalkResult { rm, meta } = self.walker.walk_sysmeta(pid).await;
        if let Some(rm) = rm {
            if self.verifier.verify(&rm, pid).await {
                return Attempt::Found {
                    label: StatusLabel::SysmetaMatch,
                    rm,
                    meta: json!({ "sysmeta": meta }),
                };
            }
        }
        if meta.unauthorized {
            return Attempt::Halt {
                label: StatusLabel::Unauthorized,
                meta: json!({ "sysmeta": meta }),
            };
        }
        diag.sysmeta = Some(meta);
        Attempt::Miss
    }

    async fn attempt_guess(&self, pid: &str, diag: &mut Diagnostics) -> Attempt {
        match self.guess_pid(pid).await {
            Some(rm) => Attempt::Found {
                label: StatusLabel::GuessMatch,
                rm,
                meta: Value::Null,
            },
            None => {
                diag.guessed_pid = Some(guess_candidate(pid));
                Attempt::Miss
            }
        }
    }

    // ----- Series IDs -----

    /// Resolve a series ID through its current version.
    ///
    /// The result is the concrete version's result, unchanged. Status events
    /// for that version are also recorded against `sid`.
    pub async fn resolve_from_series_id(&self, sid: &str) -> ResolutionResult {
        self.resolve_series(sid, 0).await
    }

    async fn resolve_series(&self, sid: &str, depth: usize) -> ResolutionResult {
        if depth >= MAX_SERIES_DEPTH {
            tracing::warn!(sid = %sid, depth, "series ID nesting too deep");
            return self
                .recorder
                .status(
                    sid,
                    StatusLabel::NoPidForSeriesId,
                    None,
                    json!({ "error": "series nesting too deep" }),
                )
                .await;
        }

        let Some(pid) = self.pid_for_sid(sid).await else {
            return self
                .recorder
                .status(sid, StatusLabel::NoPidForSeriesId, None, Value::Null)
                .await;
        };

        // A series naming itself would relay its own events back to itself.
        let Some(mut relay) = (pid != sid).then(|| self.recorder.bus().subscribe_pid(&pid))
        else {
            return self.resolve_at_depth(&pid, depth + 1).await;
        };
        let result = self.resolve_at_depth(&pid, depth + 1).await;

        loop {
            match relay.try_recv() {
                Ok(event) => self.relay_to_series(sid, event).await,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(sid = %sid, pid = %pid, skipped = n, "status relay lagged");
                }
                Err(_) => break,
            }
        }
        drop(relay);
        self.recorder.bus().release(&pid);
        result
    }

    async fn relay_to_series(&self, sid: &str, event: StatusEvent) {
        let mut meta = match event.meta {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("detail".to_string(), other);
                map
            }
        };
        meta.insert("sid".to_string(), Value::String(sid.to_string()));
        meta.insert("pid".to_string(), Value::String(event.pid));
        self.recorder
            .status(sid, event.label, event.rm.as_deref(), Value::Object(meta))
            .await;
    }

    async fn pid_for_sid(&self, sid: &str) -> Option<String> {
        let nth = with_deadline(
            "sysmeta",
            sid,
            self.config.max_fetch_time,
            self.tracker.get_nth(sid, 0),
        )
        .await;
        match nth {
            Ok(sysmeta) => sysmeta
                .and_then(|sm| sm.identifier)
                .filter(|pid| !pid.is_empty()),
            Err(e) => {
                obs::emit_fetch_error("sysmeta", sid, &e);
                None
            }
        }
    }

    // ----- Individual strategies -----

    /// Look `pid` up in the search index.
    pub async fn search_index(&self, pid: &str) -> IndexResult {
        self.index.search(pid).await
    }

    /// Narrow several indexed maps to the single current one.
    pub async fn multi_rm_check(&self, pid: &str, rms: &[String]) -> MultiRmResult {
        self.multi_rm.check(pid, rms).await
    }

    pub async fn check_storage(&self, pid: &str) -> CacheLookup {
        self.recorder.cache().check_storage(pid).await
    }

    pub async fn clear_storage(&self) {
        self.recorder.cache().clear_storage().await
    }

    pub async fn walk_sysmeta(&self, pid: &str) -> WalkResult {
        self.walker.walk_sysmeta(pid).await
    }

    /// The conventional resource map for `pid`, if it verifies.
    pub async fn guess_pid(&self, pid: &str) -> Option<String> {
        let candidate = guess_candidate(pid);
        self.verifier
            .verify(&candidate, pid)
            .await
            .then_some(candidate)
    }

    pub async fn verify(&self, rm: &str, pid: &str) -> bool {
        self.verifier.verify(rm, pid).await
    }

    pub fn contains_pid(model: Option<&rmap_state::ResourceMapModel>, pid: &str) -> bool {
        contains_pid(model, pid)
    }

    // ----- Status and observation -----

    /// Record an outcome for `pid`. See [`StatusRecorder::status`].
    pub async fn status(
        &self,
        pid: &str,
        label: StatusLabel,
        rm: Option<&str>,
        meta: Value,
    ) -> ResolutionResult {
        self.recorder.status(pid, label, rm, meta).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.recorder.bus().subscribe()
    }

    pub fn subscribe_pid(&self, pid: &str) -> broadcast::Receiver<StatusEvent> {
        self.recorder.bus().subscribe_pid(pid)
    }

    pub fn get_log(&self, pid: &str) -> Option<ResolutionLog> {
        self.recorder.log().get_log(pid)
    }

    pub fn check_log_for_unauth(log: &ResolutionLog) -> bool {
        log.check_for_unauth()
    }

    pub fn check_log_for_multiple_rms(log: &ResolutionLog) -> bool {
        log.check_for_multiple_rms()
    }

    pub fn event_log(&self) -> &Arc<EventLog> {
        self.recorder.log()
    }

    pub fn max_fetch_time(&self) -> Duration {
        self.config.max_fetch_time
    }
}

fn guess_candidate(pid: &str) -> String {
    format!("{RM_PREFIX}{pid}")
}
