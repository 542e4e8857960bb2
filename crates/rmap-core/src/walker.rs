//! Revision-history walk.
//!
//! When neither the index nor the cache knows a PID, an older revision of the
//! object may still be indexed with the package it belonged to. The walker
//! steps back over `obsoletes` links, asks the index about each prior
//! revision, and on a hit steps the found resource map forward the same
//! number of revisions to reach the map that should aggregate the current
//! object.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::fetch::with_deadline;
use crate::index::IndexSearcher;
use crate::versions::VersionTracker;

/// Diagnostics for one walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkMeta {
    pub steps_back: usize,
    pub steps_forward: usize,
    /// Prior revisions visited, newest first.
    pub past_pids: Vec<String>,
    pub errors: Vec<String>,
    pub unauthorized: bool,
    pub cycle_detected: bool,
    pub budget_exhausted: bool,
    /// The walk reached the first revision without an index hit.
    pub reached_start: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkResult {
    pub rm: Option<String>,
    pub meta: WalkMeta,
}

#[derive(Clone)]
pub struct SysmetaWalker {
    tracker: Arc<dyn VersionTracker>,
    index: IndexSearcher,
    max_steps: usize,
    max_fetch_time: Duration,
}

impl SysmetaWalker {
    pub fn new(
        tracker: Arc<dyn VersionTracker>,
        index: IndexSearcher,
        max_steps: usize,
        max_fetch_time: Duration,
    ) -> Self {
        Self {
            tracker,
            index,
            max_steps,
            max_fetch_time,
        }
    }

    /// Walk `pid`'s history for an indexed resource map.
    ///
    /// Never takes more than `max_steps` backward hops, whatever the chain
    /// looks like. The returned map is unverified.
    pub async fn walk_sysmeta(&self, pid: &str) -> WalkResult {
        let mut meta = WalkMeta::default();
        let mut visited: HashSet<String> = HashSet::from([pid.to_string()]);
        let mut current = pid.to_string();
        let mut found: Option<String> = None;

        while meta.steps_back < self.max_steps {
            let adjacent = match self.adjacent(&current).await {
                Ok(adjacent) => adjacent,
                Err(e) => {
                    meta.unauthorized |= e.is_unauthorized();
                    meta.errors.push(e.to_string());
                    break;
                }
            };
            let Some(prev) = adjacent.prev else {
                meta.reached_start = true;
                break;
            };
            if !visited.insert(prev.clone()) {
                tracing::warn!(pid = %pid, revisited = %prev, "revision cycle detected");
                meta.cycle_detected = true;
                break;
            }

            meta.steps_back += 1;
            meta.past_pids.push(prev.clone());

            let hit = self.index.search(&prev).await;
            current = prev;
            if let Some(rm) = hit.rm {
                found = Some(rm);
                break;
            }
        }

        let Some(rm) = found else {
            meta.budget_exhausted = meta.steps_back >= self.max_steps
                && !meta.reached_start
                && !meta.cycle_detected
                && meta.errors.is_empty();
            if meta.budget_exhausted {
                tracing::debug!(pid = %pid, max_steps = self.max_steps, "walk budget exhausted");
            }
            return WalkResult { rm: None, meta };
        };

        let rm = self.walk_forward(rm, &mut meta).await;
        WalkResult { rm: Some(rm), meta }
    }

    /// Step `rm` forward up to `meta.steps_back` revisions, stopping early at
    /// the head of its chain.
    async fn walk_forward(&self, rm: String, meta: &mut WalkMeta) -> String {
        let mut current = rm;
        let mut seen: HashSet<String> = HashSet::from([current.clone()]);

        while meta.steps_forward < meta.steps_back {
            match self.adjacent(&current).await {
                Ok(adjacent) => match adjacent.next {
                    Some(next) if seen.insert(next.clone()) => {
                        current = next;
                        meta.steps_forward += 1;
                    }
                    Some(_) => {
                        meta.cycle_detected = true;
                        break;
                    }
                    None => break,
                },
                Err(e) => {
                    meta.unauthorized |= e.is_unauthorized();
                    meta.errors.push(e.to_string());
                    break;
                }
            }
        }
        current
    }

    async fn adjacent(&self, pid: &str) -> Result<crate::versions::Adjacent, FetchError> {
        with_deadline(
            "sysmeta",
            pid,
            self.max_fetch_time,
            self.tracker.adjacent(pid),
        )
        .await
    }
}
