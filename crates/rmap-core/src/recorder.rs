//! The `status()` chokepoint.
//!
//! Every determination the resolver reaches goes through
//! [`StatusRecorder::status`], which persists the association, appends to the
//! event log and notifies subscribers, in that order.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::cache::ResolutionCache;
use crate::event_log::EventLog;
use crate::events::{StatusBus, StatusEvent};
use crate::status::{ResolutionResult, StatusLabel};

#[derive(Debug, Clone)]
pub struct StatusRecorder {
    cache: ResolutionCache,
    log: Arc<EventLog>,
    bus: Arc<StatusBus>,
}

impl StatusRecorder {
    pub fn new(cache: ResolutionCache, log: Arc<EventLog>, bus: Arc<StatusBus>) -> Self {
        Self { cache, log, bus }
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    pub fn bus(&self) -> &Arc<StatusBus> {
        &self.bus
    }

    /// Record an outcome for `pid` and build the matching result.
    ///
    /// A present `rm` is written to the cache exactly once. The returned
    /// result only carries the `unauthorized` and `multiple_rms` flags when
    /// it is a failure.
    pub async fn status(
        &self,
        pid: &str,
        label: StatusLabel,
        rm: Option<&str>,
        meta: Value,
    ) -> ResolutionResult {
        if let Some(rm) = rm {
            self.cache.store(pid, rm).await;
        }

        let flags = self.log.record(pid, label, rm, meta.clone());

        self.bus.publish(StatusEvent {
            pid: pid.to_string(),
            label,
            rm: rm.map(str::to_string),
            meta,
            timestamp: Utc::now(),
        });

        match rm {
            Some(rm) => ResolutionResult::found(pid, rm),
            None => ResolutionResult {
                unauthorized: flags.unauthorized,
                multiple_rms: flags.multiple_rms,
                ..ResolutionResult::missing(pid)
            },
        }
    }
}
