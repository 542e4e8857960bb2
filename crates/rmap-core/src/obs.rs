//! Structured observability hooks for resolution lifecycle events.
//!
//! Events are emitted with an `event` field (`resolve.started`,
//! `resolve.finished`, ...) so JSON log pipelines can filter on them.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Strategy;

/// Span covering one top-level `resolve` call.
///
/// The span is meant for `Instrument::instrument`, not `enter`, because the
/// resolution future crosses await points.
pub fn resolve_span(pid: &str, node_id: &str) -> tracing::Span {
    let attempt = Uuid::new_v4();
    tracing::info_span!("rmap.resolve", pid = %pid, node_id = %node_id, attempt = %attempt)
}

pub fn emit_resolve_started(pid: &str) {
    info!(event = "resolve.started", pid = %pid);
}

/// Emit event: resolution finished with outcome and elapsed time.
pub fn emit_resolve_finished(pid: &str, rm: Option<&str>, success: bool, elapsed: Duration) {
    info!(
        event = "resolve.finished",
        pid = %pid,
        rm = rm.unwrap_or(""),
        success = success,
        duration_ms = elapsed.as_millis() as u64,
    );
}

/// A strategy found nothing usable. Misses are not status events.
pub fn emit_strategy_miss(pid: &str, strategy: Strategy) {
    debug!(event = "strategy.miss", pid = %pid, strategy = %strategy);
}

pub fn emit_fetch_timeout(what: &str, target: &str, limit: Duration) {
    warn!(
        event = "fetch.timeout",
        what = what,
        target = %target,
        limit_ms = limit.as_millis() as u64,
    );
}

/// Emit event: a collaborator error downgraded to a miss.
pub fn emit_fetch_error(what: &str, target: &str, error: &dyn std::fmt::Display) {
    warn!(event = "fetch.error", what = what, target = %target, error = %error);
}
