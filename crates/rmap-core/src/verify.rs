//! Resource map membership verification.

use std::sync::Arc;
use std::time::Duration;

use rmap_state::{ResourceMapFetcher, ResourceMapModel};
use serde_json::json;

use crate::fetch::with_deadline;
use crate::metrics::METRICS;
use crate::obs;
use crate::recorder::StatusRecorder;
use crate::status::StatusLabel;

/// Whether `pid` is a member of `model`. An absent model contains nothing.
pub fn contains_pid(model: Option<&ResourceMapModel>, pid: &str) -> bool {
    model.is_some_and(|m| m.contains(pid))
}

/// Fetches candidate resource maps and checks that they aggregate a PID.
#[derive(Clone)]
pub struct Verifier {
    fetcher: Arc<dyn ResourceMapFetcher>,
    recorder: StatusRecorder,
    max_fetch_time: Duration,
}

impl Verifier {
    pub fn new(
        fetcher: Arc<dyn ResourceMapFetcher>,
        recorder: StatusRecorder,
        max_fetch_time: Duration,
    ) -> Self {
        Self {
            fetcher,
            recorder,
            max_fetch_time,
        }
    }

    /// Fetch `rm` and check that it aggregates `pid`.
    ///
    /// Always records exactly one of `foundAndValid`, `foundButNotValid` or
    /// `rmFetchError` against `pid` before returning. A fetch error, a
    /// non-200 answer or a timeout is a failed verification.
    pub async fn verify(&self, rm: &str, pid: &str) -> bool {
        METRICS.inc_verifications();
        let fetched = with_deadline(
            "resource_map",
            rm,
            self.max_fetch_time,
            self.fetcher.fetch_resource_map(rm),
        )
        .await;

        let (label, valid, meta) = match fetched {
            Ok(fetched) if fetched.is_ok() => {
                let model = fetched.model.as_ref();
                let valid = contains_pid(model, pid);
                let members: Vec<&String> = model
                    .map(|m| m.member_ids.iter().collect())
                    .unwrap_or_default();
                let label = if valid {
                    StatusLabel::FoundAndValid
                } else {
                    StatusLabel::FoundButNotValid
                };
                (label, valid, json!({ "rm_candidate": rm, "rm_members": members }))
            }
            Ok(fetched) => (
                StatusLabel::RmFetchError,
                false,
                json!({ "rm_candidate": rm, "error": fetched.status }),
            ),
            Err(e) => {
                obs::emit_fetch_error("resource_map", rm, &e);
                (
                    StatusLabel::RmFetchError,
                    false,
                    json!({ "rm_candidate": rm, "error": e.to_string() }),
                )
            }
        };

        self.recorder
            .status(pid, label, valid.then_some(rm), meta)
            .await;
        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_pid_requires_membership() {
        let model = ResourceMapModel::new("rm", ["a", "b"]);
        assert!(contains_pid(Some(&model), "a"));
        assert!(!contains_pid(Some(&model), "c"));
        assert!(!contains_pid(None, "a"));
    }
}
