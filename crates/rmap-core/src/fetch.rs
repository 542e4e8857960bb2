//! Bounded collaborator calls.

use std::future::Future;
use std::time::Duration;

use rmap_state::StorageResult;

use crate::error::FetchError;
use crate::metrics::METRICS;
use crate::obs;

/// Await `fut` for at most `limit`.
///
/// `what` and `target` only label the timeout event. A timed-out fetch is
/// dropped, not cancelled remotely.
pub async fn with_deadline<T, F>(
    what: &str,
    target: &str,
    limit: Duration,
    fut: F,
) -> Result<T, FetchError>
where
    F: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(FetchError::Storage(e)),
        Err(_) => {
            METRICS.inc_fetch_timeouts();
            obs::emit_fetch_timeout(what, target, limit);
            Err(FetchError::Timeout(limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmap_state::StorageError;

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, StorageError>(1)
        };
        let err = with_deadline("index", "p", Duration::from_secs(1), slow)
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let failing = async { Err::<u8, _>(StorageError::Network("down".into())) };
        let err = with_deadline("index", "p", Duration::from_secs(1), failing)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Storage(StorageError::Network(_))));
    }
}
