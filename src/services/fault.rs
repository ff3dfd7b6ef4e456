//! Fault policy over fetch outcomes.
//!
//! Pure classification (`assess`) plus the side-effecting pieces the job
//! runner applies around it: structured failure logging with nested error
//! detail, partial-output cleanup, and the `JobControl` signal that carries
//! pause/abort decisions back to the dispatcher.
//!
//! Policy, matching upstream behavior:
//! - 404: the product for that grid cell is not published (yet or anymore).
//!   Recoverable: pause dispatch for a flat 15 seconds so the upstream is
//!   not hammered, then continue with the remaining tasks. The failed task
//!   itself is not retried.
//! - 429: the API key is rate-limited. Job-fatal: nothing further is
//!   dispatched and in-flight work is abandoned.
//! - anything else: the task is marked failed and its siblings continue.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::services::fetcher::FetchOutcome;

/// Flat dispatch pause after a 404. A hard backpressure contract, not a
/// backoff schedule.
pub const NOT_FOUND_PAUSE: Duration = Duration::from_secs(15);

/// What the job should do after a task outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    /// Keep processing; the failure (if any) stays local to its task.
    Continue,
    /// Pause dispatch for the given delay, then resume remaining tasks.
    Pause(Duration),
    /// Stop dispatching and terminate the job.
    Abort,
}

/// Classify an outcome. Pure: no logging, no cleanup.
pub fn assess(outcome: &FetchOutcome) -> FaultAction {
    if outcome.success {
        return FaultAction::Continue;
    }
    match outcome.status {
        Some(404) => FaultAction::Pause(NOT_FOUND_PAUSE),
        Some(429) => FaultAction::Abort,
        _ => FaultAction::Continue,
    }
}

/// Log a failed outcome, expanding the upstream's nested error list when the
/// body carries one.
pub fn log_failure(outcome: &FetchOutcome) {
    let detail = outcome.detail.as_deref().unwrap_or("no detail");
    tracing::error!(
        "Failed processing {}: {}",
        outcome.task_id,
        error_detail(detail)
    );
}

/// Extract the upstream's `errors` array from a JSON error body, falling
/// back to the raw text.
pub fn error_detail(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|v| v.get("errors").cloned())
        .map(|errors| errors.to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Remove whatever was written for a failed task. A missing file is fine;
/// the fetch may have failed before the first byte.
pub fn discard_partial_output(output_dir: &Path, task_id: &str) -> std::io::Result<()> {
    match std::fs::remove_file(output_dir.join(task_id)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Shared pause/abort signal between the outcome consumer and the task
/// dispatcher. Abort is terminal; pause is a deadline the dispatcher waits
/// out before the next dispatch.
#[derive(Debug, Clone, Default)]
pub struct JobControl {
    inner: Arc<ControlInner>,
}

#[derive(Debug, Default)]
struct ControlInner {
    aborted: AtomicBool,
    pause_until: Mutex<Option<Instant>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminal: no further tasks will be dispatched.
    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Hold dispatch until `delay` from now. A longer pending pause wins.
    pub fn pause_for(&self, delay: Duration) {
        let until = Instant::now() + delay;
        let mut guard = self.inner.pause_until.lock().unwrap();
        match *guard {
            Some(existing) if existing >= until => {}
            _ => *guard = Some(until),
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(
            *self.inner.pause_until.lock().unwrap(),
            Some(until) if until > Instant::now()
        )
    }

    /// Wait out any pending pause. Returns immediately once aborted; the
    /// caller must check `is_aborted` next.
    pub async fn wait_until_ready(&self) {
        loop {
            if self.is_aborted() {
                return;
            }
            let deadline = *self.inner.pause_until.lock().unwrap();
            match deadline {
                Some(until) if until > Instant::now() => tokio::time::sleep_until(until).await,
                _ => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn outcome(success: bool, status: Option<u16>) -> FetchOutcome {
        FetchOutcome {
            task_id: "t".to_string(),
            success,
            status,
            payload: None,
            detail: None,
        }
    }

    #[test]
    fn test_assess_success() {
        assert_eq!(assess(&outcome(true, Some(200))), FaultAction::Continue);
    }

    #[test]
    fn test_assess_not_found_pauses_fifteen_seconds() {
        assert_eq!(
            assess(&outcome(false, Some(404))),
            FaultAction::Pause(Duration::from_secs(15))
        );
    }

    #[test]
    fn test_assess_rate_limit_aborts() {
        assert_eq!(assess(&outcome(false, Some(429))), FaultAction::Abort);
    }

    #[test]
    fn test_assess_other_failures_continue() {
        assert_eq!(assess(&outcome(false, Some(500))), FaultAction::Continue);
        assert_eq!(assess(&outcome(false, None)), FaultAction::Continue);
    }

    #[test]
    fn test_error_detail_nested() {
        let raw = r#"{"errors":[{"code":"900902","message":"Missing Credentials"}]}"#;
        let detail = error_detail(raw);
        assert!(detail.contains("Missing Credentials"));
        assert!(detail.starts_with('['));
    }

    #[test]
    fn test_error_detail_raw_passthrough() {
        assert_eq!(error_detail("plain text error"), "plain text error");
    }

    #[test]
    fn test_discard_partial_output_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("task-1");
        std::fs::write(&path, b"partial").unwrap();

        discard_partial_output(dir.path(), "task-1").unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_discard_partial_output_missing_file_ok() {
        let dir = tempfile::tempdir().unwrap();
        discard_partial_output(dir.path(), "never-written").unwrap();
    }

    #[test]
    fn test_control_abort_is_terminal() {
        let control = JobControl::new();
        assert!(!control.is_aborted());
        control.abort();
        assert!(control.is_aborted());
    }

    #[tokio::test]
    async fn test_control_pause_then_ready() {
        let control = JobControl::new();
        control.pause_for(Duration::from_millis(50));
        assert!(control.is_paused());

        let start = Instant::now();
        control.wait_until_ready().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(!control.is_paused());
    }

    #[tokio::test]
    async fn test_control_abort_unblocks_wait() {
        let control = JobControl::new();
        control.pause_for(Duration::from_secs(3600));
        control.abort();
        // Must return immediately despite the pending pause.
        tokio::time::timeout(Duration::from_millis(100), control.wait_until_ready())
            .await
            .expect("wait_until_ready should return once aborted");
    }

    #[test]
    fn test_longer_pause_wins() {
        let control = JobControl::new();
        control.pause_for(Duration::from_secs(60));
        control.pause_for(Duration::from_millis(1));
        // The earlier, longer deadline must still be pending.
        assert!(control.is_paused());
        let deadline = (*control.inner.pause_until.lock().unwrap()).unwrap();
        assert!(deadline > Instant::now() + Duration::from_secs(30));
    }
}
