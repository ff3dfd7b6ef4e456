//! Job orchestration.
//!
//! Explicit pipeline per job kind, replacing the upstream's name-keyed hook
//! registry: generate → dispatch → consume outcomes under the fault policy
//! → transform → persist. Fetches run on the bounded pool; everything
//! downstream runs on this single consumer, processing completed fetches as
//! they arrive. Store connections are acquired by the caller and released
//! on every exit path.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::db::models::Station;
use crate::db::queries;
use crate::errors::JobError;
use crate::jobs::paquetobs::{self, Frequency};
use crate::jobs::ModelJob;
use crate::services::fault::{self, FaultAction, JobControl};
use crate::services::fetcher::{FetchExecutor, FetchOutcome};
use crate::services::generator::{generate_tasks, FetchTask};
use crate::services::{observations, stations};

/// What a job run did, for the completion log.
#[derive(Debug)]
pub struct JobSummary {
    pub created: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub aborted: bool,
}

impl JobSummary {
    fn new(created: usize, outcomes: &[FetchOutcome], aborted: bool) -> Self {
        Self {
            created,
            succeeded: outcomes.iter().filter(|o| o.success).count(),
            failed: outcomes.iter().filter(|o| !o.success).count(),
            aborted,
        }
    }
}

/// Run a model download job: expand the grid and fetch every package.
/// Payloads stay on disk; there is no transform stage for model products.
pub async fn run_model_job(config: &AppConfig, job: &ModelJob) -> Result<JobSummary, JobError> {
    let tasks = generate_tasks(&job.grid, Utc::now())?;
    for task in &tasks {
        tracing::debug!(
            "Creating task for {} (run {}, package {}, window {})",
            task.id,
            task.reference_time,
            task.package,
            task.forecast_window
        );
    }
    tracing::info!("{}: {} tasks generated", job.id, tasks.len());

    let created = tasks.len();
    let (outcomes, aborted) = fetch_all(config, tasks, config.arpege_token.clone()).await;

    let summary = JobSummary::new(created, &outcomes, aborted);
    log_summary(&job.id, &summary);
    if let Some(err) = abort_error(&outcomes, aborted) {
        return Err(err);
    }
    Ok(summary)
}

/// Run the station inventory job: fetch the CSV export, transform it, and
/// upsert into the stations collection.
pub async fn run_stations_job(config: &AppConfig, pool: &PgPool) -> Result<JobSummary, JobError> {
    queries::ensure_station_collection(pool).await?;

    let task = paquetobs::stations_task();
    let job_id = task.id.clone();
    let (outcomes, aborted) = fetch_all(config, vec![task], config.observations_token.clone()).await;

    let filter =
        stations::StationFilter::new(config.departments.clone(), config.station_ids.clone());
    for payload in successful_payloads(&outcomes) {
        let raw = tokio::fs::read_to_string(payload).await?;
        match stations::transform_stations(&raw, &filter) {
            Ok(records) => {
                let written = queries::upsert_stations(pool, &records).await?;
                tracing::info!("{} stations upserted", written);
            }
            Err(e) => tracing::warn!("Dropping station payload: {}", e),
        }
    }

    let summary = JobSummary::new(1, &outcomes, aborted);
    log_summary(&job_id, &summary);
    if let Some(err) = abort_error(&outcomes, aborted) {
        return Err(err);
    }
    Ok(summary)
}

/// Run the observation paquet job: refresh retention, load the station
/// inventory for the join, fetch the paquet, transform, and upsert.
pub async fn run_observations_job(
    config: &AppConfig,
    pool: &PgPool,
) -> Result<JobSummary, JobError> {
    let frequency = Frequency::parse(&config.frequency)?;

    queries::ensure_measurement_collection(pool).await?;
    let expired = queries::expire_measurements(pool, config.ttl_seconds).await?;
    if expired > 0 {
        tracing::info!("{} measurements past retention removed", expired);
    }

    let station_index: HashMap<i64, Station> = queries::load_stations(pool)
        .await?
        .into_iter()
        .map(|s| (s.station_id, s))
        .collect();
    tracing::info!("{} stations loaded for the join", station_index.len());

    let task = paquetobs::observations_task(Utc::now(), frequency, config.latency_minutes);
    let job_id = task.id.clone();
    tracing::debug!("Creating task for {}", task.id);

    let (outcomes, aborted) = fetch_all(config, vec![task], config.observations_token.clone()).await;

    for payload in successful_payloads(&outcomes) {
        let raw = tokio::fs::read_to_string(payload).await?;
        match observations::transform_observations(&raw, &station_index) {
            Ok(records) => {
                let written = queries::upsert_observations(pool, &records).await?;
                tracing::info!("{} observations upserted", written);
            }
            Err(e) => tracing::warn!("Dropping observation payload: {}", e),
        }
    }

    let summary = JobSummary::new(1, &outcomes, aborted);
    log_summary(&job_id, &summary);
    if let Some(err) = abort_error(&outcomes, aborted) {
        return Err(err);
    }
    Ok(summary)
}

/// An aborted job surfaces the terminating outcome as the job's error, so
/// the process exits non-zero instead of reporting a partial success.
fn abort_error(outcomes: &[FetchOutcome], aborted: bool) -> Option<JobError> {
    if !aborted {
        return None;
    }
    outcomes
        .iter()
        .rev()
        .find(|o| !o.success)
        .map(|o| JobError::Fetch {
            task_id: o.task_id.clone(),
            status: o.status,
            detail: o
                .detail
                .clone()
                .unwrap_or_else(|| "job aborted".to_string()),
        })
}

/// Dispatch tasks on the pool and drain all outcomes under the fault
/// policy. Returns the outcomes seen and whether the job aborted.
async fn fetch_all(
    config: &AppConfig,
    tasks: Vec<FetchTask>,
    api_key: Option<String>,
) -> (Vec<FetchOutcome>, bool) {
    let executor = FetchExecutor::new(&config.output_dir, config.workers_limit, api_key);
    let control = JobControl::new();
    let rx = executor.dispatch(tasks, control.clone());
    let outcomes = consume_outcomes(rx, &control, Path::new(&config.output_dir)).await;
    let aborted = control.is_aborted();
    (outcomes, aborted)
}

fn successful_payloads(outcomes: &[FetchOutcome]) -> impl Iterator<Item = &std::path::PathBuf> {
    outcomes
        .iter()
        .filter(|o| o.success)
        .filter_map(|o| o.payload.as_ref())
}

/// Single-threaded outcome consumer. Applies the fault policy to every
/// failure: log with nested detail, discard partial output, then continue,
/// pause the dispatcher, or abort the job (abandoning in-flight work).
pub(crate) async fn consume_outcomes(
    mut rx: mpsc::Receiver<FetchOutcome>,
    control: &JobControl,
    output_dir: &Path,
) -> Vec<FetchOutcome> {
    let mut outcomes = Vec::new();
    while let Some(outcome) = rx.recv().await {
        if outcome.success {
            outcomes.push(outcome);
            continue;
        }

        fault::log_failure(&outcome);
        if let Err(e) = fault::discard_partial_output(output_dir, &outcome.task_id) {
            tracing::warn!(
                "Could not remove partial output for {}: {}",
                outcome.task_id,
                e
            );
        }

        match fault::assess(&outcome) {
            FaultAction::Continue => outcomes.push(outcome),
            FaultAction::Pause(delay) => {
                tracing::warn!(
                    "{}: product not available, pausing dispatch for {}s",
                    outcome.task_id,
                    delay.as_secs()
                );
                control.pause_for(delay);
                outcomes.push(outcome);
            }
            FaultAction::Abort => {
                tracing::error!("{}: rate limited by upstream, aborting job", outcome.task_id);
                control.abort();
                outcomes.push(outcome);
                break;
            }
        }
    }
    outcomes
}

fn log_summary(job_id: &str, summary: &JobSummary) {
    if summary.aborted {
        tracing::error!(
            "{}: aborted after {} of {} tasks ({} succeeded, {} failed)",
            job_id,
            summary.succeeded + summary.failed,
            summary.created,
            summary.succeeded,
            summary.failed
        );
    } else {
        tracing::info!(
            "{}: done, {} tasks ({} succeeded, {} failed)",
            job_id,
            summary.created,
            summary.succeeded,
            summary.failed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(task_id: &str) -> FetchOutcome {
        FetchOutcome {
            task_id: task_id.to_string(),
            success: true,
            status: Some(200),
            payload: None,
            detail: None,
        }
    }

    fn failure(task_id: &str, status: Option<u16>) -> FetchOutcome {
        FetchOutcome {
            task_id: task_id.to_string(),
            success: false,
            status,
            payload: None,
            detail: Some("boom".to_string()),
        }
    }

    #[tokio::test]
    async fn test_not_found_removes_output_and_pauses_without_abort() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join("t1");
        std::fs::write(&partial, b"partial").unwrap();

        let (tx, rx) = mpsc::channel(4);
        tx.send(failure("t1", Some(404))).await.unwrap();
        tx.send(success("t2")).await.unwrap();
        drop(tx);

        let control = JobControl::new();
        let outcomes = consume_outcomes(rx, &control, dir.path()).await;

        assert_eq!(outcomes.len(), 2, "processing resumes after the 404");
        assert!(!partial.exists(), "partial output removed");
        assert!(control.is_paused(), "dispatch paused for the back-off");
        assert!(!control.is_aborted(), "404 never aborts the job");
    }

    #[tokio::test]
    async fn test_rate_limit_aborts_and_stops_consuming() {
        let dir = tempfile::tempdir().unwrap();

        let (tx, rx) = mpsc::channel(4);
        tx.send(failure("t1", Some(429))).await.unwrap();
        tx.send(success("t2")).await.unwrap();
        drop(tx);

        let control = JobControl::new();
        let outcomes = consume_outcomes(rx, &control, dir.path()).await;

        assert!(control.is_aborted());
        assert_eq!(outcomes.len(), 1, "nothing processed past the abort");
    }

    #[tokio::test]
    async fn test_ordinary_failure_continues() {
        let dir = tempfile::tempdir().unwrap();

        let (tx, rx) = mpsc::channel(4);
        tx.send(failure("t1", Some(500))).await.unwrap();
        tx.send(failure("t2", None)).await.unwrap();
        tx.send(success("t3")).await.unwrap();
        drop(tx);

        let control = JobControl::new();
        let outcomes = consume_outcomes(rx, &control, dir.path()).await;

        assert_eq!(outcomes.len(), 3);
        assert!(!control.is_aborted());
        assert!(!control.is_paused());
    }

    #[test]
    fn test_abort_error_surfaces_terminating_failure() {
        let outcomes = vec![success("a"), failure("b", Some(429))];
        let err = abort_error(&outcomes, true).expect("aborted jobs produce an error");
        assert!(matches!(
            err,
            JobError::Fetch {
                status: Some(429),
                ..
            }
        ));
        assert!(abort_error(&outcomes, false).is_none());
    }

    #[test]
    fn test_summary_counts() {
        let outcomes = vec![success("a"), failure("b", Some(500)), success("c")];
        let summary = JobSummary::new(5, &outcomes, false);
        assert_eq!(summary.created, 5);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.aborted);
    }
}
