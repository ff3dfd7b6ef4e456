//! Bounded-concurrency fetch executor.
//!
//! Dispatches the task sequence with at most `workers` fetches in flight
//! (the upstream API rate-limits per key, so this stays small). Each task
//! is fetched exactly once with a single GET; the raw body is stored under
//! `{output_dir}/{task_id}` and exactly one `FetchOutcome` is emitted on
//! the returned channel, in completion order.
//!
//! The dispatcher observes a `JobControl` between tasks: a pending pause
//! delays the next dispatch, an abort stops dispatching entirely. A slow or
//! failing task never blocks its siblings beyond the worker limit.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::header::ACCEPT;
use tokio::sync::{mpsc, Semaphore};

use crate::services::fault::JobControl;
use crate::services::generator::{FetchTask, RequestSpec};

/// Result of one task's fetch. `status` is `None` when the request never
/// reached the HTTP layer (connect error, timeout).
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub task_id: String,
    pub success: bool,
    pub status: Option<u16>,
    /// Where the raw body was stored, on success.
    pub payload: Option<PathBuf>,
    /// Error text (response body or transport error), on failure.
    pub detail: Option<String>,
}

impl FetchOutcome {
    fn failure(task_id: String, status: Option<u16>, detail: String) -> Self {
        Self {
            task_id,
            success: false,
            status,
            payload: None,
            detail: Some(detail),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchExecutor {
    client: reqwest::Client,
    output_dir: PathBuf,
    workers: usize,
    api_key: Option<String>,
}

impl FetchExecutor {
    pub fn new(output_dir: impl Into<PathBuf>, workers: usize, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            output_dir: output_dir.into(),
            workers: workers.max(1),
            api_key,
        }
    }

    /// Start dispatching `tasks` and return the outcome channel.
    ///
    /// The channel yields one outcome per dispatched task and closes when
    /// dispatch is done (all tasks, or the point of abort). Dropping the
    /// receiver abandons in-flight work.
    pub fn dispatch(&self, tasks: Vec<FetchTask>, control: JobControl) -> mpsc::Receiver<FetchOutcome> {
        let (tx, rx) = mpsc::channel(self.workers);
        let executor = self.clone();

        tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(executor.workers));
            let mut workers = Vec::new();
            for task in tasks {
                control.wait_until_ready().await;
                if control.is_aborted() {
                    tracing::warn!("Job aborted, stopping dispatch before {}", task.id);
                    break;
                }
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let executor = executor.clone();
                let tx = tx.clone();
                workers.push(tokio::spawn(async move {
                    let outcome = executor.fetch_one(&task).await;
                    // Receiver gone = job already terminated; nothing to do.
                    let _ = tx.send(outcome).await;
                    drop(permit);
                }));
            }
            futures::future::join_all(workers).await;
        });

        rx
    }

    /// Render the task's request and perform the GET, storing the body on
    /// success.
    async fn fetch_one(&self, task: &FetchTask) -> FetchOutcome {
        let mut request = match &task.request {
            RequestSpec::Api { url, params } => self.client.get(url).query(params),
            RequestSpec::Direct { url } => self.client.get(url),
        };
        request = request.header(ACCEPT, "*/*");
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return FetchOutcome::failure(
                    task.id.clone(),
                    e.status().map(|s| s.as_u16()),
                    e.to_string(),
                );
            }
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return FetchOutcome::failure(task.id.clone(), Some(status), body);
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                return FetchOutcome::failure(task.id.clone(), Some(status), e.to_string());
            }
        };

        match store_payload(&self.output_dir, &task.id, &bytes) {
            Ok(path) => FetchOutcome {
                task_id: task.id.clone(),
                success: true,
                status: Some(status),
                payload: Some(path),
                detail: None,
            },
            Err(e) => FetchOutcome::failure(
                task.id.clone(),
                Some(status),
                format!("failed to store payload: {}", e),
            ),
        }
    }
}

/// Write a payload under `{output_dir}/{task_id}`, creating intermediate
/// directories (paquet task ids contain a `/`).
fn store_payload(output_dir: &Path, task_id: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let path = output_dir.join(task_id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, bytes)?;
    Ok(path)
}
