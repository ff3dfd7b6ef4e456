/// Error taxonomy for ingestion jobs.
///
/// `Generation` is fatal before any fetch is attempted. Individual fetch
/// failures are handled by the fault policy in `services::fault` and only
/// become a `Fetch` error when they terminate the job (rate-limit abort).
/// `Transform` covers an unparsable payload; individual bad records inside
/// a parsable payload are dropped and logged, not surfaced here.
/// `Database` and `Io` abort the job: silent data loss is worse than
/// stopping.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Invalid job grid: {0}")]
    Generation(String),

    #[error("Fetch failed for {task_id}: {detail}")]
    Fetch {
        task_id: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown job '{0}'")]
    UnknownJob(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_message() {
        let err = JobError::Fetch {
            task_id: "2024-01-01T00:00:00Z000H012HHP1.grib2".to_string(),
            status: Some(429),
            detail: "rate limited".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Fetch failed for 2024-01-01T00:00:00Z000H012HHP1.grib2: rate limited"
        );
    }

    #[test]
    fn test_generation_error_message() {
        let err = JobError::Generation("bad run time '25:99'".to_string());
        assert_eq!(err.to_string(), "Invalid job grid: bad run time '25:99'");
    }
}
