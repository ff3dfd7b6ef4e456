// Météo-France ingestion jobs v0.1
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod errors;
mod jobs;
mod services;

use config::AppConfig;
use errors::JobError;
use services::generator::DataSource;
use services::runner;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 1;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meteofrance_ingest=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    let job_name = match std::env::args().nth(1) {
        Some(name) => name,
        None => {
            tracing::error!(
                "No job given. Known jobs: arpege-world, arpege-europe, \
                 paquetobs-stations, paquetobs-observations"
            );
            std::process::exit(2);
        }
    };

    if let Err(e) = run_job(&job_name, &config).await {
        tracing::error!("Job {} failed: {}", job_name, e);
        std::process::exit(1);
    }
}

async fn run_job(name: &str, config: &AppConfig) -> Result<(), JobError> {
    match name {
        "arpege-world" | "arpege-europe" => {
            let source = DataSource::parse(&config.data_source);
            let job = match name {
                "arpege-world" => jobs::arpege::arpege_world(source),
                _ => jobs::arpege::arpege_europe(source),
            };
            runner::run_model_job(config, &job).await?;
            Ok(())
        }
        "paquetobs-stations" | "paquetobs-observations" => {
            let pool = PgPoolOptions::new()
                .max_connections(DB_POOL_MAX_CONNECTIONS)
                .min_connections(DB_POOL_MIN_CONNECTIONS)
                .connect(&config.database_url)
                .await?;

            let result = match name {
                "paquetobs-stations" => runner::run_stations_job(config, &pool).await,
                _ => runner::run_observations_job(config, &pool).await,
            };

            // Released on every exit path, including job failure.
            pool.close().await;
            result.map(|_| ())
        }
        other => Err(JobError::UnknownJob(other.to_string())),
    }
}
