//! Task generation for model download jobs.
//!
//! Expands a parameter grid (run times × packages × forecast windows) into
//! an ordered sequence of fetch tasks. Pure: given the same grid and clock
//! input it produces the same tasks in the same order, which keeps task ids
//! and logs reproducible across retries of a job.

use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::errors::JobError;

/// Object-storage base for the data.gouv mirror of the PNT products.
const DATA_GOUV_BASE: &str = "https://object.data.gouv.fr/meteofrance-pnt/pnt";

/// Which remote source a model job downloads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Météo-France product API: templated query parameters + API key.
    MeteoFrance,
    /// data.gouv object storage: fully composed URL, no API key.
    DataGouv,
}

impl DataSource {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "data-gouv" => DataSource::DataGouv,
            _ => DataSource::MeteoFrance,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::MeteoFrance => "meteofrance",
            DataSource::DataGouv => "data-gouv",
        }
    }
}

/// Parameter grid for one model job.
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// Model cycles, as time-of-day offsets ("00:00:00", "06:00:00", ...).
    pub run_times: Vec<String>,
    /// Product packages (HP1, SP1, ...).
    pub packages: Vec<String>,
    /// Forecast window codes (000H012H, ...). Enumerated as declared,
    /// including any repeated entry.
    pub forecast_times: Vec<String>,
    /// Payload format, also the task-id suffix ("grib2").
    pub format: String,
    /// Grid resolution; the string differs between sources ("0.25" / "025").
    pub resolution: String,
    /// Product family in mirror paths ("arpege").
    pub family: String,
    /// Product API endpoint (used by the MeteoFrance source).
    pub product_url: String,
    pub source: DataSource,
}

/// A concrete request, rendered by the fetch executor. Replaces the string
/// templating of the upstream job definitions with typed variants.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestSpec {
    /// Product API query: endpoint plus grid parameters.
    Api {
        url: String,
        params: Vec<(&'static str, String)>,
    },
    /// Fully composed object-storage URL.
    Direct { url: String },
}

/// One download task from the grid.
#[derive(Debug, Clone)]
pub struct FetchTask {
    /// `{referencetime}{window}{package}.{format}`; also the payload path
    /// under the output directory.
    pub id: String,
    pub reference_time: String,
    pub package: String,
    pub forecast_window: String,
    pub request: RequestSpec,
}

impl FetchTask {
    /// A one-off task outside any grid (the paquet jobs): no grid
    /// coordinates, fully composed URL.
    pub fn single(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reference_time: String::new(),
            package: String::new(),
            forecast_window: String::new(),
            request: RequestSpec::Direct { url: url.into() },
        }
    }
}

/// Expand the grid into tasks, run-time-major, package-next,
/// forecast-window-minor.
///
/// `now` anchors the reference times: each run time is an offset from the
/// start of `now`'s UTC day. Passing the clock in keeps this a pure
/// function.
pub fn generate_tasks(grid: &GridConfig, now: DateTime<Utc>) -> Result<Vec<FetchTask>, JobError> {
    let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();

    let mut tasks = Vec::with_capacity(
        grid.run_times.len() * grid.packages.len() * grid.forecast_times.len(),
    );

    for run_time in &grid.run_times {
        let reference_time = format_reference_time(day_start + parse_run_time(run_time)?);
        for package in &grid.packages {
            for window in &grid.forecast_times {
                tasks.push(FetchTask {
                    id: format!("{}{}{}.{}", reference_time, window, package, grid.format),
                    reference_time: reference_time.clone(),
                    package: package.clone(),
                    forecast_window: window.clone(),
                    request: build_request(grid, &reference_time, package, window),
                });
            }
        }
    }

    Ok(tasks)
}

/// Parse a model cycle offset ("06:00:00") into a duration from midnight.
fn parse_run_time(raw: &str) -> Result<Duration, JobError> {
    let time = NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .map_err(|e| JobError::Generation(format!("bad run time '{}': {}", raw, e)))?;
    Ok(time.signed_duration_since(NaiveTime::MIN))
}

fn format_reference_time(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn build_request(
    grid: &GridConfig,
    reference_time: &str,
    package: &str,
    window: &str,
) -> RequestSpec {
    match grid.source {
        DataSource::MeteoFrance => RequestSpec::Api {
            url: grid.product_url.clone(),
            params: vec![
                ("referencetime", reference_time.to_string()),
                ("time", window.to_string()),
                ("package", package.to_string()),
                ("format", grid.format.clone()),
                ("grid", grid.resolution.clone()),
            ],
        },
        DataSource::DataGouv => RequestSpec::Direct {
            url: format!(
                "{}/{}/{}/{}/{}/{}__{}__{}__{}__{}.{}",
                DATA_GOUV_BASE,
                reference_time,
                grid.family,
                grid.resolution,
                package,
                grid.family,
                grid.resolution,
                package,
                window,
                reference_time,
                grid.format,
            ),
        },
    }
}
