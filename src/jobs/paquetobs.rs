//! Ground-station paquet job declarations.
//!
//! Two single-task jobs against the DPPaquetObs service: the station
//! inventory (CSV) and the observation paquet (GeoJSON). The observation
//! request is anchored to a paquet publication slot: current time minus the
//! configured latency, floored to the sampling frequency's boundary.

use chrono::{DateTime, Duration, Timelike, Utc};

use crate::errors::JobError;
use crate::services::generator::FetchTask;

/// DPPaquetObs service base.
const PAQUET_BASE: &str = "https://public-api.meteofrance.fr/public/DPPaquetObs/v1";

/// Paquet sampling frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// One paquet per hour.
    Horaire,
    /// One paquet per 6-minute slot.
    InfraHoraire6m,
}

impl Frequency {
    /// An unrecognized frequency is a configuration error and fatal before
    /// any fetch.
    pub fn parse(raw: &str) -> Result<Self, JobError> {
        match raw {
            "horaire" => Ok(Frequency::Horaire),
            "infrahoraire-6m" => Ok(Frequency::InfraHoraire6m),
            other => Err(JobError::Generation(format!(
                "Undefined FREQUENCY '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Horaire => "horaire",
            Frequency::InfraHoraire6m => "infrahoraire-6m",
        }
    }
}

/// Compute the paquet slot to request: `now - latency`, floored to the
/// frequency boundary.
pub fn compute_paquet_date(
    now: DateTime<Utc>,
    frequency: Frequency,
    latency_minutes: i64,
) -> DateTime<Utc> {
    let shifted = now - Duration::minutes(latency_minutes);
    let truncated = match frequency {
        Frequency::Horaire => shifted.with_minute(0),
        Frequency::InfraHoraire6m => shifted.with_minute(shifted.minute() / 6 * 6),
    };
    truncated
        .and_then(|dt| dt.with_second(0))
        .and_then(|dt| dt.with_nanosecond(0))
        .unwrap_or(shifted)
}

/// The observation paquet task for the slot derived from `now`.
pub fn observations_task(
    now: DateTime<Utc>,
    frequency: Frequency,
    latency_minutes: i64,
) -> FetchTask {
    let date = compute_paquet_date(now, frequency, latency_minutes)
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string();
    FetchTask::single(
        format!("paquetobs/observations-{}", date),
        format!(
            "{}/paquet/stations/{}?date={}&format=geojson",
            PAQUET_BASE,
            frequency.as_str(),
            date
        ),
    )
}

/// The station inventory task.
pub fn stations_task() -> FetchTask {
    FetchTask::single(
        "paquetobs/stations",
        format!("{}/liste-stations", PAQUET_BASE),
    )
}
