use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A WGS84 point. Altitude is metres above sea level where the source
/// provides it.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: Option<f64>,
}

/// A ground station from the Météo-France inventory.
///
/// `station_id` is the numeric form of the source identifier (coerced at
/// transform time so joins against observations are indexed integer
/// lookups, not string comparisons).
#[derive(Debug, Clone, FromRow)]
pub struct Station {
    pub station_id: i64,
    pub omm_id: Option<String>,
    pub name: String,
    pub opening_date: Option<String>,
    pub pack: Option<String>,
    #[sqlx(flatten)]
    pub geometry: GeoPoint,
}

/// One transformed measurement from the observation paquet.
///
/// `observation_id` is re-derivable as `{station_id}-{time}` and is the
/// upsert key: re-ingesting the same paquet overwrites rather than
/// duplicates. Measurement fields are `None` when the source reported null;
/// they are stored as SQL NULL, never as a sentinel value.
#[derive(Debug, Clone, FromRow)]
pub struct Observation {
    pub observation_id: String,
    pub station_id: i64,
    pub name: String,
    pub time: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_direction: Option<f64>,
    pub wind_speed: Option<f64>,
    pub precipitation: Option<f64>,
    #[sqlx(flatten)]
    pub geometry: GeoPoint,
}

impl Observation {
    /// Natural key: `{station_id}-{reference time}`.
    pub fn derive_id(station_id: i64, time: &DateTime<Utc>) -> String {
        format!("{}-{}", station_id, time.format("%Y-%m-%dT%H:%M:%SZ"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_id() {
        let time = "2024-01-01T06:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(
            Observation::derive_id(75114001, &time),
            "75114001-2024-01-01T06:00:00Z"
        );
    }
}
