//! Observation paquet transform.
//!
//! Parses the GeoJSON observation paquet, joins each record against the
//! station inventory by numeric station id, and derives the stored
//! measurement fields. Records without a matching station are dropped
//! silently (the paquet carries stations outside the ingested inventory);
//! records that fail to parse are dropped with a warning. Source nulls stay
//! `None` end to end.
//!
//! Field reference:
//! https://donneespubliques.meteofrance.fr/?fond=produit&id_produit=93&id_rubrique=32

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::db::models::{GeoPoint, Observation, Station};
use crate::errors::JobError;

/// Offset between Kelvin and Celsius used by the source products.
const KELVIN_OFFSET: f64 = 273.0;

#[derive(Debug, Deserialize)]
struct Paquet {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// `[longitude, latitude]` or `[longitude, latitude, altitude]`.
    #[serde(default)]
    coordinates: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct Properties {
    /// Station identifier; the paquet codes it as a string.
    geo_id_insee: Option<serde_json::Value>,
    reference_time: Option<String>,
    /// Air temperature, Kelvin.
    #[serde(default)]
    t: Option<f64>,
    /// Relative humidity, percent.
    #[serde(default)]
    u: Option<f64>,
    /// Wind direction, degrees.
    #[serde(default)]
    dd: Option<f64>,
    /// Wind speed, m/s.
    #[serde(default)]
    ff: Option<f64>,
    /// Precipitation over the sampling period, mm.
    #[serde(default)]
    rr_per: Option<f64>,
}

/// Transform a raw paquet payload into measurements ready for upsert.
///
/// Fails only when the payload itself is unparsable; per-record problems
/// drop the record and keep going.
pub fn transform_observations(
    raw: &str,
    stations: &HashMap<i64, Station>,
) -> Result<Vec<Observation>, JobError> {
    let paquet: Paquet = serde_json::from_str(raw)
        .map_err(|e| JobError::Transform(format!("unparsable observation paquet: {}", e)))?;

    let total = paquet.features.len();
    let mut observations = Vec::with_capacity(total);
    let mut unmatched = 0usize;

    for feature in paquet.features {
        match transform_record(feature, stations) {
            RecordResult::Ok(obs) => observations.push(obs),
            RecordResult::NoStation => unmatched += 1,
            RecordResult::Dropped => {}
        }
    }

    tracing::info!(
        "{} observations found, {} matched a station",
        total,
        observations.len()
    );
    if unmatched > 0 {
        tracing::debug!("{} observations without a known station", unmatched);
    }

    Ok(observations)
}

enum RecordResult {
    Ok(Observation),
    /// No station in the inventory for this record; not an error.
    NoStation,
    /// Unusable record, already logged.
    Dropped,
}

fn transform_record(feature: Feature, stations: &HashMap<i64, Station>) -> RecordResult {
    let Some(station_id) = feature
        .properties
        .geo_id_insee
        .as_ref()
        .and_then(coerce_station_id)
    else {
        tracing::warn!("Dropping observation without a station identifier");
        return RecordResult::Dropped;
    };

    let Some(station) = stations.get(&station_id) else {
        return RecordResult::NoStation;
    };

    let Some(time) = feature
        .properties
        .reference_time
        .as_deref()
        .and_then(parse_reference_time)
    else {
        tracing::warn!(
            "Dropping observation for station {} without a reference time",
            station_id
        );
        return RecordResult::Dropped;
    };

    let Some(geometry) = feature.geometry.as_ref().and_then(parse_geometry) else {
        tracing::warn!(
            "Dropping observation for station {} without a geometry",
            station_id
        );
        return RecordResult::Dropped;
    };

    RecordResult::Ok(Observation {
        observation_id: Observation::derive_id(station.station_id, &time),
        station_id: station.station_id,
        name: station.name.clone(),
        time,
        temperature: feature.properties.t.map(|k| k - KELVIN_OFFSET),
        humidity: feature.properties.u,
        wind_direction: feature.properties.dd,
        wind_speed: feature.properties.ff,
        precipitation: feature.properties.rr_per,
        geometry,
    })
}

/// Coerce the source station identifier (string or number) to the numeric
/// key used by the inventory.
fn coerce_station_id(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_reference_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_geometry(geometry: &Geometry) -> Option<GeoPoint> {
    match geometry.coordinates.as_slice() {
        [lon, lat] => Some(GeoPoint {
            longitude: *lon,
            latitude: *lat,
            altitude: None,
        }),
        [lon, lat, alt, ..] => Some(GeoPoint {
            longitude: *lon,
            latitude: *lat,
            altitude: Some(*alt),
        }),
        _ => None,
    }
}
