//! Station inventory transform.
//!
//! Parses the semicolon-delimited `liste-stations` export, maps source
//! columns onto the stored station shape, coerces the station identifier to
//! a number (joins against observations are indexed integer lookups), and
//! converts the coordinate columns into a geo point. Optional filtering by
//! department code and/or an explicit station-id allow-list; when either
//! list is non-empty the kept set is the union of both matches.

use serde::Deserialize;

use crate::db::models::{GeoPoint, Station};
use crate::errors::JobError;

/// A row of the source CSV. Column names are the upstream export's.
#[derive(Debug, Deserialize)]
struct StationRow {
    #[serde(rename = "Id_station")]
    id_station: String,
    #[serde(rename = "Id_omm")]
    id_omm: Option<String>,
    #[serde(rename = "Nom_usuel")]
    nom_usuel: String,
    #[serde(rename = "Latitude")]
    latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    longitude: Option<f64>,
    #[serde(rename = "Altitude")]
    altitude: Option<f64>,
    #[serde(rename = "Date_ouverture")]
    date_ouverture: Option<String>,
    #[serde(rename = "Pack")]
    pack: Option<String>,
}

/// Which stations to keep. Empty filter keeps everything; otherwise a
/// station passes if its department code OR its id is listed.
#[derive(Debug, Clone, Default)]
pub struct StationFilter {
    departments: Vec<String>,
    station_ids: Vec<i64>,
}

impl StationFilter {
    /// `"00"` is not a valid department code and is discarded here; other
    /// codes are normalized to two digits.
    pub fn new(departments: Vec<String>, station_ids: Vec<i64>) -> Self {
        Self {
            departments: departments
                .into_iter()
                .map(|d| format!("{:0>2}", d.trim()))
                .filter(|d| d != "00")
                .collect(),
            station_ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.departments.is_empty() && self.station_ids.is_empty()
    }

    fn keeps(&self, raw_id: &str, station_id: i64) -> bool {
        if self.is_empty() {
            return true;
        }
        self.departments.contains(&department_code(raw_id)) || self.station_ids.contains(&station_id)
    }
}

/// Department code of a station identifier: its leading two characters,
/// left-padded with `0`.
pub fn department_code(raw_id: &str) -> String {
    let prefix: String = raw_id.trim().chars().take(2).collect();
    format!("{:0>2}", prefix)
}

/// Transform the raw CSV export into stations ready for upsert.
///
/// Fails only when the payload has no parsable header; rows with a missing
/// or non-numeric identifier or without coordinates are dropped with a
/// warning.
pub fn transform_stations(raw: &str, filter: &StationFilter) -> Result<Vec<Station>, JobError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(raw.as_bytes());

    let mut stations = Vec::new();
    let mut total = 0usize;

    for row in reader.deserialize::<StationRow>() {
        total += 1;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("Dropping unreadable station row: {}", e);
                continue;
            }
        };

        let Ok(station_id) = row.id_station.trim().parse::<i64>() else {
            tracing::warn!("Dropping station with non-numeric id '{}'", row.id_station);
            continue;
        };

        if !filter.keeps(&row.id_station, station_id) {
            continue;
        }

        let (Some(longitude), Some(latitude)) = (row.longitude, row.latitude) else {
            tracing::warn!("Dropping station {} without coordinates", station_id);
            continue;
        };

        stations.push(Station {
            station_id,
            omm_id: row.id_omm.filter(|v| !v.is_empty()),
            name: row.nom_usuel,
            opening_date: row.date_ouverture.filter(|v| !v.is_empty()),
            pack: row.pack.filter(|v| !v.is_empty()),
            geometry: GeoPoint {
                longitude,
                latitude,
                altitude: row.altitude,
            },
        });
    }

    tracing::info!("{} stations found, {} kept", total, stations.len());

    Ok(stations)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Id_station;Id_omm;Nom_usuel;Latitude;Longitude;Altitude;Date_ouverture;Pack";

    fn csv_of(rows: &[&str]) -> String {
        let mut out = String::from(HEADER);
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    #[test]
    fn test_department_filter() {
        let raw = csv_of(&[
            "75001;07156;PARIS;48.82;2.33;75;1920-01-01;RADOME",
            "69002;07480;LYON;45.72;4.94;198;1921-01-01;RADOME",
        ]);
        let filter = StationFilter::new(vec!["75".to_string()], vec![]);
        let stations = transform_stations(&raw, &filter).unwrap();
        assert_eq!(stations.len(), 1);
        // Stored as a number, not a string
        assert_eq!(stations[0].station_id, 75001i64);
    }

    #[test]
    fn test_filters_union_not_intersection() {
        let raw = csv_of(&[
            "75001;07156;PARIS;48.82;2.33;75;1920-01-01;RADOME",
            "69002;07480;LYON;45.72;4.94;198;1921-01-01;RADOME",
            "13001;07650;MARSEILLE;43.44;5.22;36;1922-01-01;RADOME",
        ]);
        let filter = StationFilter::new(vec!["75".to_string()], vec![69002]);
        let stations = transform_stations(&raw, &filter).unwrap();
        let ids: Vec<i64> = stations.iter().map(|s| s.station_id).collect();
        assert_eq!(ids, vec![75001, 69002]);
    }

    #[test]
    fn test_empty_filter_keeps_all() {
        let raw = csv_of(&[
            "75001;07156;PARIS;48.82;2.33;75;1920-01-01;RADOME",
            "69002;07480;LYON;45.72;4.94;198;1921-01-01;RADOME",
        ]);
        let stations = transform_stations(&raw, &StationFilter::default()).unwrap();
        assert_eq!(stations.len(), 2);
    }

    #[test]
    fn test_double_zero_is_not_a_filter() {
        // "00" entries are discarded; a list of only "00" means no filter.
        let filter = StationFilter::new(vec!["00".to_string()], vec![]);
        assert!(filter.is_empty());
    }

    #[test]
    fn test_department_code_padding() {
        assert_eq!(department_code("75001"), "75");
        assert_eq!(department_code("01014002"), "01");
        assert_eq!(department_code("7"), "07");
    }

    #[test]
    fn test_column_mapping_and_geometry() {
        let raw = csv_of(&["75001;07156;PARIS;48.82;2.33;75;1920-01-01;RADOME"]);
        let stations = transform_stations(&raw, &StationFilter::default()).unwrap();
        let s = &stations[0];
        assert_eq!(s.omm_id.as_deref(), Some("07156"));
        assert_eq!(s.name, "PARIS");
        assert_eq!(s.opening_date.as_deref(), Some("1920-01-01"));
        assert_eq!(s.pack.as_deref(), Some("RADOME"));
        assert_eq!(
            s.geometry,
            GeoPoint {
                longitude: 2.33,
                latitude: 48.82,
                altitude: Some(75.0),
            }
        );
    }

    #[test]
    fn test_non_numeric_id_dropped() {
        let raw = csv_of(&[
            "not-an-id;07156;BROKEN;48.82;2.33;75;;",
            "69002;07480;LYON;45.72;4.94;198;1921-01-01;RADOME",
        ]);
        let stations = transform_stations(&raw, &StationFilter::default()).unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].station_id, 69002);
    }

    #[test]
    fn test_missing_coordinates_dropped() {
        let raw = csv_of(&["75001;07156;PARIS;;;75;1920-01-01;RADOME"]);
        let stations = transform_stations(&raw, &StationFilter::default()).unwrap();
        assert!(stations.is_empty());
    }

    #[test]
    fn test_empty_optionals_become_none() {
        let raw = csv_of(&["75001;;PARIS;48.82;2.33;;;"]);
        let stations = transform_stations(&raw, &StationFilter::default()).unwrap();
        let s = &stations[0];
        assert_eq!(s.omm_id, None);
        assert_eq!(s.opening_date, None);
        assert_eq!(s.pack, None);
        assert_eq!(s.geometry.altitude, None);
    }
}
