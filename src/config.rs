/// Ingestion configuration, parsed from environment variables.
///
/// One struct covers every job; jobs read only the fields they use
/// (the ARPEGE jobs never touch the database URL or the station filters,
/// the paquet jobs never touch `data_source`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// API key for the ARPEGE product endpoints.
    pub arpege_token: Option<String>,
    /// API key for the ground-station paquet endpoints.
    pub observations_token: Option<String>,
    /// Upper bound on concurrent fetches. The upstream API rate-limits
    /// aggressively, so this stays small.
    pub workers_limit: usize,
    /// Retention window for observation records, in seconds.
    pub ttl_seconds: i64,
    /// Paquet sampling frequency: "horaire" or "infrahoraire-6m".
    pub frequency: String,
    /// Publication latency of the paquet, in minutes. The request date is
    /// computed this far in the past.
    pub latency_minutes: i64,
    /// Department codes to keep when ingesting stations (empty = keep all).
    pub departments: Vec<String>,
    /// Explicit station ids to keep when ingesting stations (empty = none).
    pub station_ids: Vec<i64>,
    /// "meteofrance" (product API) or "data-gouv" (object-storage mirror).
    pub data_source: String,
    /// Directory receiving raw fetched payloads.
    pub output_dir: String,
}

/// Default retention for observation records: 7 days.
const DEFAULT_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Default fetch concurrency.
const DEFAULT_WORKERS_LIMIT: usize = 2;

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://127.0.0.1:5432/meteo".to_string()),
            arpege_token: std::env::var("ARPEGE_TOKEN").ok(),
            observations_token: std::env::var("OBSERVATIONS_PAQUET_TOKEN").ok(),
            workers_limit: std::env::var("WORKERS_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_WORKERS_LIMIT),
            ttl_seconds: std::env::var("TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TTL_SECONDS),
            frequency: std::env::var("FREQUENCY").unwrap_or_else(|_| "horaire".to_string()),
            latency_minutes: std::env::var("LATENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            departments: parse_list(std::env::var("DEPARTMENTS").ok()),
            station_ids: parse_list(std::env::var("STATIONS").ok())
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect(),
            data_source: std::env::var("DATA_SOURCE").unwrap_or_else(|_| "meteofrance".to_string()),
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "./output".to_string()),
        }
    }
}

/// Split a comma-separated environment value into trimmed, non-empty items.
fn parse_list(raw: Option<String>) -> Vec<String> {
    raw.map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_none() {
        assert!(parse_list(None).is_empty());
    }

    #[test]
    fn test_parse_list_values() {
        let list = parse_list(Some("75, 69,13".to_string()));
        assert_eq!(list, vec!["75", "69", "13"]);
    }

    #[test]
    fn test_parse_list_skips_empty_items() {
        let list = parse_list(Some("75,,69,".to_string()));
        assert_eq!(list, vec!["75", "69"]);
    }
}
