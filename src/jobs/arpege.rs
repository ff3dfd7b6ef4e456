//! ARPEGE model download job declarations.
//!
//! One function per coverage, near-duplicates of each other: same run
//! times and packages, different grid resolution and forecast-window set.
//! The grids are declared verbatim from the upstream product catalogue,
//! including the repeated `073H084H` entry in the world coverage, which is
//! kept as declared.

use super::ModelJob;
use crate::services::generator::{DataSource, GridConfig};

/// Product API endpoint for ARPEGE packages.
const PRODUCT_URL: &str = "https://public-api.meteofrance.fr/previnum/DPPaquetARPEGE/v1/productARP";

const RUN_TIMES: [&str; 4] = ["00:00:00", "06:00:00", "12:00:00", "18:00:00"];

const PACKAGES: [&str; 8] = ["HP1", "HP2", "IP1", "IP2", "IP3", "IP4", "SP1", "SP2"];

/// ARPEGE world coverage, 0.25° grid.
pub fn arpege_world(source: DataSource) -> ModelJob {
    ModelJob {
        id: format!("arpege-world-{}", source.as_str()),
        grid: GridConfig {
            run_times: to_strings(&RUN_TIMES),
            packages: to_strings(&PACKAGES),
            forecast_times: to_strings(&[
                "000H012H", "013H024H", "025H036H", "037H048H", "049H060H", "061H072H",
                "073H084H", "073H084H", "085H096H", "097H102H",
            ]),
            format: "grib2".to_string(),
            resolution: match source {
                DataSource::MeteoFrance => "0.25".to_string(),
                DataSource::DataGouv => "025".to_string(),
            },
            family: "arpege".to_string(),
            product_url: PRODUCT_URL.to_string(),
            source,
        },
    }
}

/// ARPEGE Europe coverage, 0.1° grid.
pub fn arpege_europe(source: DataSource) -> ModelJob {
    ModelJob {
        id: format!("arpege-europe-{}", source.as_str()),
        grid: GridConfig {
            run_times: to_strings(&RUN_TIMES),
            packages: to_strings(&PACKAGES),
            forecast_times: to_strings(&[
                "000H012H", "013H024H", "025H036H", "037H048H", "049H060H", "061H072H",
                "073H084H", "085H096H", "097H102H", "103H108H", "109H114H",
            ]),
            format: "grib2".to_string(),
            resolution: match source {
                DataSource::MeteoFrance => "0.1".to_string(),
                DataSource::DataGouv => "01".to_string(),
            },
            family: "arpege".to_string(),
            product_url: PRODUCT_URL.to_string(),
            source,
        },
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
