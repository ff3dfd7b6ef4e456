pub mod arpege;
pub mod paquetobs;

use crate::services::generator::GridConfig;

/// A declared model download job: a job id plus the parameter grid it
/// expands into tasks.
#[derive(Debug, Clone)]
pub struct ModelJob {
    pub id: String,
    pub grid: GridConfig,
}
