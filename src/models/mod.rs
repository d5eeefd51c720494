pub mod config;
pub mod report;

pub use config::{AppConfig, CalibrationConfig, ColorimetryConfig, MatchingConfig, DEFAULT_CONFIG_FILE};
pub use report::{CalibrationModel, CalibrationReport, FormulationReport, MatchReport};
