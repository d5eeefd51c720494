use std::collections::BTreeMap;
use std::path::Path;

use kubelka::colorimetry::{Illuminant, Observer, SpectralColorimeter};
use kubelka::intermediate::DerivationMethod;
use kubelka::optimize::{default_bounds, Bounds, MinimizerOptions};
use kubelka::regression::{RegressionEngine, SampleWeights};
use kubelka::Pigment;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "pigmix.yaml";

/// Application configuration loaded from pigmix.yaml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub calibration: CalibrationConfig,

    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub colorimetry: ColorimetryConfig,
}

/// Settings for deriving and fitting pigment models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Derivations to run; every one is fitted and the best model per
    /// pigment and quantity wins
    #[serde(default = "default_methods")]
    pub methods: Vec<DerivationMethod>,

    /// Highest polynomial degree tried (clipped to 1..=10)
    #[serde(default = "default_poly_degree")]
    pub poly_degree: i64,

    /// Concentration ranks to leave out; negative counts from the top
    #[serde(default)]
    pub exclude_concentrations: Vec<i64>,

    #[serde(default)]
    pub sample_weights: Vec<f64>,
}

fn default_methods() -> Vec<DerivationMethod> {
    vec![DerivationMethod::PaperA]
}

fn default_poly_degree() -> i64 {
    5
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            methods: default_methods(),
            poly_degree: default_poly_degree(),
            exclude_concentrations: Vec::new(),
            sample_weights: Vec::new(),
        }
    }
}

/// Settings for the concentration search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Per-pigment concentration range; pigments left out keep their defaults
    #[serde(default = "default_bounds")]
    pub bounds: BTreeMap<Pigment, Bounds>,

    #[serde(default = "default_total_ceiling")]
    pub total_ceiling: f64,

    #[serde(default = "default_max_iter")]
    pub max_iter: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Match targets on all cores
    #[serde(default)]
    pub parallel: bool,
}

fn default_total_ceiling() -> f64 {
    kubelka::optimize::DEFAULT_TOTAL_CEILING
}

fn default_max_iter() -> usize {
    kubelka::optimize::DEFAULT_MAX_ITER
}

fn default_max_retries() -> usize {
    kubelka::optimize::DEFAULT_MAX_RETRIES
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            bounds: default_bounds(),
            total_ceiling: default_total_ceiling(),
            max_iter: default_max_iter(),
            max_retries: default_max_retries(),
            parallel: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorimetryConfig {
    #[serde(default)]
    pub observer: Observer,

    #[serde(default)]
    pub illuminant: Illuminant,
}

impl AppConfig {
    /// Parse a configuration file.
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> AppResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> AppResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Load configuration, falling back to defaults when the file is
    /// missing or invalid
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => {
                tracing::info!(
                    path = %path.display(),
                    methods = config.calibration.methods.len(),
                    "Loaded configuration"
                );
                config
            }
            Err(e) => {
                tracing::warn!(%e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    pub fn regression_engine(&self) -> AppResult<RegressionEngine> {
        let weights = SampleWeights::new(self.calibration.sample_weights.clone())?;
        Ok(RegressionEngine::new(self.calibration.poly_degree, weights))
    }

    /// Optimizer options; configured bounds override the defaults pigment
    /// by pigment.
    pub fn minimizer_options(&self) -> MinimizerOptions {
        let matching = &self.matching;
        matching
            .bounds
            .iter()
            .fold(MinimizerOptions::default(), |options, (pigment, bounds)| {
                options.bounds(*pigment, *bounds)
            })
            .total_ceiling(matching.total_ceiling)
            .max_iter(matching.max_iter)
            .max_retries(matching.max_retries)
            .parallel(matching.parallel)
    }

    pub fn colorimeter(&self) -> SpectralColorimeter {
        SpectralColorimeter::new(self.colorimetry.observer, self.colorimetry.illuminant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.calibration.methods, vec![DerivationMethod::PaperA]);
        assert_eq!(config.calibration.poly_degree, 5);
        assert_eq!(config.matching.total_ceiling, 0.1);
        assert_eq!(config.matching.max_retries, 10);
        assert_eq!(config.matching.bounds.len(), 4);
        assert!(!config.matching.parallel);
        assert_eq!(config.colorimetry.illuminant, Illuminant::E);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
calibration:
  methods: [paper_a, paper_b]
  poly_degree: 3
  exclude_concentrations: [0, -1]
  sample_weights: [1.0, 2.0]
matching:
  bounds:
    RED: { lower: 0.0, upper: 0.01 }
  total_ceiling: 0.08
  parallel: true
colorimetry:
  illuminant: a
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();

        assert_eq!(
            config.calibration.methods,
            vec![DerivationMethod::PaperA, DerivationMethod::PaperB]
        );
        assert_eq!(config.calibration.exclude_concentrations, vec![0, -1]);
        assert_eq!(config.matching.bounds.len(), 1);
        assert_eq!(config.matching.max_iter, 1000);
        assert_eq!(config.colorimetry.illuminant, Illuminant::A);

        let options = config.minimizer_options();
        assert_eq!(options.bounds[&Pigment::Red].upper, 0.01);
        assert_eq!(options.bounds[&Pigment::White].upper, 0.063);
        assert_eq!(options.total_ceiling, 0.08);
        assert!(options.parallel);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = AppConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(AppConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_unknown_method_rejected() {
        assert!(AppConfig::from_yaml("calibration:\n  methods: [paper_c]\n").is_err());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut config = AppConfig::default();
        config.calibration.sample_weights = vec![1.0, -1.0];
        assert!(config.regression_engine().is_err());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = AppConfig::load_or_default(Path::new("/nonexistent/pigmix.yaml"));
        assert_eq!(config, AppConfig::default());
    }
}
