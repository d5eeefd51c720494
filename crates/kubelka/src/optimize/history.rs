//! Accumulated colour-matching output.
//!
//! [`MatchHistory`] is owned by the caller and passed into each
//! [`Minimizer::estimate`](super::Minimizer::estimate) call. It only ever
//! grows until [`MatchHistory::reset`].

use serde::{Deserialize, Serialize};

use crate::colorimetry::LabValue;
use crate::pigment::{Background, Concentrations};
use crate::spectrum::Spectrum;

/// Solved concentrations and quality metrics for one target row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub formula_code: String,
    pub background: Background,
    /// Concentrations recorded with the target.
    pub target_concentrations: Concentrations,
    pub concentrations: Concentrations,
    pub success: bool,
    pub message: String,
    /// Spectral RMSE between prediction and target.
    pub objective: f64,
    pub iterations: usize,
    /// Failed attempts before this one.
    pub retries: usize,
    pub target_lab: LabValue,
    pub lab: LabValue,
    pub delta_e00: f64,
    /// Euclidean distance between recorded and solved concentrations.
    pub concentration_distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeriesKind {
    #[serde(rename = "R_true")]
    Target,
    #[serde(rename = "R_pred")]
    Predicted,
}

/// One target or predicted reflectance row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectanceEntry {
    pub kind: SeriesKind,
    pub formula_code: String,
    pub background: Background,
    pub concentrations: Concentrations,
    pub lab: LabValue,
    pub reflectance: Spectrum,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchHistory {
    results: Vec<OptimizationResult>,
    targets: Vec<ReflectanceEntry>,
    predictions: Vec<ReflectanceEntry>,
}

impl MatchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.results.clear();
        self.targets.clear();
        self.predictions.clear();
    }

    /// Append one matched target.
    pub fn record(&mut self, result: OptimizationResult, target: ReflectanceEntry, prediction: ReflectanceEntry) {
        self.results.push(result);
        self.targets.push(target);
        self.predictions.push(prediction);
    }

    pub fn results(&self) -> &[OptimizationResult] {
        &self.results
    }

    pub fn targets(&self) -> &[ReflectanceEntry] {
        &self.targets
    }

    pub fn predictions(&self) -> &[ReflectanceEntry] {
        &self.predictions
    }

    pub fn last_result(&self) -> Option<&OptimizationResult> {
        self.results.last()
    }

    pub fn last_target(&self) -> Option<&ReflectanceEntry> {
        self.targets.last()
    }

    pub fn last_prediction(&self) -> Option<&ReflectanceEntry> {
        self.predictions.last()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Targets and predictions together, sorted by formula code then
    /// background; a target precedes its prediction.
    pub fn reflectances(&self) -> Vec<&ReflectanceEntry> {
        let mut all: Vec<&ReflectanceEntry> = self.targets.iter().chain(&self.predictions).collect();
        all.sort_by(|a, b| {
            (a.formula_code.as_str(), a.background, a.kind).cmp(&(b.formula_code.as_str(), b.background, b.kind))
        });
        all
    }
}

/// A target the minimizer gave up on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetFailure {
    pub formula_code: String,
    pub background: Background,
    pub attempts: usize,
    pub error: String,
}

/// Outcome of one batch: how many targets were recorded and which failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failures: Vec<TargetFailure>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
