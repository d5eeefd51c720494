//! Colour matching run: target reflectance → concentrations.

use kubelka::optimize::{MatchHistory, Minimizer};
use kubelka::{extract_targets, ReflectanceTable};

use crate::error::AppResult;
use crate::models::{AppConfig, CalibrationModel, MatchReport};

pub struct MatchingService {
    minimizer: Minimizer,
}

impl MatchingService {
    pub fn new(model: &CalibrationModel, config: &AppConfig) -> AppResult<Self> {
        let minimizer =
            Minimizer::new(model.formulator()?, config.minimizer_options())?.with_colorimeter(config.colorimeter());
        Ok(Self { minimizer })
    }

    /// Match every non-reference row of `measurements`.
    ///
    /// Targets that cannot be matched are listed in the report instead of
    /// failing the run.
    pub fn run(&self, measurements: &ReflectanceTable) -> AppResult<MatchReport> {
        let targets = extract_targets(measurements)?;
        let mut history = MatchHistory::new();
        let batch = self.minimizer.estimate(&targets, &mut history)?;

        for failure in &batch.failures {
            tracing::warn!(
                formula_code = %failure.formula_code,
                background = %failure.background,
                attempts = failure.attempts,
                error = %failure.error,
                "Target could not be matched"
            );
        }
        Ok(MatchReport::new(&history, batch))
    }
}
