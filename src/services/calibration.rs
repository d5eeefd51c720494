//! Calibration run: measurements → pigment models.

use kubelka::intermediate::{Calibrator, DerivationMethod, IntermediateTable};
use kubelka::mixer::{BaseKm, ModelTable};
use kubelka::regression::{select_best, RegressionEngine};
use kubelka::{extract_constants, extract_targets, CardReference, Pigment, ReflectanceTable};

use crate::error::{AppError, AppResult};
use crate::models::{AppConfig, CalibrationConfig, CalibrationModel, CalibrationReport};

/// Derives intermediates for every monochrome pigment series and method,
/// calibrates the base, fits the regression models and keeps the best.
pub struct CalibrationService {
    config: CalibrationConfig,
    engine: RegressionEngine,
}

impl CalibrationService {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        Ok(Self {
            config: config.calibration.clone(),
            engine: config.regression_engine()?,
        })
    }

    /// Calibrate from a measurement table holding the card (`MU000`) and
    /// base (`MU999`) rows plus monochrome pigment series.
    pub fn run(&self, measurements: &ReflectanceTable) -> AppResult<CalibrationReport> {
        let constants = extract_constants(measurements, None)?;
        let card = constants.card_reference()?;
        let samples = extract_targets(measurements)?;

        let series = monochrome_series(&samples);
        if series.is_empty() {
            return Err(AppError::MissingInput("monochrome samples"));
        }

        let mut intermediate = IntermediateTable::default();
        for method in &self.config.methods {
            for (pigment, table) in &series {
                tracing::debug!(%pigment, %method, rows = table.len(), "Calibrating pigment series");
                let calibrator = Calibrator::new(*method, card.clone())
                    .exclude_concentrations(self.config.exclude_concentrations.clone());
                intermediate.extend(calibrator.calibrate(table)?);
            }
        }

        let base_rows = calibrate_base(&card, &constants.base_samples()?)?;
        let base = BaseKm::from_intermediate(&base_rows)?;
        intermediate.extend(base_rows);

        let fits = self.engine.fit_calibration(&intermediate)?;
        let best = select_best(&fits);
        if best.is_empty() {
            return Err(AppError::MissingInput("fitted pigment models"));
        }
        let models = ModelTable::new(&best)?;

        tracing::info!(
            pigments = series.len(),
            methods = self.config.methods.len(),
            candidates = fits.len(),
            selected = best.len(),
            "Calibration finished"
        );

        Ok(CalibrationReport {
            model: CalibrationModel {
                card,
                base,
                models: models.entries(),
            },
            intermediate,
            fits,
        })
    }
}

/// Split rows into one table per pigment; rows with several pigments are
/// not monochrome and are skipped.
fn monochrome_series(samples: &ReflectanceTable) -> Vec<(Pigment, ReflectanceTable)> {
    let series: Vec<(Pigment, ReflectanceTable)> = Pigment::ALL
        .into_iter()
        .map(|pigment| {
            let table = samples.filter(|s| s.concentrations.active_pigments() == [pigment]);
            (pigment, table)
        })
        .filter(|(_, table)| !table.is_empty())
        .collect();

    let used: usize = series.iter().map(|(_, t)| t.len()).sum();
    if used < samples.len() {
        tracing::debug!(skipped = samples.len() - used, "Ignoring rows that are not monochrome");
    }
    series
}

/// The base is always derived with the measured card.
fn calibrate_base(card: &CardReference, base: &ReflectanceTable) -> AppResult<IntermediateTable> {
    Ok(Calibrator::new(DerivationMethod::PaperA, card.clone()).calibrate(base)?)
}
