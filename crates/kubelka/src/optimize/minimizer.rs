use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::history::{BatchReport, MatchHistory, OptimizationResult, ReflectanceEntry, SeriesKind, TargetFailure};
use super::solver::{FeasibleSet, Optimum, ProjectedLevenbergMarquardt, SolverError, SolverOptions};
use crate::colorimetry::{Colorimeter, SpectralColorimeter};
use crate::error::{KmError, Result};
use crate::formulate::Formulator;
use crate::metrics;
use crate::pigment::{Concentrations, Pigment};
use crate::table::{ReflectanceTable, SpectralSample};

/// Practical concentration range of one pigment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    /// # Errors
    ///
    /// [`KmError::InvalidParameter`] unless `0 ≤ lower ≤ upper` and both are
    /// finite.
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if !lower.is_finite() || !upper.is_finite() || lower < 0.0 || lower > upper {
            return Err(KmError::invalid_parameter("bounds", format!("[{}, {}]", lower, upper)));
        }
        Ok(Self { lower, upper })
    }

    pub fn midpoint(&self) -> f64 {
        0.5 * (self.lower + self.upper)
    }
}

/// Upper bounds keeping each pigment within its linear response region.
pub fn default_bounds() -> BTreeMap<Pigment, Bounds> {
    BTreeMap::from([
        (Pigment::Black, Bounds { lower: 0.0, upper: 0.0021 }),
        (Pigment::Red, Bounds { lower: 0.0, upper: 0.0053 }),
        (Pigment::White, Bounds { lower: 0.0, upper: 0.063 }),
        (Pigment::Yellow, Bounds { lower: 0.0, upper: 0.03 }),
    ])
}

pub const DEFAULT_TOTAL_CEILING: f64 = 0.1;
pub const DEFAULT_MAX_ITER: usize = 1000;
pub const DEFAULT_MAX_RETRIES: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct MinimizerOptions {
    pub bounds: BTreeMap<Pigment, Bounds>,
    pub total_ceiling: f64,
    pub max_iter: usize,
    pub max_retries: usize,
    pub parallel: bool,
}

impl Default for MinimizerOptions {
    fn default() -> Self {
        Self {
            bounds: default_bounds(),
            total_ceiling: DEFAULT_TOTAL_CEILING,
            max_iter: DEFAULT_MAX_ITER,
            max_retries: DEFAULT_MAX_RETRIES,
            parallel: false,
        }
    }
}

impl MinimizerOptions {
    #[inline]
    pub fn bounds(mut self, pigment: Pigment, bounds: Bounds) -> Self {
        self.bounds.insert(pigment, bounds);
        self
    }

    #[inline]
    pub fn total_ceiling(mut self, ceiling: f64) -> Self {
        self.total_ceiling = ceiling;
        self
    }

    #[inline]
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    #[inline]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[inline]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Finds concentrations whose predicted reflectance matches a target.
///
/// Only pigments with models are optimized; the rest stay at zero. The
/// objective is the spectral RMSE on the target's own background.
pub struct Minimizer {
    formulator: Formulator,
    pigments: Vec<Pigment>,
    solver: ProjectedLevenbergMarquardt,
    max_retries: usize,
    parallel: bool,
    colorimeter: Box<dyn Colorimeter>,
}

impl std::fmt::Debug for Minimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Minimizer")
            .field("pigments", &self.pigments)
            .field("solver", &self.solver)
            .field("max_retries", &self.max_retries)
            .field("parallel", &self.parallel)
            .finish_non_exhaustive()
    }
}

/// Matched target before it is recorded into a history.
struct MatchOutcome {
    result: OptimizationResult,
    target: ReflectanceEntry,
    prediction: ReflectanceEntry,
}

impl Minimizer {
    pub fn new(formulator: Formulator, options: MinimizerOptions) -> Result<Self> {
        let pigments = formulator.pigments();
        if pigments.is_empty() {
            return Err(KmError::Validation("no pigment models to optimize".to_string()));
        }
        if !options.total_ceiling.is_finite() || options.total_ceiling <= 0.0 {
            return Err(KmError::invalid_parameter("total_ceiling", options.total_ceiling));
        }

        let mut lower = Vec::with_capacity(pigments.len());
        let mut upper = Vec::with_capacity(pigments.len());
        for pigment in &pigments {
            let bounds = options
                .bounds
                .get(pigment)
                .ok_or_else(|| KmError::Validation(format!("no bounds for {}", pigment)))?;
            let bounds = Bounds::new(bounds.lower, bounds.upper)?;
            lower.push(bounds.lower);
            upper.push(bounds.upper);
        }
        let set = FeasibleSet::new(lower, upper, Some(options.total_ceiling))
            .map_err(|e| KmError::invalid_parameter("bounds", e))?;
        let solver_options = SolverOptions {
            max_iter: options.max_iter,
            ..SolverOptions::default()
        };

        Ok(Self {
            formulator,
            pigments,
            solver: ProjectedLevenbergMarquardt::new(set, solver_options),
            max_retries: options.max_retries,
            parallel: options.parallel,
            colorimeter: Box::new(SpectralColorimeter::default()),
        })
    }

    pub fn with_colorimeter(mut self, colorimeter: impl Colorimeter + 'static) -> Self {
        self.colorimeter = Box::new(colorimeter);
        self
    }

    pub fn pigments(&self) -> &[Pigment] {
        &self.pigments
    }

    pub fn formulator(&self) -> &Formulator {
        &self.formulator
    }

    /// Match every target row and append the outcomes to `history`.
    ///
    /// Targets that exhaust their retries are listed in the returned report
    /// and skipped; the others are still recorded, in input order.
    ///
    /// # Errors
    ///
    /// Fails before any optimization when a target's grid differs from the
    /// models', and on colorimetry errors.
    pub fn estimate(&self, targets: &ReflectanceTable, history: &mut MatchHistory) -> Result<BatchReport> {
        for target in targets.samples() {
            self.formulator
                .mixer()
                .grid()
                .ensure_same_grid(&target.reflectance, &target.formula_code)?;
        }

        let outcomes: Vec<Result<MatchOutcome>> = if self.parallel {
            targets.samples().par_iter().map(|t| self.match_target(t)).collect()
        } else {
            targets.samples().iter().map(|t| self.match_target(t)).collect()
        };

        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(outcome) => {
                    history.record(outcome.result, outcome.target, outcome.prediction);
                    report.succeeded += 1;
                }
                Err(KmError::MaxRetries {
                    formula_code,
                    background,
                    attempts,
                    source,
                }) => report.failures.push(TargetFailure {
                    formula_code,
                    background,
                    attempts,
                    error: source.to_string(),
                }),
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            targets = targets.len(),
            succeeded = report.succeeded,
            failed = report.failures.len(),
            "Colour matching finished"
        );
        Ok(report)
    }

    /// Match a single target without recording it.
    pub fn estimate_one(&self, target: &SpectralSample) -> Result<OptimizationResult> {
        self.match_target(target).map(|outcome| outcome.result)
    }

    fn match_target(&self, target: &SpectralSample) -> Result<MatchOutcome> {
        let (optimum, retries) = self.optimize_with_retries(target)?;

        let concentrations = self.concentrations_from(&optimum.x);
        let predicted = self.formulator.reflectance(&concentrations, target.background);
        let lab = self.colorimeter.lab(&predicted)?;
        let target_lab = match target.lab {
            Some(lab) => lab,
            None => self.colorimeter.lab(&target.reflectance)?,
        };
        let objective = metrics::rmse(&target.reflectance, &predicted);

        tracing::debug!(
            formula_code = %target.formula_code,
            background = %target.background,
            objective,
            iterations = optimum.iterations,
            success = optimum.success,
            "Matched target"
        );

        let result = OptimizationResult {
            formula_code: target.formula_code.clone(),
            background: target.background,
            target_concentrations: target.concentrations,
            concentrations,
            success: optimum.success,
            message: optimum.message,
            objective,
            iterations: optimum.iterations,
            retries,
            target_lab,
            lab,
            delta_e00: metrics::delta_e00(&target_lab, &lab),
            concentration_distance: metrics::euclidean_distance(&target.concentrations, &concentrations),
        };
        let target_entry = ReflectanceEntry {
            kind: SeriesKind::Target,
            formula_code: target.formula_code.clone(),
            background: target.background,
            concentrations: target.concentrations,
            lab: target_lab,
            reflectance: target.reflectance.clone(),
        };
        let prediction = ReflectanceEntry {
            kind: SeriesKind::Predicted,
            formula_code: target.formula_code.clone(),
            background: target.background,
            concentrations,
            lab,
            reflectance: predicted,
        };
        Ok(MatchOutcome {
            result,
            target: target_entry,
            prediction,
        })
    }

    fn optimize_with_retries(&self, target: &SpectralSample) -> Result<(Optimum, usize)> {
        let attempts = self.max_retries.max(1);
        let residuals = |x: &[f64]| -> Vec<f64> {
            let predicted = self.formulator.reflectance(&self.concentrations_from(x), target.background);
            predicted
                .values()
                .iter()
                .zip(target.reflectance.values())
                .map(|(p, t)| p - t)
                .collect()
        };

        let mut last_error = SolverError::NonFiniteObjective { iteration: 0 };
        for attempt in 0..attempts {
            match self.solver.minimize(&residuals, &self.start_point(attempt)) {
                Ok(optimum) => return Ok((optimum, attempt)),
                Err(error) => {
                    tracing::warn!(
                        formula_code = %target.formula_code,
                        background = %target.background,
                        attempt = attempt + 1,
                        %error,
                        "Optimization attempt failed"
                    );
                    last_error = error;
                }
            }
        }

        Err(KmError::MaxRetries {
            formula_code: target.formula_code.clone(),
            background: target.background,
            attempts,
            source: last_error,
        })
    }

    /// Attempt `k` starts at `lower + (upper - lower) / 2^(k+1)`: the bound
    /// midpoints first, then ever closer to the lower bounds.
    fn start_point(&self, attempt: usize) -> Vec<f64> {
        let fraction = 0.5f64.powi(attempt.min(1000) as i32 + 1);
        let set = self.solver.feasible_set();
        let raw: Vec<f64> = set
            .lower()
            .iter()
            .zip(set.upper())
            .map(|(l, u)| l + (u - l) * fraction)
            .collect();
        set.project(&raw)
    }

    fn concentrations_from(&self, x: &[f64]) -> Concentrations {
        self.pigments
            .iter()
            .zip(x)
            .fold(Concentrations::zero(), |c, (p, v)| c.with(*p, *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CardReference;
    use crate::mixer::{BaseKm, KmMixer, ModelEntry, ModelTable};
    use crate::pigment::{Background, Colorant};
    use crate::regression::{KmQuantity, PolynomialModel};
    use crate::spectrum::Spectrum;

    fn formulator(pigments: &[Pigment]) -> Formulator {
        let entries = pigments
            .iter()
            .flat_map(|p| {
                KmQuantity::ALL.map(|q| ModelEntry {
                    colorant: Colorant::Pigment(*p),
                    quantity: q,
                    model: PolynomialModel::from_coefficients(vec![
                        Spectrum::constant(400, 5, 0.0),
                        Spectrum::constant(400, 5, if q == KmQuantity::S { 50.0 } else { 20.0 }),
                    ])
                    .unwrap(),
                })
            })
            .collect();
        let grid = Spectrum::constant(400, 5, 0.0);
        let mixer = KmMixer::new(ModelTable::from_entries(entries).unwrap(), BaseKm::zero(&grid)).unwrap();
        let card = CardReference::new(Spectrum::constant(400, 5, 0.05), Spectrum::constant(400, 5, 0.9)).unwrap();
        Formulator::new(card, mixer).unwrap()
    }

    #[test]
    fn test_missing_bounds_rejected() {
        let mut options = MinimizerOptions::default();
        options.bounds.remove(&Pigment::Red);
        let err = Minimizer::new(formulator(&[Pigment::Red]), options).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: no bounds for RED");
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        assert!(Bounds::new(0.2, 0.1).is_err());
        assert!(Bounds::new(-0.1, 0.1).is_err());
        assert!(Bounds::new(0.0, f64::NAN).is_err());
    }

    #[test]
    fn test_start_points_halve_towards_lower_bound() {
        let minimizer = Minimizer::new(formulator(&[Pigment::White]), MinimizerOptions::default()).unwrap();
        assert!((minimizer.start_point(0)[0] - 0.0315).abs() < 1e-12);
        assert!((minimizer.start_point(1)[0] - 0.01575).abs() < 1e-12);
    }

    #[test]
    fn test_grid_mismatch_fails_fast() {
        let minimizer = Minimizer::new(formulator(&[Pigment::White]), MinimizerOptions::default()).unwrap();
        let targets = ReflectanceTable::new(vec![SpectralSample::new(
            "MU100",
            Concentrations::zero(),
            Background::Dark,
            Spectrum::constant(400, 7, 0.5),
        )]);
        let mut history = MatchHistory::new();
        assert!(matches!(minimizer.estimate(&targets, &mut history), Err(KmError::Validation(_))));
        assert!(history.is_empty());
    }

    fn batch_with_unsolvable_target(formulator: &Formulator) -> ReflectanceTable {
        let truth = Concentrations::zero().with(Pigment::White, 0.02);
        ReflectanceTable::new(vec![
            SpectralSample::new(
                "MU100",
                Concentrations::zero(),
                Background::Light,
                Spectrum::constant(400, 5, f64::NAN),
            ),
            SpectralSample::new(
                "MU200",
                truth,
                Background::Light,
                formulator.reflectance(&truth, Background::Light),
            ),
        ])
    }

    #[test]
    fn test_exhausted_retries_isolate_target() {
        let formulator = formulator(&[Pigment::White]);
        let targets = batch_with_unsolvable_target(&formulator);
        for parallel in [false, true] {
            let options = MinimizerOptions::default().max_retries(3).parallel(parallel);
            let minimizer = Minimizer::new(formulator.clone(), options).unwrap();
            let mut history = MatchHistory::new();
            let report = minimizer.estimate(&targets, &mut history).unwrap();

            assert_eq!(report.succeeded, 1);
            assert_eq!(report.failures.len(), 1);
            assert_eq!(report.failures[0].formula_code, "MU100");
            assert_eq!(report.failures[0].background, Background::Light);
            assert_eq!(report.failures[0].attempts, 3);
            assert!(!report.is_complete());
            assert_eq!(history.len(), 1);
            assert_eq!(history.results()[0].formula_code, "MU200");
        }
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        let formulator = formulator(&[Pigment::White]);
        let targets = batch_with_unsolvable_target(&formulator);
        let minimizer = Minimizer::new(formulator, MinimizerOptions::default().max_retries(0)).unwrap();

        let err = minimizer.estimate_one(&targets.samples()[0]).unwrap_err();
        assert!(matches!(err, KmError::MaxRetries { attempts: 1, .. }), "{err}");
        assert_eq!(minimizer.estimate_one(&targets.samples()[1]).unwrap().retries, 0);
    }

    #[test]
    fn test_recovers_single_pigment() {
        let formulator = formulator(&[Pigment::White]);
        let truth = Concentrations::zero().with(Pigment::White, 0.02);
        let target = SpectralSample::new(
            "MU100",
            truth,
            Background::Light,
            formulator.reflectance(&truth, Background::Light),
        );
        let minimizer = Minimizer::new(formulator, MinimizerOptions::default()).unwrap();
        let result = minimizer.estimate_one(&target).unwrap();

        assert!(result.objective < 1e-6);
        assert!((result.concentrations.get(Pigment::White) - 0.02).abs() < 1e-4);
        assert_eq!(result.retries, 0);
        assert!(result.delta_e00 < 0.01);
    }
}
