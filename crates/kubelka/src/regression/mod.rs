//! Polynomial regression of K, S and K/S against pigment concentration.
//!
//! For every (pigment, derivation method) group of an
//! [`IntermediateTable`](crate::intermediate::IntermediateTable) and each of
//! the three quantities, a multi-output polynomial (one output per
//! wavelength) is selected by leave-one-out cross-validation over degrees
//! `1..=poly_degree`, then refitted on all usable samples.
//!
//! Scores follow the "higher is better" convention: a fold's score is the
//! negated mean absolute error of its held-out sample over all wavelengths.
//! [`select_best`] therefore keeps the record with the *largest* score.

mod polynomial;

use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{KmError, Result};
use crate::intermediate::{DerivationMethod, IntermediateRow, IntermediateTable, Variable};
use crate::pigment::{Colorant, Pigment};
use crate::spectrum::Spectrum;

pub use polynomial::PolynomialModel;

/// Highest polynomial degree the grid search will consider.
pub const MAX_POLY_DEGREE: usize = 10;

/// Kubelka-Munk quantity predicted by a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KmQuantity {
    K,
    S,
    #[serde(rename = "K/S")]
    Ks,
}

impl KmQuantity {
    pub const ALL: [KmQuantity; 3] = [KmQuantity::K, KmQuantity::S, KmQuantity::Ks];

    pub fn name(self) -> &'static str {
        match self {
            KmQuantity::K => "K",
            KmQuantity::S => "S",
            KmQuantity::Ks => "K/S",
        }
    }

    /// Intermediate variable the quantity is regressed from.
    pub fn source_variable(self) -> Variable {
        match self {
            KmQuantity::K => Variable::Kx,
            KmQuantity::S => Variable::Sx,
            KmQuantity::Ks => Variable::KxSx,
        }
    }
}

impl fmt::Display for KmQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-sample regression weights.
///
/// Weight `i` applies to the `i`-th row of a variable within its
/// (pigment, method) group, counted before non-finite rows are discarded.
/// Rows without a weight get 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleWeights(Vec<f64>);

impl SampleWeights {
    /// # Errors
    ///
    /// [`KmError::InvalidParameter`] for any negative weight. NaN becomes 1.
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        if let Some((i, w)) = weights.iter().enumerate().find(|(_, w)| **w < 0.0) {
            return Err(KmError::invalid_parameter(format!("sample_weights[{}]", i), w));
        }
        Ok(Self(
            weights
                .into_iter()
                .map(|w| if w.is_nan() { 1.0 } else { w })
                .collect(),
        ))
    }

    #[inline]
    pub fn weight_for(&self, index: usize) -> f64 {
        self.0.get(index).copied().unwrap_or(1.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Cross-validated score of one candidate degree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub degree: usize,
    pub mean_score: f64,
    pub fold_scores: Vec<f64>,
}

/// Outcome of fitting one (pigment, method, quantity) combination.
///
/// An unfit record (too few usable samples) has a NaN score and no model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRecord {
    pub pigment: Pigment,
    pub method: DerivationMethod,
    pub quantity: KmQuantity,
    pub degree: Option<usize>,
    pub mean_score: f64,
    pub fold_scores: Vec<f64>,
    pub grid: Vec<GridPoint>,
    pub model: Option<PolynomialModel>,
}

impl FitRecord {
    fn unfit(pigment: Pigment, method: DerivationMethod, quantity: KmQuantity, grid: Vec<GridPoint>) -> Self {
        Self {
            pigment,
            method,
            quantity,
            degree: None,
            mean_score: f64::NAN,
            fold_scores: Vec::new(),
            grid,
            model: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some() && !self.mean_score.is_nan()
    }

    /// Mean leave-one-out absolute error (the negated score).
    pub fn mean_error(&self) -> f64 {
        -self.mean_score
    }
}

/// Fits K, S and K/S models from intermediate variables.
#[derive(Debug, Clone)]
pub struct RegressionEngine {
    poly_degree: usize,
    weights: SampleWeights,
}

impl RegressionEngine {
    /// `poly_degree` is clipped to `1..=10`.
    pub fn new(poly_degree: i64, weights: SampleWeights) -> Self {
        Self {
            poly_degree: poly_degree.clamp(1, MAX_POLY_DEGREE as i64) as usize,
            weights,
        }
    }

    pub fn poly_degree(&self) -> usize {
        self.poly_degree
    }

    /// Fit every quantity of every (pigment, method) group in `table`.
    ///
    /// Records come out grouped in first-appearance order, each group in
    /// `K, S, K/S` order. Card and base rows are skipped.
    pub fn fit_calibration(&self, table: &IntermediateTable) -> Result<Vec<FitRecord>> {
        let mut groups: Vec<(Pigment, DerivationMethod)> = Vec::new();
        for row in table.rows() {
            if let (Colorant::Pigment(p), Some(m)) = (row.colorant, row.method) {
                if !groups.contains(&(p, m)) {
                    groups.push((p, m));
                }
            }
        }
        if groups.is_empty() {
            return Err(KmError::EmptyResult("pigment rows in intermediate table".to_string()));
        }

        let jobs: Vec<(Pigment, DerivationMethod, KmQuantity)> = groups
            .iter()
            .flat_map(|&(p, m)| KmQuantity::ALL.map(|q| (p, m, q)))
            .collect();

        jobs.par_iter()
            .map(|&(pigment, method, quantity)| {
                let rows: Vec<&IntermediateRow> = table
                    .rows_for(quantity.source_variable())
                    .filter(|r| r.colorant == Colorant::Pigment(pigment) && r.method == Some(method))
                    .collect();
                self.fit_quantity(pigment, method, quantity, &rows)
            })
            .collect()
    }

    /// Grid-search and refit one quantity from its intermediate rows.
    pub fn fit_quantity(
        &self,
        pigment: Pigment,
        method: DerivationMethod,
        quantity: KmQuantity,
        rows: &[&IntermediateRow],
    ) -> Result<FitRecord> {
        let mut xs = Vec::with_capacity(rows.len());
        let mut ys: Vec<&Spectrum> = Vec::with_capacity(rows.len());
        let mut ws = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let x = row.concentrations.get(pigment);
            if !x.is_finite() || !row.values.all_finite() {
                continue;
            }
            if let Some(first) = ys.first() {
                first.ensure_same_grid(&row.values, &row.formula_code)?;
            }
            xs.push(x);
            ys.push(&row.values);
            ws.push(self.weights.weight_for(index));
        }

        if xs.len() < 2 {
            tracing::debug!(%pigment, %method, %quantity, usable = xs.len(), "Too few usable samples to fit");
            return Ok(FitRecord::unfit(pigment, method, quantity, Vec::new()));
        }

        let grid = (1..=self.poly_degree)
            .map(|degree| leave_one_out(&xs, &ys, &ws, degree))
            .collect::<Result<Vec<_>>>()?;

        let mut best: Option<&GridPoint> = None;
        for point in grid.iter().filter(|p| !p.mean_score.is_nan()) {
            if best.map_or(true, |b| point.mean_score > b.mean_score) {
                best = Some(point);
            }
        }
        let Some(best) = best.cloned() else {
            return Ok(FitRecord::unfit(pigment, method, quantity, grid));
        };

        let model = PolynomialModel::fit(&xs, &ys, &ws, best.degree)?;
        tracing::debug!(
            %pigment,
            %method,
            %quantity,
            degree = best.degree,
            mean_error = -best.mean_score,
            "Selected regression model"
        );
        Ok(FitRecord {
            pigment,
            method,
            quantity,
            degree: Some(best.degree),
            mean_score: best.mean_score,
            fold_scores: best.fold_scores,
            grid,
            model: Some(model),
        })
    }
}

fn leave_one_out(xs: &[f64], ys: &[&Spectrum], ws: &[f64], degree: usize) -> Result<GridPoint> {
    let n = xs.len();
    let fold_scores = (0..n)
        .map(|held| {
            let train_x = without(xs, held);
            let train_y = without(ys, held);
            let train_w = without(ws, held);
            let model = PolynomialModel::fit(&train_x, &train_y, &train_w, degree)?;
            let predicted = model.predict(xs[held]);
            let mean_abs = ys[held]
                .values()
                .iter()
                .zip(predicted.values())
                .map(|(y, p)| (y - p).abs())
                .sum::<f64>()
                / predicted.len().max(1) as f64;
            Ok(-mean_abs)
        })
        .collect::<Result<Vec<f64>>>()?;

    let mean_score = fold_scores.iter().sum::<f64>() / n as f64;
    Ok(GridPoint {
        degree,
        mean_score,
        fold_scores,
    })
}

fn without<T: Copy>(values: &[T], held: usize) -> Vec<T> {
    values
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != held)
        .map(|(_, v)| *v)
        .collect()
}

/// Keep the highest-scoring fitted record per (pigment, quantity).
///
/// Unfit records are discarded. Ties keep the earlier record. Output is
/// ordered by pigment, then `K < S < K/S`.
pub fn select_best(records: &[FitRecord]) -> Vec<FitRecord> {
    let mut best: Vec<&FitRecord> = Vec::new();
    for record in records.iter().filter(|r| r.is_fitted()) {
        match best
            .iter_mut()
            .find(|b| b.pigment == record.pigment && b.quantity == record.quantity)
        {
            Some(slot) if record.mean_score > slot.mean_score => *slot = record,
            Some(_) => {}
            None => best.push(record),
        }
    }
    best.sort_by_key(|r| (r.pigment, r.quantity));
    best.into_iter().cloned().collect()
}
