use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{KmError, Result};
use crate::spectrum::Spectrum;

/// Multi-output polynomial in concentration: one coefficient spectrum per
/// power, so `predict(c) = Σ c^p · coefficients[p]` wavelength by wavelength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPolynomial")]
pub struct PolynomialModel {
    coefficients: Vec<Spectrum>,
}

/// Unchecked wire form of [`PolynomialModel`].
#[derive(Deserialize)]
struct RawPolynomial {
    coefficients: Vec<Spectrum>,
}

impl TryFrom<RawPolynomial> for PolynomialModel {
    type Error = KmError;

    fn try_from(raw: RawPolynomial) -> Result<Self> {
        Self::from_coefficients(raw.coefficients)
    }
}

impl PolynomialModel {
    /// Weighted least-squares fit of `ys` against `[1, x, …, x^degree]`.
    ///
    /// Solved through SVD; rank-deficient systems (fewer samples than
    /// coefficients) get the minimum-norm solution.
    pub fn fit(xs: &[f64], ys: &[&Spectrum], weights: &[f64], degree: usize) -> Result<Self> {
        let Some(template) = ys.first() else {
            return Err(KmError::InsufficientData("no samples to fit".to_string()));
        };
        if xs.len() != ys.len() || weights.len() != ys.len() {
            return Err(KmError::Validation(format!(
                "{} concentrations, {} spectra and {} weights",
                xs.len(),
                ys.len(),
                weights.len()
            )));
        }

        let n = xs.len();
        let terms = degree + 1;
        let outputs = template.len();
        let sqrt_w: Vec<f64> = weights.iter().map(|w| w.sqrt()).collect();

        let design = DMatrix::from_fn(n, terms, |i, j| sqrt_w[i] * xs[i].powi(j as i32));
        let targets = DMatrix::from_fn(n, outputs, |i, k| sqrt_w[i] * ys[i].values()[k]);

        let svd = design.svd(true, true);
        let max_sv = svd.singular_values.iter().copied().fold(0.0, f64::max);
        let eps = f64::EPSILON * n.max(terms) as f64 * max_sv;
        let beta = svd
            .solve(&targets, eps)
            .map_err(|e| KmError::Validation(format!("least squares: {}", e)))?;

        let coefficients = (0..terms)
            .map(|p| Spectrum::new(template.start_nm(), beta.row(p).iter().copied().collect()))
            .collect();
        Ok(Self { coefficients })
    }

    pub fn from_coefficients(coefficients: Vec<Spectrum>) -> Result<Self> {
        let Some(first) = coefficients.first() else {
            return Err(KmError::invalid_parameter("coefficients", "[]"));
        };
        for c in &coefficients[1..] {
            first.ensure_same_grid(c, "polynomial coefficient")?;
        }
        Ok(Self { coefficients })
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn coefficients(&self) -> &[Spectrum] {
        &self.coefficients
    }

    /// Spectrum predicted at concentration `x` (Horner's scheme).
    pub fn predict(&self, x: f64) -> Spectrum {
        let mut iter = self.coefficients.iter().rev();
        let Some(highest) = iter.next() else {
            return Spectrum::new(0, Vec::new());
        };
        iter.fold(highest.clone(), |acc, c| acc.zip_map(c, |acc, c| acc * x + c))
    }

    /// Wavelength grid of the predictions.
    pub fn grid(&self) -> Option<&Spectrum> {
        self.coefficients.first()
    }
}
