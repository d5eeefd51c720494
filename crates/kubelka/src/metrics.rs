//! Target-versus-prediction comparisons.

use crate::colorimetry::LabValue;
use crate::pigment::Concentrations;
use crate::spectrum::Spectrum;

/// Root mean square difference of two spectra on the same grid.
///
/// NaN for empty spectra.
pub fn rmse(target: &Spectrum, predicted: &Spectrum) -> f64 {
    rmse_values(target.values(), predicted.values())
}

pub fn rmse_values(target: &[f64], predicted: &[f64]) -> f64 {
    let n = target.len().min(predicted.len());
    let sum: f64 = target.iter().zip(predicted).map(|(t, p)| (t - p) * (t - p)).sum();
    (sum / n as f64).sqrt()
}

pub fn euclidean_distance(a: &Concentrations, b: &Concentrations) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|((_, x), (_, y))| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// CIEDE2000 difference between two Lab values.
pub fn delta_e00(target: &LabValue, predicted: &LabValue) -> f64 {
    target.delta_e00(predicted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pigment::Pigment;

    #[test]
    fn test_rmse() {
        let a = Spectrum::new(400, vec![0.1, 0.2, 0.3, 0.4]);
        let b = Spectrum::new(400, vec![0.2, 0.1, 0.4, 0.3]);
        assert!((rmse(&a, &b) - 0.1).abs() < 1e-12);
        assert_eq!(rmse(&a, &a), 0.0);
        assert!(rmse_values(&[], &[]).is_nan());
    }

    #[test]
    fn test_concentration_distance() {
        let a = Concentrations::zero().with(Pigment::Red, 0.003).with(Pigment::White, 0.004);
        assert!((euclidean_distance(&a, &Concentrations::zero()) - 0.005).abs() < 1e-12);
    }
}
