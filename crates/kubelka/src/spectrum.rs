//! Reflectance spectra on a contiguous 1 nm wavelength grid.

use serde::{Deserialize, Serialize};

use crate::error::{KmError, Result};

/// Per-wavelength values starting at `start_nm`, one value per nanometre.
///
/// The same type carries measured reflectance, intermediate variables and
/// fitted K/S values, so every grid comparison in the pipeline reduces to
/// [`Spectrum::same_grid`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    start_nm: u32,
    values: Vec<f64>,
}

impl Spectrum {
    pub fn new(start_nm: u32, values: Vec<f64>) -> Self {
        Self { start_nm, values }
    }

    /// Build a spectrum by evaluating `f` at each wavelength in `start..=end`.
    pub fn from_fn(start_nm: u32, end_nm: u32, f: impl Fn(u32) -> f64) -> Self {
        let values = (start_nm..=end_nm).map(f).collect();
        Self { start_nm, values }
    }

    pub fn constant(start_nm: u32, len: usize, value: f64) -> Self {
        Self {
            start_nm,
            values: vec![value; len],
        }
    }

    /// Linearly interpolate samples taken every `step_nm` onto a 1 nm grid.
    ///
    /// The result spans `start_nm ..= start_nm + step_nm * (n - 1)`.
    ///
    /// # Errors
    ///
    /// Returns [`KmError::InvalidParameter`] for a zero step or an empty
    /// input.
    pub fn resample(start_nm: u32, step_nm: u32, values: &[f64]) -> Result<Self> {
        if step_nm == 0 {
            return Err(KmError::invalid_parameter("step_nm", step_nm));
        }
        if values.is_empty() {
            return Err(KmError::invalid_parameter("values", "[]"));
        }
        if step_nm == 1 {
            return Ok(Self::new(start_nm, values.to_vec()));
        }

        let step = step_nm as usize;
        let len = (values.len() - 1) * step + 1;
        let resampled = (0..len)
            .map(|i| {
                let lo = i / step;
                let frac = (i % step) as f64 / step as f64;
                match values.get(lo + 1) {
                    Some(hi) if frac > 0.0 => values[lo] + (hi - values[lo]) * frac,
                    _ => values[lo],
                }
            })
            .collect();
        Ok(Self::new(start_nm, resampled))
    }

    #[inline]
    pub fn start_nm(&self) -> u32 {
        self.start_nm
    }

    /// Last wavelength covered. Equal to `start_nm` for an empty spectrum.
    pub fn end_nm(&self) -> u32 {
        self.start_nm + self.values.len().saturating_sub(1) as u32
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn wavelengths(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.values.len() as u32).map(move |i| self.start_nm + i)
    }

    /// `(wavelength, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.wavelengths().zip(self.values.iter().copied())
    }

    pub fn value_at(&self, wavelength_nm: u32) -> Option<f64> {
        let offset = wavelength_nm.checked_sub(self.start_nm)?;
        self.values.get(offset as usize).copied()
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            start_nm: self.start_nm,
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Combine two spectra wavelength by wavelength.
    ///
    /// Both spectra must share the same grid; callers check this with
    /// [`Spectrum::same_grid`] or [`Spectrum::ensure_same_grid`].
    pub fn zip_map(&self, other: &Spectrum, f: impl Fn(f64, f64) -> f64) -> Self {
        Self {
            start_nm: self.start_nm,
            values: self
                .values
                .iter()
                .zip(&other.values)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }

    pub fn same_grid(&self, other: &Spectrum) -> bool {
        self.start_nm == other.start_nm && self.values.len() == other.values.len()
    }

    /// Fail with [`KmError::Validation`] when the grids differ.
    pub fn ensure_same_grid(&self, other: &Spectrum, context: &str) -> Result<()> {
        if self.same_grid(other) {
            Ok(())
        } else {
            Err(KmError::Validation(format!(
                "{}: wavelength grid {}-{} nm does not match {}-{} nm",
                context,
                other.start_nm,
                other.end_nm(),
                self.start_nm,
                self.end_nm()
            )))
        }
    }

    pub fn all_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fn_covers_inclusive_range() {
        let s = Spectrum::from_fn(400, 700, |nm| nm as f64);
        assert_eq!(s.len(), 301);
        assert_eq!(s.end_nm(), 700);
        assert_eq!(s.value_at(550), Some(550.0));
        assert_eq!(s.value_at(399), None);
        assert_eq!(s.value_at(701), None);
    }

    #[test]
    fn test_resample_ten_nm_to_one_nm() {
        let s = Spectrum::resample(400, 10, &[0.1, 0.2, 0.4]).unwrap();
        assert_eq!(s.start_nm(), 400);
        assert_eq!(s.end_nm(), 420);
        assert!((s.value_at(400).unwrap() - 0.1).abs() < 1e-12);
        assert!((s.value_at(405).unwrap() - 0.15).abs() < 1e-12);
        assert!((s.value_at(410).unwrap() - 0.2).abs() < 1e-12);
        assert!((s.value_at(417).unwrap() - 0.34).abs() < 1e-12);
        assert!((s.value_at(420).unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_resample_rejects_zero_step() {
        assert!(Spectrum::resample(400, 0, &[0.1]).is_err());
        assert!(Spectrum::resample(400, 10, &[]).is_err());
    }

    #[test]
    fn test_grid_mismatch_is_validation_error() {
        let a = Spectrum::constant(400, 301, 0.5);
        let b = Spectrum::constant(410, 291, 0.5);
        let err = a.ensure_same_grid(&b, "target").unwrap_err();
        assert!(matches!(err, KmError::Validation(_)));
        assert!(err.to_string().contains("410-700"));
    }

    #[test]
    fn test_zip_map_is_elementwise() {
        let a = Spectrum::new(400, vec![1.0, 2.0, 3.0]);
        let b = Spectrum::new(400, vec![0.5, 0.5, 1.0]);
        assert_eq!(a.zip_map(&b, |x, y| x * y).values(), &[0.5, 1.0, 3.0]);
    }
}
