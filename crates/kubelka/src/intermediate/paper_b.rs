use super::{acoth, Derivation, DerivationMethod};
use crate::constants::CardReference;
use crate::spectrum::Spectrum;

/// Derivation assuming an ideal black (`Rg = 0`) and white (`Rg = 1`)
/// background. The card reference is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaperB;

impl PaperB {
    #[inline]
    pub fn a(rk: f64, rw: f64) -> f64 {
        0.5 * (rw + (1.0 + rk - rw) / rk)
    }

    #[inline]
    pub fn sx(rk: f64, a: f64, b: f64) -> f64 {
        acoth((1.0 - a * rk) / (b * rk)) / b
    }
}

impl Derivation for PaperB {
    fn method(&self) -> DerivationMethod {
        DerivationMethod::PaperB
    }

    fn compute_a(&self, _card: &CardReference, dark: &Spectrum, light: &Spectrum) -> Spectrum {
        dark.zip_map(light, Self::a)
    }

    fn compute_sx(&self, _card: &CardReference, dark: &Spectrum, a: &Spectrum, b: &Spectrum) -> Spectrum {
        let values = dark
            .values()
            .iter()
            .zip(a.values().iter().zip(b.values()))
            .map(|(&rk, (&a, &b))| Self::sx(rk, a, b))
            .collect();
        Spectrum::new(dark.start_nm(), values)
    }
}
