use super::{acoth, Derivation, DerivationMethod};
use crate::constants::CardReference;
use crate::spectrum::Spectrum;

/// Derivation against the measured card reflectance.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaperA;

impl PaperA {
    /// `a` from sample reflectance `rk`/`rw` over card reflectance `rgk`/`rgw`.
    #[inline]
    pub fn a(rk: f64, rw: f64, rgk: f64, rgw: f64) -> f64 {
        ((rw - rk) * (1.0 + rgw * rgk) - (rgw - rgk) * (1.0 + rw * rk)) / (2.0 * (rw * rgk - rk * rgw))
    }

    #[inline]
    pub fn sx(rk: f64, rgk: f64, a: f64, b: f64) -> f64 {
        acoth((1.0 - a * (rk + rgk) + rk * rgk) / (b * (rk - rgk))) / b
    }
}

impl Derivation for PaperA {
    fn method(&self) -> DerivationMethod {
        DerivationMethod::PaperA
    }

    fn compute_a(&self, card: &CardReference, dark: &Spectrum, light: &Spectrum) -> Spectrum {
        let values = dark
            .values()
            .iter()
            .zip(light.values())
            .zip(card.dark.values().iter().zip(card.light.values()))
            .map(|((&rk, &rw), (&rgk, &rgw))| Self::a(rk, rw, rgk, rgw))
            .collect();
        Spectrum::new(dark.start_nm(), values)
    }

    fn compute_sx(&self, card: &CardReference, dark: &Spectrum, a: &Spectrum, b: &Spectrum) -> Spectrum {
        let values = dark
            .values()
            .iter()
            .zip(card.dark.values())
            .zip(a.values().iter().zip(b.values()))
            .map(|((&rk, &rgk), (&a, &b))| Self::sx(rk, rgk, a, b))
            .collect();
        Spectrum::new(dark.start_nm(), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intermediate::PaperB;

    #[test]
    fn test_ideal_card_matches_paper_b() {
        let (rk, rw) = (0.32, 0.48);
        let a = PaperA::a(rk, rw, 0.0, 1.0);
        assert!((a - PaperB::a(rk, rw)).abs() < 1e-12);

        let b = (a * a - 1.0).sqrt();
        assert!((PaperA::sx(rk, 0.0, a, b) - PaperB::sx(rk, a, b)).abs() < 1e-9);
    }

    #[test]
    fn test_identical_backgrounds_give_nan() {
        // dark and light card equal: denominator collapses
        let a = PaperA::a(0.3, 0.3, 0.5, 0.5);
        assert!(!a.is_finite());
    }
}
