//! Reflectance → XYZ → CIELAB conversion used to annotate match results.
//!
//! The built-in [`SpectralColorimeter`] integrates against the analytic
//! multi-lobe fit of the CIE 1931 2° colour matching functions (Wyman,
//! Sloan and Shirley, 2013) and hands XYZ to `palette` for the Lab step.
//! Anything else implementing [`Colorimeter`] can stand in for it.

use std::fmt;

use palette::color_difference::Ciede2000;
use palette::white_point::E;
use palette::{FromColor, Lab, Xyz};
use serde::{Deserialize, Serialize};

use crate::error::{KmError, Result};
use crate::spectrum::Spectrum;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XyzValue {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// CIELAB coordinates (`L*`, `a*`, `b*`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabValue {
    #[serde(rename = "L")]
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

impl LabValue {
    pub fn new(l: f64, a: f64, b: f64) -> Self {
        Self { l, a, b }
    }

    /// CIEDE2000 colour difference.
    pub fn delta_e00(&self, other: &LabValue) -> f64 {
        to_palette(self).difference(to_palette(other))
    }
}

fn to_palette(lab: &LabValue) -> Lab<E, f64> {
    Lab::new(lab.l, lab.a, lab.b)
}

impl fmt::Display for LabValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L*={:.2} a*={:.2} b*={:.2}", self.l, self.a, self.b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Observer {
    /// CIE 1931 2° standard observer
    #[default]
    Cie1931,
}

impl Observer {
    /// Colour matching functions `(x̄, ȳ, z̄)` at `nm`.
    pub fn cmf(self, nm: f64) -> (f64, f64, f64) {
        match self {
            Observer::Cie1931 => (x_fit_1931(nm), y_fit_1931(nm), z_fit_1931(nm)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Illuminant {
    /// Equal-energy illuminant
    #[default]
    E,
    /// Incandescent (Planckian, 2856 K)
    A,
}

impl Illuminant {
    /// Relative spectral power at `nm`, normalized to 100 at 560 nm.
    pub fn power(self, nm: f64) -> f64 {
        match self {
            Illuminant::E => 100.0,
            Illuminant::A => {
                const C2: f64 = 1.435e7;
                const T: f64 = 2848.0;
                100.0 * (560.0 / nm).powi(5) * ((C2 / (T * 560.0)).exp() - 1.0) / ((C2 / (T * nm)).exp() - 1.0)
            }
        }
    }
}

/// Converts reflectance spectra to colour coordinates.
pub trait Colorimeter: Send + Sync {
    /// Tristimulus values normalized so the illuminant itself has `Y = 1`.
    fn xyz(&self, reflectance: &Spectrum) -> Result<XyzValue>;

    fn lab(&self, reflectance: &Spectrum) -> Result<LabValue>;
}

/// Numerical integration against tabulated observer and illuminant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectralColorimeter {
    pub observer: Observer,
    pub illuminant: Illuminant,
}

impl SpectralColorimeter {
    pub fn new(observer: Observer, illuminant: Illuminant) -> Self {
        Self { observer, illuminant }
    }

    fn integrate(&self, reflectance: &Spectrum) -> Result<(XyzValue, XyzValue)> {
        if reflectance.is_empty() {
            return Err(KmError::invalid_parameter("reflectance", "empty spectrum"));
        }
        let mut sample = [0.0; 3];
        let mut white = [0.0; 3];
        for (nm, r) in reflectance.iter() {
            let nm = nm as f64;
            let s = self.illuminant.power(nm);
            let (xb, yb, zb) = self.observer.cmf(nm);
            for (k, cmf) in [xb, yb, zb].into_iter().enumerate() {
                white[k] += s * cmf;
                sample[k] += s * cmf * r;
            }
        }
        let norm = white[1];
        if norm <= 0.0 {
            return Err(KmError::Validation(format!(
                "no luminous power between {} and {} nm",
                reflectance.start_nm(),
                reflectance.end_nm()
            )));
        }
        let scale = |v: [f64; 3]| XyzValue {
            x: v[0] / norm,
            y: v[1] / norm,
            z: v[2] / norm,
        };
        Ok((scale(sample), scale(white)))
    }
}

impl Colorimeter for SpectralColorimeter {
    fn xyz(&self, reflectance: &Spectrum) -> Result<XyzValue> {
        self.integrate(reflectance).map(|(xyz, _)| xyz)
    }

    fn lab(&self, reflectance: &Spectrum) -> Result<LabValue> {
        let (xyz, white) = self.integrate(reflectance)?;
        // relative to the illuminant's own white, so the E white point applies
        let relative = Xyz::<E, f64>::new(xyz.x / white.x, xyz.y / white.y, xyz.z / white.z);
        let lab = Lab::<E, f64>::from_color(relative);
        Ok(LabValue::new(lab.l, lab.a, lab.b))
    }
}

fn x_fit_1931(nm: f64) -> f64 {
    let t1 = (nm - 442.0) * if nm < 442.0 { 0.0624 } else { 0.0374 };
    let t2 = (nm - 599.8) * if nm < 599.8 { 0.0264 } else { 0.0323 };
    let t3 = (nm - 501.1) * if nm < 501.1 { 0.0490 } else { 0.0382 };
    0.362 * (-0.5 * t1 * t1).exp() + 1.056 * (-0.5 * t2 * t2).exp() - 0.065 * (-0.5 * t3 * t3).exp()
}

fn y_fit_1931(nm: f64) -> f64 {
    let t1 = (nm - 568.8) * if nm < 568.8 { 0.0213 } else { 0.0247 };
    let t2 = (nm - 530.9) * if nm < 530.9 { 0.0613 } else { 0.0322 };
    0.821 * (-0.5 * t1 * t1).exp() + 0.286 * (-0.5 * t2 * t2).exp()
}

fn z_fit_1931(nm: f64) -> f64 {
    let t1 = (nm - 437.0) * if nm < 437.0 { 0.0845 } else { 0.0278 };
    let t2 = (nm - 459.0) * if nm < 459.0 { 0.0385 } else { 0.0725 };
    1.217 * (-0.5 * t1 * t1).exp() + 0.681 * (-0.5 * t2 * t2).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(value: f64) -> Spectrum {
        Spectrum::constant(400, 301, value)
    }

    #[test]
    fn test_perfect_white_is_neutral() {
        for illuminant in [Illuminant::E, Illuminant::A] {
            let colorimeter = SpectralColorimeter::new(Observer::Cie1931, illuminant);
            let lab = colorimeter.lab(&flat(1.0)).unwrap();
            assert!((lab.l - 100.0).abs() < 1e-6);
            assert!(lab.a.abs() < 1e-6);
            assert!(lab.b.abs() < 1e-6);
            assert!((colorimeter.xyz(&flat(1.0)).unwrap().y - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_grey_lightness() {
        let lab = SpectralColorimeter::default().lab(&flat(0.18)).unwrap();
        assert!((lab.l - 49.5).abs() < 0.1);
        assert!(SpectralColorimeter::default().lab(&flat(0.0)).unwrap().l.abs() < 1e-9);
    }

    #[test]
    fn test_red_reflector_has_positive_a() {
        let red = Spectrum::from_fn(400, 700, |nm| if nm > 600 { 0.8 } else { 0.05 });
        let lab = SpectralColorimeter::default().lab(&red).unwrap();
        assert!(lab.a > 20.0);
    }

    #[test]
    fn test_illuminant_a_anchor() {
        assert!((Illuminant::A.power(560.0) - 100.0).abs() < 1e-9);
        assert!(Illuminant::A.power(700.0) > Illuminant::A.power(400.0));
    }

    #[test]
    fn test_delta_e00() {
        let a = LabValue::new(50.0, 2.6772, -79.7751);
        let b = LabValue::new(50.0, 0.0, -82.7485);
        assert!(a.delta_e00(&a).abs() < 1e-12);
        // first pair of the Sharma et al. CIEDE2000 test data
        assert!((a.delta_e00(&b) - 2.0425).abs() < 1e-3);
    }

    #[test]
    fn test_empty_spectrum_rejected() {
        assert!(SpectralColorimeter::default().lab(&Spectrum::new(400, Vec::new())).is_err());
    }
}
