//! Forward model: concentrations → predicted reflectance.

use serde::{Deserialize, Serialize};

use crate::constants::CardReference;
use crate::error::Result;
use crate::mixer::KmMixer;
use crate::pigment::{Background, Concentrations, Pigment};
use crate::spectrum::Spectrum;

/// Below this magnitude `coth(x)` is taken as `1/x`.
pub const COTH_SMALL_ARG: f64 = 1e-6;

const A_MIN: f64 = 1.0 + 1e-10;
const A_MAX: f64 = 1e10;

/// Hyperbolic cotangent with a first-order expansion near zero.
#[inline]
pub fn coth(x: f64) -> f64 {
    if x.abs() < COTH_SMALL_ARG {
        1.0 / x
    } else {
        1.0 / x.tanh()
    }
}

/// Two-constant Kubelka-Munk reflectance of a layer with absorption `k`
/// and scattering `s` over a background of reflectance `rg`.
///
/// ```text
/// R = [1 - Rg·(a - b·coth(b·S))] / [a - Rg + b·coth(b·S)]
/// a = clamp(K/S + 1, 1 + 1e-10, 1e10),  b = sqrt(a² - 1)
/// ```
#[inline]
pub fn km_reflectance(rg: f64, k: f64, s: f64) -> f64 {
    let a = (k / s + 1.0).clamp(A_MIN, A_MAX);
    let b = (a * a - 1.0).sqrt();
    let cb = b * coth(b * s);
    (1.0 - rg * (a - cb)) / (a - rg + cb)
}

/// [`km_reflectance`] wavelength by wavelength.
pub fn two_constant_reflectance(rg: &Spectrum, k: &Spectrum, s: &Spectrum) -> Spectrum {
    let values = rg
        .values()
        .iter()
        .zip(k.values().iter().zip(s.values()))
        .map(|(&rg, (&k, &s))| km_reflectance(rg, k, s))
        .collect();
    Spectrum::new(rg.start_nm(), values)
}

/// Predicted reflectance of one mixture on one background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedReflectance {
    pub concentrations: Concentrations,
    pub background: Background,
    pub reflectance: Spectrum,
}

/// Mixes K and S for given concentrations and turns them into reflectance
/// over the card's dark and light backgrounds.
#[derive(Debug, Clone)]
pub struct Formulator {
    card: CardReference,
    mixer: KmMixer,
}

impl Formulator {
    pub fn new(card: CardReference, mixer: KmMixer) -> Result<Self> {
        mixer.grid().ensure_same_grid(&card.dark, "card dark reference")?;
        mixer.grid().ensure_same_grid(&card.light, "card light reference")?;
        Ok(Self { card, mixer })
    }

    pub fn mixer(&self) -> &KmMixer {
        &self.mixer
    }

    pub fn card(&self) -> &CardReference {
        &self.card
    }

    /// Pigments the models can vary.
    pub fn pigments(&self) -> Vec<Pigment> {
        self.mixer.models().pigments()
    }

    pub fn reflectance(&self, concentrations: &Concentrations, background: Background) -> Spectrum {
        let mixed = self.mixer.mix(concentrations);
        two_constant_reflectance(self.card.for_background(background), &mixed.k, &mixed.s)
    }

    /// Dark then light prediction for every mixture, in input order.
    pub fn calculate_reflectance(&self, mixtures: &[Concentrations]) -> Vec<PredictedReflectance> {
        mixtures
            .iter()
            .flat_map(|c| {
                let mixed = self.mixer.mix(c);
                Background::ALL.map(|background| PredictedReflectance {
                    concentrations: *c,
                    background,
                    reflectance: two_constant_reflectance(
                        self.card.for_background(background),
                        &mixed.k,
                        &mixed.s,
                    ),
                })
            })
            .collect()
    }
}
