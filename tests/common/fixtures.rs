//! Synthetic measurements generated from known K and S.

use std::path::{Path, PathBuf};

use kubelka::formulate::km_reflectance;
use kubelka::{Background, Concentrations, Pigment, ReflectanceTable, SpectralSample, Spectrum};
use pigmix::models::AppConfig;

pub const START_NM: u32 = 400;
pub const END_NM: u32 = 420;

/// Contrast card reflectance over each background
pub const CARD_DARK: f64 = 0.05;
pub const CARD_LIGHT: f64 = 0.85;

pub const BASE_K: f64 = 0.05;
pub const BASE_S: f64 = 0.5;

/// Concentration series measured for each pigment
pub mod series {
    pub const RED: [f64; 4] = [0.001, 0.002, 0.004, 0.006];
    pub const WHITE: [f64; 4] = [0.01, 0.02, 0.04, 0.06];
}

fn position(nm: u32) -> f64 {
    (nm - START_NM) as f64 / (END_NM - START_NM) as f64
}

/// Absorption per unit concentration
pub fn unit_k(pigment: Pigment, nm: u32) -> f64 {
    match pigment {
        Pigment::Red => 40.0 * (1.0 - position(nm)) + 2.0,
        Pigment::White => 0.5,
        Pigment::Black => 900.0,
        Pigment::Yellow => 30.0 * position(nm) + 1.0,
    }
}

/// Scattering per unit concentration
pub fn unit_s(pigment: Pigment, _nm: u32) -> f64 {
    match pigment {
        Pigment::Red => 30.0,
        Pigment::White => 40.0,
        Pigment::Black => 20.0,
        Pigment::Yellow => 25.0,
    }
}

fn measured(pigment: Option<(Pigment, f64)>, rg: f64) -> Spectrum {
    Spectrum::from_fn(START_NM, END_NM, |nm| {
        let (k, s) = match pigment {
            Some((p, c)) => (BASE_K + c * unit_k(p, nm), BASE_S + c * unit_s(p, nm)),
            None => (BASE_K, BASE_S),
        };
        km_reflectance(rg, k, s)
    })
}

fn pair(code: &str, concentrations: Concentrations, dark: Spectrum, light: Spectrum) -> [SpectralSample; 2] {
    [
        SpectralSample::new(code, concentrations, Background::Dark, dark),
        SpectralSample::new(code, concentrations, Background::Light, light),
    ]
}

/// Card, base and monochrome RED and WHITE series.
pub fn measurement_table() -> ReflectanceTable {
    let card = |value: f64| Spectrum::from_fn(START_NM, END_NM, |_| value);
    let mut samples = Vec::new();
    samples.extend(pair("MU000", Concentrations::zero(), card(CARD_DARK), card(CARD_LIGHT)));
    samples.extend(pair(
        "MU999",
        Concentrations::zero(),
        measured(None, CARD_DARK),
        measured(None, CARD_LIGHT),
    ));

    let mut code = 10;
    for (pigment, concentrations) in [(Pigment::Red, series::RED), (Pigment::White, series::WHITE)] {
        for c in concentrations {
            samples.extend(pair(
                &format!("MU{:03}", code),
                Concentrations::zero().with(pigment, c),
                measured(Some((pigment, c)), CARD_DARK),
                measured(Some((pigment, c)), CARD_LIGHT),
            ));
            code += 1;
        }
    }
    ReflectanceTable::new(samples)
}

/// Configuration with a small degree grid to keep fits fast.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.calibration.poly_degree = 2;
    config
}

pub fn write_measurements(dir: &Path) -> PathBuf {
    let path = dir.join("measurements.json");
    pigmix::services::write_json(&path, &measurement_table()).unwrap();
    path
}
