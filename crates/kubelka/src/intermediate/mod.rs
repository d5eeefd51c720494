//! Intermediate calibration variables `a, b, Sx, Kx, Kx/Sx`.
//!
//! A monochrome sample set (one pigment at several concentrations, each
//! measured over a dark and a light background) is turned into per-sample,
//! per-wavelength Kubelka-Munk auxiliaries. Two closed-form derivations are
//! available:
//!
//! - [`PaperA`] uses the measured card reflectance `Rgk`/`Rgw`.
//! - [`PaperB`] assumes ideal backgrounds (`Rgk = 0`, `Rgw = 1`).
//!
//! Both share `b = sqrt(a² - 1)` and `Kx = a·Sx - Sx`. Values outside the
//! physical regime (`a² < 1`, `acoth` inside `[-1, 1]`) come out as NaN.
//!
//! # Example
//!
//! ```
//! use kubelka::intermediate::{Calibrator, DerivationMethod, Variable};
//! use kubelka::{Background, CardReference, Concentrations, Pigment, ReflectanceTable, SpectralSample, Spectrum};
//!
//! let grid = Spectrum::constant(400, 3, 0.0);
//! let card = CardReference::ideal(&grid);
//! let red = Concentrations::zero().with(Pigment::Red, 0.1);
//! let table = ReflectanceTable::new(vec![
//!     SpectralSample::new("MU010", red, Background::Dark, Spectrum::constant(400, 3, 0.3)),
//!     SpectralSample::new("MU010", red, Background::Light, Spectrum::constant(400, 3, 0.5)),
//! ]);
//!
//! let result = Calibrator::new(DerivationMethod::PaperB, card).calibrate(&table).unwrap();
//! assert_eq!(result.rows_for(Variable::A).count(), 1);
//! ```

mod paper_a;
mod paper_b;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{CardReference, CARD_CODE};
use crate::error::{KmError, Result};
use crate::pigment::{Background, Colorant, Concentrations, Pigment};
use crate::spectrum::Spectrum;
use crate::table::{ReflectanceTable, SpectralSample};

pub use paper_a::PaperA;
pub use paper_b::PaperB;

/// Inverse hyperbolic cotangent, `atanh(1/x)`.
///
/// `±inf` at `x = ±1`, NaN strictly inside `(-1, 1)`.
#[inline]
pub fn acoth(x: f64) -> f64 {
    (1.0 / x).atanh()
}

/// `sqrt(a² - 1)`, NaN where `a² < 1`.
#[inline]
pub fn calculate_b(a: f64) -> f64 {
    (a * a - 1.0).sqrt()
}

/// Name of a row in an [`IntermediateTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variable {
    #[serde(rename = "Rg-dark")]
    RgDark,
    #[serde(rename = "Rg-light")]
    RgLight,
    #[serde(rename = "a")]
    A,
    #[serde(rename = "b")]
    B,
    #[serde(rename = "Sx")]
    Sx,
    #[serde(rename = "Kx")]
    Kx,
    #[serde(rename = "Kx/Sx")]
    KxSx,
}

impl Variable {
    /// Derived variables, in output order.
    pub const DERIVED: [Variable; 5] = [Variable::A, Variable::B, Variable::Sx, Variable::Kx, Variable::KxSx];

    pub fn name(self) -> &'static str {
        match self {
            Variable::RgDark => "Rg-dark",
            Variable::RgLight => "Rg-light",
            Variable::A => "a",
            Variable::B => "b",
            Variable::Sx => "Sx",
            Variable::Kx => "Kx",
            Variable::KxSx => "Kx/Sx",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tag selecting a closed-form derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivationMethod {
    PaperA,
    PaperB,
}

impl DerivationMethod {
    pub const ALL: [DerivationMethod; 2] = [DerivationMethod::PaperA, DerivationMethod::PaperB];

    pub fn name(self) -> &'static str {
        match self {
            DerivationMethod::PaperA => "paper_a",
            DerivationMethod::PaperB => "paper_b",
        }
    }

    /// The derivation implementing this tag.
    pub fn derivation(self) -> &'static dyn Derivation {
        match self {
            DerivationMethod::PaperA => &PaperA,
            DerivationMethod::PaperB => &PaperB,
        }
    }
}

impl fmt::Display for DerivationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DerivationMethod {
    type Err = KmError;

    fn from_str(s: &str) -> Result<Self> {
        DerivationMethod::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| KmError::invalid_parameter("method", s))
    }
}

/// The five derived spectra for one dark/light sample pair.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSet {
    pub a: Spectrum,
    pub b: Spectrum,
    pub sx: Spectrum,
    pub kx: Spectrum,
    pub kxsx: Spectrum,
}

impl VariableSet {
    pub fn get(&self, variable: Variable) -> Option<&Spectrum> {
        match variable {
            Variable::A => Some(&self.a),
            Variable::B => Some(&self.b),
            Variable::Sx => Some(&self.sx),
            Variable::Kx => Some(&self.kx),
            Variable::KxSx => Some(&self.kxsx),
            Variable::RgDark | Variable::RgLight => None,
        }
    }
}

/// A closed-form route from dark/light reflectance to `a` and `Sx`.
///
/// `dark` and `light` are the sample's reflectance over each background;
/// `card` is the measured background reflectance, which implementations may
/// ignore. All spectra share one grid.
pub trait Derivation: Send + Sync {
    fn method(&self) -> DerivationMethod;

    fn compute_a(&self, card: &CardReference, dark: &Spectrum, light: &Spectrum) -> Spectrum;

    fn compute_b(&self, a: &Spectrum) -> Spectrum {
        a.map(calculate_b)
    }

    fn compute_sx(&self, card: &CardReference, dark: &Spectrum, a: &Spectrum, b: &Spectrum) -> Spectrum;

    fn compute_kx(&self, a: &Spectrum, sx: &Spectrum) -> Spectrum {
        a.zip_map(sx, |a, sx| a * sx - sx)
    }

    fn compute_intermediate_variables(&self, card: &CardReference, dark: &Spectrum, light: &Spectrum) -> VariableSet {
        let a = self.compute_a(card, dark, light);
        let b = self.compute_b(&a);
        let sx = self.compute_sx(card, dark, &a, &b);
        let kx = self.compute_kx(&a, &sx);
        let kxsx = kx.zip_map(&sx, |k, s| k / s);
        VariableSet { a, b, sx, kx, kxsx }
    }
}

/// One row of the long calibration output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateRow {
    pub colorant: Colorant,
    /// `None` for reference rows, written as `"n/a"`.
    #[serde(with = "method_tag")]
    pub method: Option<DerivationMethod>,
    pub variable: Variable,
    pub formula_code: String,
    pub concentrations: Concentrations,
    pub values: Spectrum,
}

/// Method tag of rows that no derivation produced.
pub const NOT_APPLICABLE: &str = "n/a";

mod method_tag {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{DerivationMethod, NOT_APPLICABLE};

    pub fn serialize<S: Serializer>(method: &Option<DerivationMethod>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(method.map_or(NOT_APPLICABLE, DerivationMethod::name))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DerivationMethod>, D::Error> {
        let tag = String::deserialize(deserializer)?;
        if tag == NOT_APPLICABLE {
            return Ok(None);
        }
        tag.parse().map(Some).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntermediateTable {
    rows: Vec<IntermediateRow>,
}

impl IntermediateTable {
    pub fn new(rows: Vec<IntermediateRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[IntermediateRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<IntermediateRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows_for(&self, variable: Variable) -> impl Iterator<Item = &IntermediateRow> + '_ {
        self.rows.iter().filter(move |r| r.variable == variable)
    }

    /// Append another calibration run. Card reference rows already in the
    /// table are not repeated.
    pub fn extend(&mut self, other: IntermediateTable) {
        for row in other.rows {
            let repeated = row.colorant == Colorant::Card
                && self.rows.iter().any(|r| {
                    r.colorant == Colorant::Card && r.variable == row.variable && r.formula_code == row.formula_code
                });
            if !repeated {
                self.rows.push(row);
            }
        }
    }
}

impl FromIterator<IntermediateRow> for IntermediateTable {
    fn from_iter<T: IntoIterator<Item = IntermediateRow>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// First pigment with any non-zero concentration, else [`Colorant::Base`].
pub fn identify_colorant(table: &ReflectanceTable) -> Colorant {
    Pigment::ALL
        .into_iter()
        .find(|&p| table.samples().iter().any(|s| s.concentrations.get(p) != 0.0))
        .map(Colorant::Pigment)
        .unwrap_or(Colorant::Base)
}

/// Remove rows whose concentration of `pigment` has one of the given ranks.
///
/// Ranks index the sorted unique concentrations; negative indices count from
/// the end.
///
/// # Errors
///
/// - [`KmError::ConcentrationIndexOutOfRange`] for an index without a rank.
/// - [`KmError::InsufficientData`] when every row is dropped.
pub fn drop_concentrations(table: &ReflectanceTable, pigment: Pigment, indices: &[i64]) -> Result<ReflectanceTable> {
    let mut unique: Vec<f64> = table.samples().iter().map(|s| s.concentrations.get(pigment)).collect();
    unique.sort_by(f64::total_cmp);
    unique.dedup();

    let available = unique.len();
    let dropped = indices
        .iter()
        .map(|&index| {
            let resolved = if index < 0 { index + available as i64 } else { index };
            usize::try_from(resolved)
                .ok()
                .and_then(|i| unique.get(i).copied())
                .ok_or(KmError::ConcentrationIndexOutOfRange { index, available })
        })
        .collect::<Result<Vec<f64>>>()?;

    let kept = table.filter(|s| !dropped.contains(&s.concentrations.get(pigment)));
    if kept.is_empty() {
        return Err(KmError::InsufficientData(format!(
            "no monochrome samples left after dropping concentration indices {:?}",
            indices
        )));
    }
    tracing::debug!(%pigment, ?dropped, kept = kept.len(), "Dropped concentrations");
    Ok(kept)
}

/// Turns a monochrome sample set into an [`IntermediateTable`].
#[derive(Debug, Clone)]
pub struct Calibrator {
    method: DerivationMethod,
    card: CardReference,
    exclude: Vec<i64>,
}

impl Calibrator {
    pub fn new(method: DerivationMethod, card: CardReference) -> Self {
        Self {
            method,
            card,
            exclude: Vec::new(),
        }
    }

    /// Concentration ranks to leave out, see [`drop_concentrations`].
    #[inline]
    pub fn exclude_concentrations(mut self, indices: Vec<i64>) -> Self {
        self.exclude = indices;
        self
    }

    pub fn method(&self) -> DerivationMethod {
        self.method
    }

    /// Derive the variables of every dark/light pair in `monochrome`.
    ///
    /// Rows are paired by position within each background. The output holds
    /// the two card reference rows, then every pair's `a`, then every `b`,
    /// and so on through `Kx/Sx`.
    pub fn calibrate(&self, monochrome: &ReflectanceTable) -> Result<IntermediateTable> {
        let colorant = identify_colorant(monochrome);
        let filtered;
        let monochrome = match colorant {
            Colorant::Pigment(pigment) if !self.exclude.is_empty() => {
                filtered = drop_concentrations(monochrome, pigment, &self.exclude)?;
                &filtered
            }
            _ => monochrome,
        };

        let pairs = pair_backgrounds(monochrome)?;
        for (dark, _) in &pairs {
            self.card.dark.ensure_same_grid(&dark.reflectance, &dark.formula_code)?;
        }
        self.card.dark.ensure_same_grid(&self.card.light, "card light reference")?;

        let derivation = self.method.derivation();
        let sets: Vec<VariableSet> = pairs
            .iter()
            .map(|(dark, light)| {
                derivation.compute_intermediate_variables(&self.card, &dark.reflectance, &light.reflectance)
            })
            .collect();

        let mut rows = Vec::with_capacity(2 + pairs.len() * Variable::DERIVED.len());
        for (variable, values) in [(Variable::RgDark, &self.card.dark), (Variable::RgLight, &self.card.light)] {
            rows.push(IntermediateRow {
                colorant: Colorant::Card,
                method: None,
                variable,
                formula_code: CARD_CODE.to_string(),
                concentrations: Concentrations::zero(),
                values: values.clone(),
            });
        }
        for variable in Variable::DERIVED {
            for ((dark, _), set) in pairs.iter().zip(&sets) {
                if let Some(values) = set.get(variable) {
                    rows.push(IntermediateRow {
                        colorant,
                        method: Some(self.method),
                        variable,
                        formula_code: dark.formula_code.clone(),
                        concentrations: dark.concentrations,
                        values: values.clone(),
                    });
                }
            }
        }

        tracing::debug!(
            %colorant,
            method = %self.method,
            samples = pairs.len(),
            "Computed intermediate variables"
        );
        Ok(IntermediateTable::new(rows))
    }
}

fn pair_backgrounds(table: &ReflectanceTable) -> Result<Vec<(&SpectralSample, &SpectralSample)>> {
    let dark = table.by_background(Background::Dark);
    let light = table.by_background(Background::Light);

    if dark.is_empty() && light.is_empty() {
        return Err(KmError::EmptyResult("monochrome samples".to_string()));
    }
    if dark.len() != light.len() {
        return Err(KmError::Validation(format!(
            "{} dark rows but {} light rows",
            dark.len(),
            light.len()
        )));
    }
    dark.into_iter()
        .zip(light)
        .map(|(d, l)| {
            if d.formula_code != l.formula_code {
                return Err(KmError::Validation(format!(
                    "dark row {} paired with light row {}",
                    d.formula_code, l.formula_code
                )));
            }
            d.reflectance.ensure_same_grid(&l.reflectance, &l.formula_code)?;
            Ok((d, l))
        })
        .collect()
}
