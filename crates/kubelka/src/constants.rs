//! Calibration reference extraction.
//!
//! A measurement table mixes three kinds of rows: the contrast card
//! ([`CARD_CODE`]), the unpigmented base ([`BASE_CODE`]) and everything
//! else, which are colour-matching targets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KmError, Result};
use crate::pigment::{Background, Colorant};
use crate::spectrum::Spectrum;
use crate::table::{ReflectanceTable, SpectralSample};

/// Formula code of the neutral contrast card.
pub const CARD_CODE: &str = "MU000";
/// Formula code of the unpigmented base.
pub const BASE_CODE: &str = "MU999";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConstantName {
    /// Card over dark background
    Rgk,
    /// Card over light background
    Rgw,
    /// Base over dark background
    Rbk,
    /// Base over light background
    Rbw,
}

impl ConstantName {
    pub const ALL: [ConstantName; 4] = [
        ConstantName::Rgk,
        ConstantName::Rgw,
        ConstantName::Rbk,
        ConstantName::Rbw,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConstantName::Rgk => "Rgk",
            ConstantName::Rgw => "Rgw",
            ConstantName::Rbk => "Rbk",
            ConstantName::Rbw => "Rbw",
        }
    }

    /// `(formula code, background, subject)` identifying the constant's row.
    pub fn identity(self) -> (&'static str, Background, Colorant) {
        match self {
            ConstantName::Rgk => (CARD_CODE, Background::Dark, Colorant::Card),
            ConstantName::Rgw => (CARD_CODE, Background::Light, Colorant::Card),
            ConstantName::Rbk => (BASE_CODE, Background::Dark, Colorant::Base),
            ConstantName::Rbw => (BASE_CODE, Background::Light, Colorant::Base),
        }
    }
}

impl fmt::Display for ConstantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A reference row tagged with its semantic name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConstant {
    pub name: ConstantName,
    pub colorant: Colorant,
    pub sample: SpectralSample,
}

/// Extracted constants, in canonical `Rgk, Rgw, Rbk, Rbw` order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationConstants {
    rows: Vec<CalibrationConstant>,
}

impl CalibrationConstants {
    pub fn rows(&self) -> &[CalibrationConstant] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a single constant.
    ///
    /// # Errors
    ///
    /// [`KmError::EmptyResult`] when absent, [`KmError::Validation`] when the
    /// measurement table carried the row more than once.
    pub fn get(&self, name: ConstantName) -> Result<&CalibrationConstant> {
        let mut matching = self.rows.iter().filter(|c| c.name == name);
        let first = matching
            .next()
            .ok_or_else(|| KmError::EmptyResult(format!("constant {}", name)))?;
        if matching.next().is_some() {
            return Err(KmError::Validation(format!("duplicate constant {}", name)));
        }
        Ok(first)
    }

    /// Card reflectance over both backgrounds.
    pub fn card_reference(&self) -> Result<CardReference> {
        Ok(CardReference {
            dark: self.get(ConstantName::Rgk)?.sample.reflectance.clone(),
            light: self.get(ConstantName::Rgw)?.sample.reflectance.clone(),
        })
    }

    /// Base rows as a table (dark first), ready for base calibration.
    pub fn base_samples(&self) -> Result<ReflectanceTable> {
        Ok(ReflectanceTable::new(vec![
            self.get(ConstantName::Rbk)?.sample.clone(),
            self.get(ConstantName::Rbw)?.sample.clone(),
        ]))
    }
}

/// Extract the card and base reference rows.
///
/// `prefix` restricts the result to constants whose name starts with it
/// (`"Rg"` for the card only, `"Rb"` for the base only). Filtering happens
/// before the emptiness check.
///
/// # Errors
///
/// [`KmError::EmptyResult`] if nothing is left.
pub fn extract_constants(table: &ReflectanceTable, prefix: Option<&str>) -> Result<CalibrationConstants> {
    let rows: Vec<CalibrationConstant> = ConstantName::ALL
        .into_iter()
        .filter(|name| prefix.map_or(true, |p| name.name().starts_with(p)))
        .flat_map(|name| {
            let (code, background, colorant) = name.identity();
            table
                .samples()
                .iter()
                .filter(move |s| s.formula_code == code && s.background == background)
                .map(move |s| CalibrationConstant {
                    name,
                    colorant,
                    sample: s.clone(),
                })
        })
        .collect();

    if rows.is_empty() {
        return Err(KmError::EmptyResult(match prefix {
            Some(p) => format!("calibration constants with prefix {:?}", p),
            None => "calibration constants".to_string(),
        }));
    }
    tracing::debug!(count = rows.len(), ?prefix, "Extracted calibration constants");
    Ok(CalibrationConstants { rows })
}

/// Every row that is neither card nor base, sorted by formula code.
///
/// The sort is stable, so rows of one sample keep their relative order.
pub fn extract_targets(table: &ReflectanceTable) -> Result<ReflectanceTable> {
    let mut targets: Vec<SpectralSample> = table
        .samples()
        .iter()
        .filter(|s| s.formula_code != CARD_CODE && s.formula_code != BASE_CODE)
        .cloned()
        .collect();
    if targets.is_empty() {
        return Err(KmError::EmptyResult("targets".to_string()));
    }
    targets.sort_by(|a, b| a.formula_code.cmp(&b.formula_code));
    Ok(ReflectanceTable::new(targets))
}

/// Background reflectance `Rg` of the contrast card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardReference {
    pub dark: Spectrum,
    pub light: Spectrum,
}

impl CardReference {
    pub fn new(dark: Spectrum, light: Spectrum) -> Result<Self> {
        dark.ensure_same_grid(&light, "card light reference")?;
        Ok(Self { dark, light })
    }

    /// Ideal black (`Rg = 0`) and white (`Rg = 1`) backgrounds on the grid
    /// of `template`.
    pub fn ideal(template: &Spectrum) -> Self {
        Self {
            dark: Spectrum::constant(template.start_nm(), template.len(), 0.0),
            light: Spectrum::constant(template.start_nm(), template.len(), 1.0),
        }
    }

    pub fn for_background(&self, background: Background) -> &Spectrum {
        match background {
            Background::Dark => &self.dark,
            Background::Light => &self.light,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pigment::Concentrations;

    fn row(code: &str, bg: Background, value: f64) -> SpectralSample {
        SpectralSample::new(code, Concentrations::zero(), bg, Spectrum::constant(400, 3, value))
    }

    fn measurements() -> ReflectanceTable {
        ReflectanceTable::new(vec![
            row("MU043", Background::Dark, 0.2),
            row(CARD_CODE, Background::Light, 0.9),
            row(BASE_CODE, Background::Dark, 0.3),
            row(CARD_CODE, Background::Dark, 0.05),
            row("MU012", Background::Light, 0.4),
            row(BASE_CODE, Background::Light, 0.8),
            row("MU012", Background::Dark, 0.1),
        ])
    }

    #[test]
    fn test_constants_in_canonical_order() {
        let constants = extract_constants(&measurements(), None).unwrap();
        let names: Vec<_> = constants.rows().iter().map(|c| c.name).collect();
        assert_eq!(names, ConstantName::ALL.to_vec());
        assert_eq!(constants.rows()[2].colorant, Colorant::Base);

        let card = constants.card_reference().unwrap();
        assert_eq!(card.dark.values(), &[0.05; 3]);
        assert_eq!(card.for_background(Background::Light).values(), &[0.9; 3]);
    }

    #[test]
    fn test_prefix_filter_applies_before_empty_check() {
        let only_card = ReflectanceTable::new(vec![row(CARD_CODE, Background::Dark, 0.05)]);
        let card = extract_constants(&only_card, Some("Rg")).unwrap();
        assert_eq!(card.len(), 1);

        let err = extract_constants(&only_card, Some("Rb")).unwrap_err();
        assert!(matches!(err, KmError::EmptyResult(_)));
    }

    #[test]
    fn test_no_constants_is_empty_result() {
        let table = ReflectanceTable::new(vec![row("MU001", Background::Dark, 0.2)]);
        assert!(matches!(extract_constants(&table, None), Err(KmError::EmptyResult(_))));
    }

    #[test]
    fn test_targets_exclude_references_and_sort() {
        let targets = extract_targets(&measurements()).unwrap();
        let codes: Vec<_> = targets
            .samples()
            .iter()
            .map(|s| (s.formula_code.as_str(), s.background))
            .collect();
        assert_eq!(
            codes,
            vec![
                ("MU012", Background::Light),
                ("MU012", Background::Dark),
                ("MU043", Background::Dark),
            ]
        );
    }

    #[test]
    fn test_targets_empty_result() {
        let table = ReflectanceTable::new(vec![row(CARD_CODE, Background::Dark, 0.05)]);
        assert!(matches!(extract_targets(&table), Err(KmError::EmptyResult(_))));
    }

    #[test]
    fn test_missing_constant_lookup() {
        let table = ReflectanceTable::new(vec![row(CARD_CODE, Background::Dark, 0.05)]);
        let constants = extract_constants(&table, None).unwrap();
        assert!(constants.card_reference().is_err());
    }
}
