//! Reflectance tables: one row per (sample, background) pair.
//!
//! A [`ReflectanceTable`] is the wide form every pipeline stage consumes.
//! [`LongRecord`] is the equivalent long form, one value per wavelength,
//! used for export and for tables assembled value by value.

use serde::{Deserialize, Serialize};

use crate::colorimetry::LabValue;
use crate::error::{KmError, Result};
use crate::pigment::{Background, Concentrations};
use crate::spectrum::Spectrum;

/// One measured (or predicted) sample on one background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralSample {
    pub formula_code: String,
    #[serde(default)]
    pub concentrations: Concentrations,
    pub background: Background,
    pub reflectance: Spectrum,
    /// Lab annotation supplied with the measurement, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab: Option<LabValue>,
}

impl SpectralSample {
    pub fn new(
        formula_code: impl Into<String>,
        concentrations: Concentrations,
        background: Background,
        reflectance: Spectrum,
    ) -> Self {
        Self {
            formula_code: formula_code.into(),
            concentrations,
            background,
            reflectance,
            lab: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReflectanceTable {
    samples: Vec<SpectralSample>,
}

impl ReflectanceTable {
    pub fn new(samples: Vec<SpectralSample>) -> Self {
        Self { samples }
    }

    #[inline]
    pub fn samples(&self) -> &[SpectralSample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<SpectralSample> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn push(&mut self, sample: SpectralSample) {
        self.samples.push(sample);
    }

    /// Rows matching `predicate`, cloned into a new table.
    pub fn filter(&self, predicate: impl Fn(&SpectralSample) -> bool) -> Self {
        self.samples.iter().filter(|s| predicate(s)).cloned().collect()
    }

    /// Rows measured on `background`, in table order.
    pub fn by_background(&self, background: Background) -> Vec<&SpectralSample> {
        self.samples
            .iter()
            .filter(|s| s.background == background)
            .collect()
    }

    /// Check every row shares one wavelength grid and return a template
    /// spectrum of that grid. `None` for an empty table.
    pub fn validate_grid(&self) -> Result<Option<&Spectrum>> {
        let Some(first) = self.samples.first() else {
            return Ok(None);
        };
        for sample in &self.samples[1..] {
            first
                .reflectance
                .ensure_same_grid(&sample.reflectance, &sample.formula_code)?;
        }
        Ok(Some(&first.reflectance))
    }

    /// Melt into one record per (row, wavelength).
    pub fn to_long(&self) -> Vec<LongRecord> {
        self.samples
            .iter()
            .flat_map(|s| {
                s.reflectance.iter().map(move |(wavelength, value)| LongRecord {
                    formula_code: s.formula_code.clone(),
                    background: s.background,
                    concentrations: s.concentrations,
                    wavelength,
                    value,
                })
            })
            .collect()
    }

    /// Pivot long records back into rows.
    ///
    /// Records of one row must be consecutive and ascend by exactly 1 nm.
    pub fn from_long(records: &[LongRecord]) -> Result<Self> {
        let mut samples = Vec::new();
        let mut rest = records;

        while let Some(head) = rest.first() {
            let row_len = rest
                .iter()
                .take_while(|r| r.formula_code == head.formula_code && r.background == head.background)
                .count();
            let (row, tail) = rest.split_at(row_len);

            for pair in row.windows(2) {
                if pair[1].wavelength != pair[0].wavelength + 1 {
                    return Err(KmError::Validation(format!(
                        "{} ({}): wavelength {} does not follow {}",
                        head.formula_code, head.background, pair[1].wavelength, pair[0].wavelength
                    )));
                }
            }

            samples.push(SpectralSample::new(
                head.formula_code.clone(),
                head.concentrations,
                head.background,
                Spectrum::new(head.wavelength, row.iter().map(|r| r.value).collect()),
            ));
            rest = tail;
        }

        Ok(Self { samples })
    }
}

impl FromIterator<SpectralSample> for ReflectanceTable {
    fn from_iter<T: IntoIterator<Item = SpectralSample>>(iter: T) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

/// One (row, wavelength) value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongRecord {
    pub formula_code: String,
    pub background: Background,
    pub concentrations: Concentrations,
    pub wavelength: u32,
    pub value: f64,
}
