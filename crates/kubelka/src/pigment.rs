//! Pigments, backgrounds and concentration vectors.
//!
//! The pigment set is fixed. Concentrations are stored densely, indexed by
//! [`Pigment`], so a missing pigment is simply a zero entry.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{KmError, Result};

/// One of the fixed, calibrated pigments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Pigment {
    Black,
    Red,
    White,
    Yellow,
}

impl Pigment {
    /// Every pigment, in canonical column order.
    pub const ALL: [Pigment; 4] = [Pigment::Black, Pigment::Red, Pigment::White, Pigment::Yellow];

    /// Upper-case column name (`"BLACK"`, `"RED"`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Pigment::Black => "BLACK",
            Pigment::Red => "RED",
            Pigment::White => "WHITE",
            Pigment::Yellow => "YELLOW",
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Pigment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Pigment {
    type Err = KmError;

    fn from_str(s: &str) -> Result<Self> {
        Pigment::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| KmError::invalid_parameter("pigment", s))
    }
}

/// Subject of a calibration row.
///
/// Monochrome samples calibrate a [`Pigment`]; samples without any pigment
/// calibrate the unpigmented `Base`; the contrast `Card` only ever appears
/// as reference reflectance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Colorant {
    Pigment(Pigment),
    Base,
    Card,
}

impl Colorant {
    pub fn pigment(self) -> Option<Pigment> {
        match self {
            Colorant::Pigment(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for Colorant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Colorant::Pigment(p) => write!(f, "{}", p),
            Colorant::Base => f.write_str("base"),
            Colorant::Card => f.write_str("card"),
        }
    }
}

impl From<Colorant> for String {
    fn from(colorant: Colorant) -> Self {
        colorant.to_string()
    }
}

impl TryFrom<String> for Colorant {
    type Error = KmError;

    fn try_from(value: String) -> Result<Self> {
        match value.as_str() {
            "base" => Ok(Colorant::Base),
            "card" => Ok(Colorant::Card),
            other => other.parse().map(Colorant::Pigment),
        }
    }
}

/// Backing used while measuring a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Background {
    #[serde(rename = "D")]
    Dark,
    #[serde(rename = "L")]
    Light,
}

impl Background {
    pub const ALL: [Background; 2] = [Background::Dark, Background::Light];

    pub fn code(self) -> &'static str {
        match self {
            Background::Dark => "D",
            Background::Light => "L",
        }
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Concentration of every pigment in a mixture.
///
/// Values are non-negative. Serialized as a `{"RED": 0.1, ...}` map; unknown
/// pigment names are rejected and missing ones default to zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct Concentrations([f64; 4]);

impl Concentrations {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Build from values in [`Pigment::ALL`] order.
    ///
    /// # Errors
    ///
    /// Returns [`KmError::InvalidParameter`] for negative or non-finite values.
    pub fn new(values: [f64; 4]) -> Result<Self> {
        for (pigment, value) in Pigment::ALL.iter().zip(values) {
            validate_concentration(*pigment, value)?;
        }
        Ok(Self(values))
    }

    /// Build from `(name, value)` pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut values = [0.0; 4];
        for (name, value) in pairs {
            let pigment: Pigment = name.parse()?;
            validate_concentration(pigment, value)?;
            values[pigment.index()] = value;
        }
        Ok(Self(values))
    }

    /// Return a copy with one pigment changed. Negative values become zero.
    #[inline]
    pub fn with(mut self, pigment: Pigment, value: f64) -> Self {
        self.0[pigment.index()] = value.max(0.0);
        self
    }

    #[inline]
    pub fn get(&self, pigment: Pigment) -> f64 {
        self.0[pigment.index()]
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn as_array(&self) -> [f64; 4] {
        self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pigment, f64)> + '_ {
        Pigment::ALL.into_iter().map(move |p| (p, self.get(p)))
    }

    /// Pigments with a non-zero concentration.
    pub fn active_pigments(&self) -> Vec<Pigment> {
        self.iter().filter(|(_, c)| *c != 0.0).map(|(p, _)| p).collect()
    }
}

fn validate_concentration(pigment: Pigment, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(KmError::invalid_parameter(
            format!("concentration[{}]", pigment),
            value,
        ));
    }
    Ok(())
}

impl TryFrom<BTreeMap<String, f64>> for Concentrations {
    type Error = KmError;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self> {
        Self::from_pairs(map.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

impl From<Concentrations> for BTreeMap<String, f64> {
    fn from(c: Concentrations) -> Self {
        c.iter().map(|(p, v)| (p.name().to_string(), v)).collect()
    }
}
