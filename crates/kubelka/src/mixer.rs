//! Mixture K, S and K/S from per-pigment models plus the base.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{KmError, Result};
use crate::intermediate::{IntermediateTable, Variable};
use crate::pigment::{Colorant, Concentrations, Pigment};
use crate::regression::{FitRecord, KmQuantity, PolynomialModel};
use crate::spectrum::Spectrum;

/// One fitted model as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub colorant: Colorant,
    pub quantity: KmQuantity,
    pub model: PolynomialModel,
}

/// Validated set of pigment models: for each pigment present, exactly one
/// model per [`KmQuantity`].
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTable {
    models: BTreeMap<(Pigment, KmQuantity), PolynomialModel>,
}

impl ModelTable {
    /// Build from selected fit records.
    pub fn new(records: &[FitRecord]) -> Result<Self> {
        let entries = records
            .iter()
            .map(|r| {
                let model = r.model.clone().ok_or_else(|| {
                    KmError::Validation(format!("{} {} ({}) has no fitted model", r.pigment, r.quantity, r.method))
                })?;
                Ok(ModelEntry {
                    colorant: Colorant::Pigment(r.pigment),
                    quantity: r.quantity,
                    model,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_entries(entries)
    }

    /// # Errors
    ///
    /// [`KmError::Validation`] when an entry is not a pigment, a pigment has
    /// a duplicated or missing quantity, or the models disagree on the
    /// wavelength grid.
    pub fn from_entries(entries: Vec<ModelEntry>) -> Result<Self> {
        let unexpected: Vec<String> = entries
            .iter()
            .filter(|e| e.colorant.pigment().is_none())
            .map(|e| e.colorant.to_string())
            .collect();
        if !unexpected.is_empty() {
            return Err(KmError::Validation(format!(
                "unexpected colorant(s) in model table: {}",
                unexpected.join(", ")
            )));
        }

        let mut models = BTreeMap::new();
        let mut grid: Option<Spectrum> = None;
        for entry in entries {
            let Some(pigment) = entry.colorant.pigment() else {
                continue;
            };
            match (&grid, entry.model.grid()) {
                (Some(g), Some(m)) => g.ensure_same_grid(m, &format!("{} {}", pigment, entry.quantity))?,
                (None, Some(m)) => grid = Some(m.clone()),
                _ => {}
            }
            if models.insert((pigment, entry.quantity), entry.model).is_some() {
                return Err(KmError::Validation(format!(
                    "duplicate {} model for {}",
                    entry.quantity, pigment
                )));
            }
        }

        for pigment in Pigment::ALL {
            let present: Vec<KmQuantity> = KmQuantity::ALL
                .into_iter()
                .filter(|q| models.contains_key(&(pigment, *q)))
                .collect();
            if present.is_empty() || present.len() == KmQuantity::ALL.len() {
                continue;
            }
            let missing: Vec<&str> = KmQuantity::ALL
                .into_iter()
                .filter(|q| !present.contains(q))
                .map(KmQuantity::name)
                .collect();
            return Err(KmError::Validation(format!(
                "missing {} model for {}",
                missing.join(", "),
                pigment
            )));
        }

        Ok(Self { models })
    }

    pub fn get(&self, pigment: Pigment, quantity: KmQuantity) -> Option<&PolynomialModel> {
        self.models.get(&(pigment, quantity))
    }

    /// Pigments with models, in canonical order.
    pub fn pigments(&self) -> Vec<Pigment> {
        Pigment::ALL
            .into_iter()
            .filter(|p| self.models.contains_key(&(*p, KmQuantity::K)))
            .collect()
    }

    pub fn entries(&self) -> Vec<ModelEntry> {
        self.models
            .iter()
            .map(|((p, q), m)| ModelEntry {
                colorant: Colorant::Pigment(*p),
                quantity: *q,
                model: m.clone(),
            })
            .collect()
    }

    fn grid(&self) -> Option<&Spectrum> {
        self.models.values().next().and_then(PolynomialModel::grid)
    }
}

/// One base quantity as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseEntry {
    pub quantity: KmQuantity,
    pub values: Spectrum,
}

/// Fixed K, S and K/S contribution of the unpigmented base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<BaseEntry>", into = "Vec<BaseEntry>")]
pub struct BaseKm {
    k: Spectrum,
    s: Spectrum,
    ks: Spectrum,
}

impl BaseKm {
    /// # Errors
    ///
    /// [`KmError::Validation`] naming any quantity given twice or not at all.
    pub fn new(entries: Vec<BaseEntry>) -> Result<Self> {
        let mut found: BTreeMap<KmQuantity, Spectrum> = BTreeMap::new();
        for entry in entries {
            if found.insert(entry.quantity, entry.values).is_some() {
                return Err(KmError::Validation(format!("duplicate base quantity {}", entry.quantity)));
            }
        }
        let mut take = |q: KmQuantity| {
            found
                .remove(&q)
                .ok_or_else(|| KmError::Validation(format!("missing base quantity {}", q)))
        };
        let (k, s, ks) = (take(KmQuantity::K)?, take(KmQuantity::S)?, take(KmQuantity::Ks)?);
        k.ensure_same_grid(&s, "base S")?;
        k.ensure_same_grid(&ks, "base K/S")?;
        Ok(Self { k, s, ks })
    }

    /// Take `Kx`, `Sx` and `Kx/Sx` of the base rows as `K`, `S` and `K/S`.
    pub fn from_intermediate(table: &IntermediateTable) -> Result<Self> {
        let entries = table
            .rows()
            .iter()
            .filter(|r| r.colorant == Colorant::Base)
            .filter_map(|r| {
                let quantity = match r.variable {
                    Variable::Kx => KmQuantity::K,
                    Variable::Sx => KmQuantity::S,
                    Variable::KxSx => KmQuantity::Ks,
                    _ => return None,
                };
                Some(BaseEntry {
                    quantity,
                    values: r.values.clone(),
                })
            })
            .collect();
        Self::new(entries)
    }

    /// Zero contribution on the grid of `template`.
    pub fn zero(template: &Spectrum) -> Self {
        let zero = Spectrum::constant(template.start_nm(), template.len(), 0.0);
        Self {
            k: zero.clone(),
            s: zero.clone(),
            ks: zero,
        }
    }

    pub fn get(&self, quantity: KmQuantity) -> &Spectrum {
        match quantity {
            KmQuantity::K => &self.k,
            KmQuantity::S => &self.s,
            KmQuantity::Ks => &self.ks,
        }
    }
}

impl TryFrom<Vec<BaseEntry>> for BaseKm {
    type Error = KmError;

    fn try_from(entries: Vec<BaseEntry>) -> Result<Self> {
        Self::new(entries)
    }
}

impl From<BaseKm> for Vec<BaseEntry> {
    fn from(base: BaseKm) -> Self {
        vec![
            BaseEntry {
                quantity: KmQuantity::K,
                values: base.k,
            },
            BaseEntry {
                quantity: KmQuantity::S,
                values: base.s,
            },
            BaseEntry {
                quantity: KmQuantity::Ks,
                values: base.ks,
            },
        ]
    }
}

/// Mixed constants of one mixture.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedKm {
    pub k: Spectrum,
    pub s: Spectrum,
    pub ks: Spectrum,
}

/// One (mixture, quantity) output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixRow {
    pub concentrations: Concentrations,
    pub quantity: KmQuantity,
    pub values: Spectrum,
}

/// Sums pigment contributions and the base per wavelength.
#[derive(Debug, Clone)]
pub struct KmMixer {
    models: ModelTable,
    base: BaseKm,
}

impl KmMixer {
    pub fn new(models: ModelTable, base: BaseKm) -> Result<Self> {
        if let Some(grid) = models.grid() {
            grid.ensure_same_grid(&base.k, "base K")?;
        }
        Ok(Self { models, base })
    }

    pub fn models(&self) -> &ModelTable {
        &self.models
    }

    pub fn base(&self) -> &BaseKm {
        &self.base
    }

    /// Wavelength grid of every mixed spectrum.
    pub fn grid(&self) -> &Spectrum {
        &self.base.k
    }

    /// Base value plus each pigment's model at its concentration. Pigments
    /// at zero or without a model contribute nothing.
    pub fn mix_quantity(&self, concentrations: &Concentrations, quantity: KmQuantity) -> Spectrum {
        let mut values = self.base.get(quantity).values().to_vec();
        for (pigment, c) in concentrations.iter() {
            if c == 0.0 {
                continue;
            }
            if let Some(model) = self.models.get(pigment, quantity) {
                for (v, p) in values.iter_mut().zip(model.predict(c).values()) {
                    *v += p;
                }
            }
        }
        Spectrum::new(self.base.k.start_nm(), values)
    }

    pub fn mix(&self, concentrations: &Concentrations) -> MixedKm {
        MixedKm {
            k: self.mix_quantity(concentrations, KmQuantity::K),
            s: self.mix_quantity(concentrations, KmQuantity::S),
            ks: self.mix_quantity(concentrations, KmQuantity::Ks),
        }
    }

    /// Three rows (`K`, `S`, `K/S`) per mixture, in input order.
    pub fn predict_km_constants(&self, mixtures: &[Concentrations]) -> Vec<MixRow> {
        mixtures
            .iter()
            .flat_map(|c| {
                KmQuantity::ALL.map(|quantity| MixRow {
                    concentrations: *c,
                    quantity,
                    values: self.mix_quantity(c, quantity),
                })
            })
            .collect()
    }
}
