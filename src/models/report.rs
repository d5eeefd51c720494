use kubelka::formulate::PredictedReflectance;
use kubelka::intermediate::IntermediateTable;
use kubelka::mixer::{BaseKm, KmMixer, MixRow, ModelEntry, ModelTable};
use kubelka::optimize::{BatchReport, MatchHistory, OptimizationResult, ReflectanceEntry, TargetFailure};
use kubelka::regression::FitRecord;
use kubelka::{CardReference, Formulator};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

/// Everything formulation and matching need from a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationModel {
    pub card: CardReference,
    pub base: BaseKm,
    pub models: Vec<ModelEntry>,
}

impl CalibrationModel {
    /// Validate the model set and build the forward model from it.
    pub fn formulator(&self) -> AppResult<Formulator> {
        let table = ModelTable::from_entries(self.models.clone())?;
        let mixer = KmMixer::new(table, self.base.clone())?;
        Ok(Formulator::new(self.card.clone(), mixer)?)
    }
}

/// Full output of `pigmix calibrate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub model: CalibrationModel,
    /// Derived variables of every pigment and method, then the base
    pub intermediate: IntermediateTable,
    /// Every fitted candidate, including the ones not selected
    pub fits: Vec<FitRecord>,
}

/// Full output of `pigmix formulate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulationReport {
    /// Dark then light reflectance per mixture
    pub reflectances: Vec<PredictedReflectance>,
    /// `K`, `S` and `K/S` per mixture
    pub constants: Vec<MixRow>,
}

/// Full output of `pigmix match`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchReport {
    pub results: Vec<OptimizationResult>,
    /// Target and predicted reflectance, sorted by formula code and background
    pub reflectances: Vec<ReflectanceEntry>,
    pub failures: Vec<TargetFailure>,
}

impl MatchReport {
    pub fn new(history: &MatchHistory, batch: BatchReport) -> Self {
        Self {
            results: history.results().to_vec(),
            reflectances: history.reflectances().into_iter().cloned().collect(),
            failures: batch.failures,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
