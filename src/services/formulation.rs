//! Forward run: concentrations → predicted K, S and reflectance.

use kubelka::Concentrations;

use crate::error::AppResult;
use crate::models::{CalibrationModel, FormulationReport};

pub fn formulate(model: &CalibrationModel, mixtures: &[Concentrations]) -> AppResult<FormulationReport> {
    let formulator = model.formulator()?;
    let report = FormulationReport {
        reflectances: formulator.calculate_reflectance(mixtures),
        constants: formulator.mixer().predict_km_constants(mixtures),
    };
    tracing::info!(mixtures = mixtures.len(), "Formulation finished");
    Ok(report)
}
