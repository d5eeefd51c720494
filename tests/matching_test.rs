//! Formulation and colour matching against a calibrated model.

mod common;

use common::fixtures;
use kubelka::optimize::SeriesKind;
use kubelka::{Background, Concentrations, Pigment, ReflectanceTable, SpectralSample};
use pigmix::models::CalibrationModel;
use pigmix::services::{self, CalibrationService, MatchingService};
use pretty_assertions::assert_eq;

fn calibrated() -> CalibrationModel {
    CalibrationService::new(&fixtures::test_config())
        .unwrap()
        .run(&fixtures::measurement_table())
        .unwrap()
        .model
}

fn mixture() -> Concentrations {
    Concentrations::zero()
        .with(Pigment::Red, 0.002)
        .with(Pigment::White, 0.02)
}

/// Predicted reflectance of `mixture()` as target rows.
fn targets(model: &CalibrationModel, backgrounds: &[Background]) -> ReflectanceTable {
    let report = services::formulate(model, &[mixture()]).unwrap();
    report
        .reflectances
        .into_iter()
        .filter(|p| backgrounds.contains(&p.background))
        .map(|p| SpectralSample::new("MU500", p.concentrations, p.background, p.reflectance))
        .collect()
}

#[test]
fn test_formulation_layout() {
    let model = calibrated();
    let mixtures = [mixture(), Concentrations::zero().with(Pigment::White, 0.05)];
    let report = services::formulate(&model, &mixtures).unwrap();

    let backgrounds: Vec<Background> = report.reflectances.iter().map(|p| p.background).collect();
    assert_eq!(
        backgrounds,
        vec![Background::Dark, Background::Light, Background::Dark, Background::Light]
    );
    assert_eq!(report.constants.len(), 6);
    assert_eq!(report.constants[3].concentrations, mixtures[1]);

    let dark = &report.reflectances[0].reflectance;
    let light = &report.reflectances[1].reflectance;
    assert!(dark.values().iter().zip(light.values()).all(|(d, l)| d < l));
}

#[test]
fn test_match_recovers_reachable_mixture() {
    let model = calibrated();
    let service = MatchingService::new(&model, &fixtures::test_config()).unwrap();
    let report = service.run(&targets(&model, &[Background::Light])).unwrap();

    assert!(report.is_complete());
    assert_eq!(report.results.len(), 1);
    let result = &report.results[0];
    assert!(result.objective < 1e-3, "objective {}", result.objective);
    assert!(result.concentrations.total() <= 0.1 + 1e-9);
    assert_eq!(result.concentrations.get(Pigment::Black), 0.0);
    assert_eq!(result.concentrations.get(Pigment::Yellow), 0.0);
    assert_eq!(result.target_concentrations, mixture());
    assert!(result.delta_e00 < 1.0, "ΔE00 {}", result.delta_e00);
}

#[test]
fn test_match_reports_both_backgrounds_in_order() {
    let model = calibrated();
    let service = MatchingService::new(&model, &fixtures::test_config()).unwrap();
    let report = service
        .run(&targets(&model, &[Background::Dark, Background::Light]))
        .unwrap();

    let order: Vec<(Background, SeriesKind)> = report.reflectances.iter().map(|e| (e.background, e.kind)).collect();
    assert_eq!(
        order,
        vec![
            (Background::Dark, SeriesKind::Target),
            (Background::Dark, SeriesKind::Predicted),
            (Background::Light, SeriesKind::Target),
            (Background::Light, SeriesKind::Predicted),
        ]
    );
    assert_eq!(report.results[0].background, Background::Dark);
    assert_eq!(report.results[1].background, Background::Light);
}

#[test]
fn test_parallel_matching_keeps_input_order() {
    let model = calibrated();
    let mut config = fixtures::test_config();
    config.matching.parallel = true;

    let service = MatchingService::new(&model, &config).unwrap();
    let report = service
        .run(&targets(&model, &[Background::Dark, Background::Light]))
        .unwrap();

    let backgrounds: Vec<Background> = report.results.iter().map(|r| r.background).collect();
    assert_eq!(backgrounds, vec![Background::Dark, Background::Light]);
}

#[test]
fn test_reference_rows_are_not_matched() {
    let model = calibrated();
    let service = MatchingService::new(&model, &fixtures::test_config()).unwrap();

    let mut table = targets(&model, &[Background::Light]);
    for sample in fixtures::measurement_table().samples() {
        if sample.formula_code == "MU000" {
            table.push(sample.clone());
        }
    }
    let report = service.run(&table).unwrap();
    assert_eq!(report.results.len(), 1);
}
