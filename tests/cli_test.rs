//! Command line round trips through temporary files.

mod common;

use std::path::Path;
use std::process::{Command, Output};

use common::fixtures;
use pigmix::models::{AppConfig, CalibrationModel, FormulationReport, MatchReport};
use pigmix::services;
use pretty_assertions::assert_eq;

fn pigmix(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pigmix"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "pigmix failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_init_writes_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("pigmix.yaml");

    assert_success(&pigmix(&config, &["init"]));
    assert_eq!(AppConfig::load(&config).unwrap(), AppConfig::default());

    std::fs::write(&config, "matching:\n  max_retries: 3\n").unwrap();
    assert_success(&pigmix(&config, &["init"]));
    assert_eq!(AppConfig::load(&config).unwrap().matching.max_retries, 3);

    assert_success(&pigmix(&config, &["init", "--force"]));
    assert_eq!(AppConfig::load(&config).unwrap(), AppConfig::default());
}

#[test]
fn test_calibrate_formulate_match() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("pigmix.yaml");
    std::fs::write(&config, fixtures::test_config().to_yaml().unwrap()).unwrap();

    let measurements = fixtures::write_measurements(dir.path());
    let model = dir.path().join("model.json");
    let report = dir.path().join("calibration.json");
    assert_success(&pigmix(
        &config,
        &[
            "calibrate",
            "--input",
            measurements.to_str().unwrap(),
            "--output",
            model.to_str().unwrap(),
            "--report",
            report.to_str().unwrap(),
        ],
    ));
    let calibrated: CalibrationModel = services::read_json(&model).unwrap();
    assert_eq!(calibrated.models.len(), 6);
    assert!(report.exists());

    let mixtures = dir.path().join("mixtures.json");
    std::fs::write(&mixtures, r#"[{"RED": 0.002, "WHITE": 0.02}]"#).unwrap();
    let formulated = dir.path().join("formulated.json");
    assert_success(&pigmix(
        &config,
        &[
            "formulate",
            "--model",
            model.to_str().unwrap(),
            "--mixtures",
            mixtures.to_str().unwrap(),
            "--output",
            formulated.to_str().unwrap(),
        ],
    ));
    let formulation: FormulationReport = services::read_json(&formulated).unwrap();
    assert_eq!(formulation.reflectances.len(), 2);

    let targets: kubelka::ReflectanceTable = formulation
        .reflectances
        .into_iter()
        .map(|p| kubelka::SpectralSample::new("MU500", p.concentrations, p.background, p.reflectance))
        .collect();
    let targets_path = dir.path().join("targets.json");
    services::write_json(&targets_path, &targets).unwrap();

    let matched = dir.path().join("matched.json");
    assert_success(&pigmix(
        &config,
        &[
            "match",
            "--model",
            model.to_str().unwrap(),
            "--input",
            targets_path.to_str().unwrap(),
            "--output",
            matched.to_str().unwrap(),
        ],
    ));
    let report: MatchReport = services::read_json(&matched).unwrap();
    assert_eq!(report.results.len(), 2);
    assert!(report.results.iter().all(|r| r.objective < 1e-3));
}

#[test]
fn test_missing_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("pigmix.yaml");
    let output = pigmix(
        &config,
        &[
            "calibrate",
            "--input",
            dir.path().join("absent.json").to_str().unwrap(),
            "--output",
            dir.path().join("model.json").to_str().unwrap(),
        ],
    );
    assert!(!output.status.success());
}
