use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pigmix::models::{AppConfig, CalibrationModel, DEFAULT_CONFIG_FILE};
use pigmix::services::{self, CalibrationService, MatchingService};

#[derive(Parser)]
#[command(name = "pigmix")]
#[command(about = "Kubelka-Munk pigment calibration and colour matching")]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit pigment models from card, base and monochrome measurements
    Calibrate {
        /// Measurement table (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the calibrated model
        #[arg(short, long)]
        output: PathBuf,

        /// Also write intermediate variables and every fitted candidate
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Predict K, S and reflectance for given concentrations
    Formulate {
        /// Calibrated model from `pigmix calibrate`
        #[arg(short, long)]
        model: PathBuf,

        /// Concentration maps, e.g. [{"RED": 0.003, "WHITE": 0.02}]
        #[arg(long)]
        mixtures: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
    /// Find concentrations reproducing target reflectances
    Match {
        /// Calibrated model from `pigmix calibrate`
        #[arg(short, long)]
        model: PathBuf,

        /// Target table (JSON); card and base rows are ignored
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pigmix=info,kubelka=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    match cli.command {
        Commands::Calibrate {
            input,
            output,
            report,
        } => run_calibrate_command(&cli.config, &input, &output, report.as_deref()),
        Commands::Formulate {
            model,
            mixtures,
            output,
        } => run_formulate_command(&model, &mixtures, &output),
        Commands::Match {
            model,
            input,
            output,
        } => run_match_command(&cli.config, &model, &input, &output),
        Commands::Init { force } => run_init_command(&cli.config, force),
    }
}

fn run_calibrate_command(config: &Path, input: &Path, output: &Path, report: Option<&Path>) -> anyhow::Result<()> {
    let config = AppConfig::load_or_default(config);
    let measurements = services::read_table(input)?;

    let result = CalibrationService::new(&config)?.run(&measurements)?;
    services::write_json(output, &result.model)?;
    if let Some(path) = report {
        services::write_json(path, &result)?;
    }

    println!(
        "Calibrated {} models from {} rows -> {}",
        result.model.models.len(),
        measurements.len(),
        output.display()
    );
    Ok(())
}

fn run_formulate_command(model: &Path, mixtures: &Path, output: &Path) -> anyhow::Result<()> {
    let model: CalibrationModel = services::read_json(model)?;
    let mixtures = services::read_mixtures(mixtures)?;

    let report = services::formulate(&model, &mixtures)?;
    services::write_json(output, &report)?;

    println!("Formulated {} mixtures -> {}", mixtures.len(), output.display());
    Ok(())
}

fn run_match_command(config: &Path, model: &Path, input: &Path, output: &Path) -> anyhow::Result<()> {
    let config = AppConfig::load_or_default(config);
    let model: CalibrationModel = services::read_json(model)?;
    let targets = services::read_table(input)?;

    let report = MatchingService::new(&model, &config)?.run(&targets)?;
    services::write_json(output, &report)?;

    println!(
        "Matched {} targets ({} failed) -> {}",
        report.results.len(),
        report.failures.len(),
        output.display()
    );
    if !report.is_complete() {
        anyhow::bail!("{} targets could not be matched", report.failures.len());
    }
    Ok(())
}

fn run_init_command(config: &Path, force: bool) -> anyhow::Result<()> {
    if config.exists() && !force {
        println!(
            "Skipped existing {} (use --force to overwrite)",
            config.display()
        );
        return Ok(());
    }
    std::fs::write(config, AppConfig::default().to_yaml()?)?;
    println!("Wrote default configuration to {}", config.display());
    Ok(())
}
