use clap::Parser;
use log::info;
use std::path::PathBuf;

use aki_flagger::config::FlaggerConfig;
use aki_flagger::flagger::Flagger;
use aki_flagger::table::{self, Table};

#[derive(Parser)]
#[command(name = "aki_flagger")]
#[command(about = "Flag acute kidney injury in creatinine time series (KDIGO criteria)")]
struct Cli {
    /// Input CSV with one creatinine reading per row
    #[arg(short, long)]
    input: PathBuf,

    /// Output CSV: the input with result columns appended
    #[arg(short, long)]
    output: PathBuf,

    /// JSON configuration file (column names, windows, options)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Optional JSON summary of the run
    #[arg(short, long)]
    summary: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let config = match &cli.config {
        Some(path) => {
            let config = FlaggerConfig::from_file(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => FlaggerConfig::default(),
    };
    let flagger = Flagger::new(config)?;

    let input = Table::from_path(&cli.input)?;
    info!("Read {} rows from {:?}", input.len(), cli.input);

    let readings = table::load_readings(&input, flagger.config())?;
    let output = flagger.flag(&readings)?;

    if let Some(parent) = cli.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    table::write_flagged(&cli.output, &input, &output, flagger.config())?;

    if let Some(path) = &cli.summary {
        table::save_summary(&output.summary, path)?;
        info!("Summary saved to {:?}", path);
    }

    info!(
        "{} of {} patients flagged with AKI",
        output.summary.patients_with_aki, output.summary.n_patients
    );
    Ok(())
}
