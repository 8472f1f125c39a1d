mod color;
mod config;
mod data;
mod driver;
mod error;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info};

use config::AppConfig;
use data::loader::{ExportFileSource, RecordingLoader};
use driver::Driver;
use error::ErgError;
use output::csv_sink::MarkerCsvWriter;
use output::plot::PngTraceRenderer;

#[derive(Parser)]
#[command(name = "erg-extract", about = "Export ERG markers to CSV and plot every trace")]
struct Args {
    /// TOML configuration (default: ./erg-extract.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the export tree root from the configuration
    #[arg(long)]
    base_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Write the marker CSV
    Markers,
    /// Render one image per step and eye
    Traces,
    /// Both (default)
    All,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let result = run(args);
    if let Err(err) = &result {
        if let Some(cause @ ErgError::Consistency { .. }) = driver::fatal_cause(err) {
            error!("Registry and recording disagree, stopping: {cause}");
        }
    }
    result
}

fn run(args: Args) -> Result<()> {
    let config_path = AppConfig::locate(args.config.as_deref());
    let loaded = AppConfig::load(config_path.as_deref());
    init_logging(loaded.as_ref().map_or("info", |cfg| cfg.log_level.as_str()));

    let mut cfg = loaded?;
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("No configuration file, using built-in defaults"),
    }
    if let Some(base) = args.base_folder {
        cfg.base_folder = base;
    }
    info!("Export tree: {}", cfg.base_folder.display());

    let registry = &cfg.registry;
    let loader = RecordingLoader::new(
        ExportFileSource,
        registry,
        cfg.base_folder.clone(),
        cfg.subject_prefix.clone(),
        cfg.extension.clone(),
    );
    let driver = Driver::new(registry, &loader, cfg.time_axis);
    let command = args.command.unwrap_or(Command::All);

    if matches!(command, Command::Markers | Command::All) {
        let mut csv = MarkerCsvWriter::create(&cfg.markers_csv)?;
        driver.export_markers(&mut csv)?;
        let rows = csv.rows_written();
        csv.finish()?;
        info!("{rows} marker rows written to {}", cfg.markers_csv.display());
    }

    if matches!(command, Command::Traces | Command::All) {
        let mut renderer = PngTraceRenderer::new(&cfg.traces_dir, cfg.plot)?;
        driver.export_traces(&mut renderer)?;
        info!(
            "{} trace images written to {}",
            renderer.images_written(),
            cfg.traces_dir.display()
        );
    }

    Ok(())
}

fn init_logging(default_level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}
