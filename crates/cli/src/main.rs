use anyhow::Result;
use std::fs::{self, OpenOptions};

use cheatdb_core::{
    config::{self, AppConfig},
    pipeline::{BuildOutcome, BuildPipeline, CommandNormalizer},
    version::DatabaseVersion,
};
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

fn main() -> Result<()> {
    init_logging()?;

    config::ensure_default_config()?;
    let config = AppConfig::load()?;

    let normalizer = CommandNormalizer::new(config.normalizer_command.clone());
    let pipeline = BuildPipeline::new(config, DatabaseVersion::today())?;

    match pipeline.run(&normalizer)? {
        BuildOutcome::UpToDate => info!("nothing to publish"),
        BuildOutcome::Built(report) => info!(
            "published version {}: {} cheats in {} titles/{} updates",
            report.version, report.totals.entries, report.totals.titles, report.totals.builds
        ),
    }

    Ok(())
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("cheatdb.log");

    let env_filter = EnvFilter::from_default_env();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stdout);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact()
        .with_writer(move || {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .expect("failed to open log file")
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}
