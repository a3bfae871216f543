//! voxmerge: batch augmentation of multi-part MIDI scores

mod args;
mod config;

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use voxmerge_services::{discover_inputs, BatchRunner, BatchSummary};

use args::{Cli, Command, USAGE};

const EXIT_CONFIG: u8 = 1;
const EXIT_DECODE: u8 = 2;

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = match args::parse(&argv) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {e:#}\n\n{USAGE}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if cli.help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    init_logging(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,voxmerge={level}")));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let mut config = config::load_config(cli.config_file.as_deref())?;
    args::apply_overrides(&mut config, &cli.overrides)?;

    // Augment options are checked even when unused, so a bad config fails early
    let settings = config.validate().context("invalid configuration")?;

    let (inputs, skipped) = discover_inputs(&cli.paths);
    if inputs.is_empty() {
        if skipped.is_empty() && cli.paths.is_empty() {
            bail!("no input paths given\n\n{USAGE}");
        }
        bail!("could not find any MIDI files to process");
    }
    info!("Found {} input file(s)", inputs.len());

    let runner = BatchRunner::new(&settings.target_folder, settings.workers);
    runner
        .prepare()
        .with_context(|| format!("cannot create {}", settings.target_folder.display()))?;

    let summary = match cli.command {
        Command::Augment => runner.augment(&inputs, &settings),
        Command::Split { seconds } => runner.split(&inputs, seconds),
        Command::Separate => runner.separate(&inputs),
    };
    Ok(report(&summary))
}

fn report(summary: &BatchSummary) -> ExitCode {
    info!(
        "Wrote {} file(s) from {} input(s), {} skipped",
        summary.files_written(),
        summary.reports.len(),
        summary.failures().count()
    );
    let unreadable = summary.codec_failures();
    if unreadable > 0 {
        warn!("{unreadable} input(s) could not be decoded");
        ExitCode::from(EXIT_DECODE)
    } else {
        ExitCode::SUCCESS
    }
}
