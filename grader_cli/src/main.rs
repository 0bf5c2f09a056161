mod cli;
mod devices;
mod error_fmt;
mod run;

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use eyre::Result;
use grader_core::{Calibration, GraderError};
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    if let Err(e) = real_main(cli) {
        let code = error_fmt::exit_code_for_error(&e);
        tracing::error!(error = %e, code, "exiting");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", error_fmt::format_error_json(&e));
        } else {
            eprintln!("{}", error_fmt::humanize(&e));
        }
        std::process::exit(code);
    }
}

fn real_main(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli.config)?;
    init_tracing(&cli, &cfg.logging)?;
    let calibration = effective_calibration(&cfg, cli.calibration.as_deref())?;
    tracing::debug!(
        config = %cli.config.display(),
        calibration_factor = calibration.calibration_factor,
        tare_offset = calibration.tare_offset,
        "configuration loaded"
    );

    match cli.cmd {
        Commands::Run {
            max_cycles,
            sim_weight,
            sim_override,
        } => run::run(
            &cfg,
            calibration,
            run::RunArgs {
                max_cycles,
                sim_weight,
                sim_override,
            },
            cli.json,
        ),
        Commands::Classify { grams } => run::classify(&cfg, grams, cli.json),
        Commands::Calibrate {
            known_grams,
            place_wait_s,
        } => run::calibrate(
            &cfg,
            calibration,
            known_grams,
            Duration::from_secs(place_wait_s),
            cli.json,
        ),
        Commands::SelfCheck => run::self_check(&cfg, calibration, cli.json),
    }
}

fn load_config(path: &Path) -> Result<grader_config::Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| GraderError::Config(format!("read {}: {e}", path.display())))?;
    let cfg = grader_config::load_toml(&text)
        .map_err(|e| GraderError::Config(format!("parse {}: {e}", path.display())))?;
    cfg.validate()
        .map_err(|e| GraderError::Config(format!("{e:#}")))?;
    Ok(cfg)
}

/// `--calibration` CSV first, then the persisted `[calibration]` table,
/// then the built-in default.
fn effective_calibration(cfg: &grader_config::Config, csv: Option<&Path>) -> Result<Calibration> {
    if let Some(path) = csv {
        let fitted = grader_config::load_calibration_csv(path)
            .map_err(|e| GraderError::Config(format!("{e:#}")))?;
        tracing::info!(path = %path.display(), "calibration loaded from CSV");
        return Ok(Calibration::from(&fitted));
    }
    Ok(cfg
        .calibration
        .as_ref()
        .map(Calibration::from)
        .unwrap_or_default())
}

fn init_tracing(cli: &Cli, logging: &grader_config::Logging) -> Result<()> {
    // RUST_LOG wins over --log-level
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let console = if cli.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    };
    let mut layers = vec![console];

    if let Some(file) = &logging.file {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| GraderError::Config(format!("logging.file {file:?} has no file name")))?;
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let level = logging.level.as_deref().unwrap_or("info");
        layers.push(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new(level))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| eyre::eyre!("init logging: {e}"))?;
    Ok(())
}
