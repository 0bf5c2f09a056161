//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use grader_core::Grade;
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "grader", version, about = "Weight grading controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/grader_config.toml")]
    pub config: PathBuf,

    /// Optional calibration CSV (strict `raw,grams` header); overrides [calibration]
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the grading loop
    Run {
        /// Stop after this many control cycles (runs until Ctrl-C otherwise)
        #[arg(long, value_name = "N")]
        max_cycles: Option<u64>,
        /// Simulator: place an item of this weight on the platform. Repeat to
        /// feed items one after another; each is removed once routed.
        #[arg(long = "sim-weight", value_name = "GRAMS")]
        sim_weight: Vec<f32>,
        /// Simulator: deliver this grade as a remote override before the first cycle
        #[arg(long = "sim-override", value_name = "GRADE", value_parser = parse_grade_arg)]
        sim_override: Option<Grade>,
    },
    /// Grade a weight against the local and remote threshold tables
    Classify {
        #[arg(long)]
        grams: f32,
    },
    /// Tare, then derive the calibration factor from a known reference weight
    Calibrate {
        /// Mass of the reference weight in grams
        #[arg(long = "known-grams", value_name = "GRAMS")]
        known_grams: f32,
        /// Seconds to wait for the reference weight to be placed (hardware only)
        #[arg(long = "place-wait-s", value_name = "SECS", default_value_t = 5)]
        place_wait_s: u64,
    },
    /// Quick health check (config, devices, one scale read)
    SelfCheck,
}

fn parse_grade_arg(s: &str) -> Result<Grade, String> {
    grader_core::parse_grade(s.as_bytes()).map_err(|e| e.to_string())
}
