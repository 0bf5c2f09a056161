#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::must_use_candidate
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core grading logic (hardware-agnostic).
//!
//! All hardware and transport interactions go through the `grader_traits`
//! boundary (`Scale`, `Servo`, `Motor`, `Network`, `Broker`).
//!
//! ## Architecture
//!
//! - **Calibrated Scale** (`scale`): averaged raw reads to grams
//! - **Stability Detector** (`stability`): sliding window with settle deadline
//! - **Grade Decision Engine** (`engine`, `classify`, `pending`): override first, then thresholds
//! - **Connectivity Manager** (`connectivity`): network association, broker session, inbound dispatch
//! - **Telemetry Publisher** (`telemetry`): weight, grade and heartbeat messages
//! - **Actuation Sequencer** (`actuation`): timed step sequences, rest on exit
//! - **Controller** (`controller`, `builder`): the cooperative loop

pub mod actuation;
pub mod builder;
pub mod calibration;
pub mod classify;
pub mod config;
pub mod connectivity;
pub mod controller;
pub mod conversions;
pub mod engine;
pub mod error;
pub mod hw_error;
pub mod pending;
pub mod scale;
pub mod stability;
pub mod status;
pub mod telemetry;
pub mod types;

use std::sync::Arc;

pub use actuation::{Action, ActuationSequencer, ActuationStep, TickOutcome};
pub use builder::GradingControllerBuilder;
pub use calibration::Calibration;
pub use classify::ThresholdTable;
pub use config::{
    ActuationCfg, ActuationMode, LinkCfg, RunnerCfg, ScaleCfg, StabilityCfg, TelemetryCfg, Topics,
};
pub use connectivity::{ConnectionPhase, ConnectionState, ConnectivityManager, LinkState};
pub use controller::{ControllerStats, GradingController};
pub use engine::GradeEngine;
pub use error::{BuildError, GraderError, Link, Result};
pub use pending::{PendingOverride, parse_grade};
pub use scale::CalibratedScale;
pub use stability::{StabilityDetector, StabilityState};
pub use status::CycleOutcome;
pub use telemetry::{StatusReport, TelemetryPublisher, TelemetrySink};
pub use types::{DecisionSource, Grade, GradeDecision, WeightSample};

/// Clock shared between the components of one controller.
pub type SharedClock = Arc<dyn grader_traits::Clock + Send + Sync>;
