//! Command execution: the grading loop, classification, calibration and
//! self-check.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::{Result, WrapErr};
use grader_config::Config;
use grader_core::{
    CalibratedScale, Calibration, ControllerStats, CycleOutcome, Grade, GradeDecision,
    GraderError, PendingOverride, ThresholdTable,
};
use grader_hardware::SimScaleHandle;
use serde_json::json;

use crate::devices;

pub struct RunArgs {
    pub max_cycles: Option<u64>,
    pub sim_weight: Vec<f32>,
    pub sim_override: Option<Grade>,
}

/// Places queued simulator items one at a time; an item leaves the platform
/// once its sequence has routed it.
struct SimFeeder {
    scale: Option<SimScaleHandle>,
    queue: VecDeque<f32>,
}

impl SimFeeder {
    fn new(scale: Option<SimScaleHandle>, items: Vec<f32>) -> Self {
        if scale.is_none() && !items.is_empty() {
            tracing::warn!("--sim-weight ignored: scale is not simulated");
        }
        Self {
            scale,
            queue: items.into(),
        }
    }

    fn advance(&mut self) {
        let Some(scale) = &self.scale else { return };
        let grams = self.queue.pop_front().unwrap_or(0.0);
        tracing::debug!(grams, "sim platform load");
        scale.set_grams(grams);
    }
}

pub fn run(cfg: &Config, calibration: Calibration, args: RunArgs, json: bool) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .wrap_err("install Ctrl-C handler")?;
    }

    let pending = PendingOverride::default();
    let (builder, sim) = devices::controller_builder(cfg, calibration)?;
    let mut ctrl = builder
        .with_pending(pending.clone())
        .with_shutdown(shutdown.clone())
        .with_network_progress(move |attempt| {
            if !json {
                eprintln!("waiting for network (attempt {attempt})");
            }
        })
        .try_build()?;

    let mut feeder = SimFeeder::new(sim, args.sim_weight);
    feeder.advance();
    if let Some(grade) = args.sim_override {
        pending.set(grade);
        tracing::info!(%grade, "override injected");
    }

    let blocking = cfg.actuation.mode == grader_config::ActuationMode::Blocking;
    let stats = ctrl.run_with(&shutdown, args.max_cycles, |outcome| match outcome {
        CycleOutcome::Decided(d) => {
            report_decision(d, json);
            if blocking {
                feeder.advance();
            }
        }
        CycleOutcome::Actuated(_) => feeder.advance(),
        CycleOutcome::Idle | CycleOutcome::Actuating(_) => {}
    });

    report_summary(&stats, ctrl.connection(), json);
    Ok(())
}

fn report_decision(d: &GradeDecision, json: bool) {
    if json {
        println!(
            "{}",
            json!({
                "event": "decision",
                "grade": d.grade.as_str(),
                "source": d.source.as_str(),
                "weight_g": d.weight,
            })
        );
    } else {
        match d.weight {
            Some(g) => println!("grade {} ({}, {g:.2} g)", d.grade, d.source.as_str()),
            None => println!("grade {} ({})", d.grade, d.source.as_str()),
        }
    }
}

fn report_summary(s: &ControllerStats, conn: grader_core::ConnectionState, json: bool) {
    if json {
        println!(
            "{}",
            json!({
                "event": "summary",
                "cycles": s.cycles,
                "decisions": s.decisions(),
                "local": s.local_decisions,
                "remote": s.remote_decisions,
                "sequences_completed": s.sequences_completed,
                "actuation_faults": s.actuation_faults,
                "settle_timeouts": s.settle_timeouts,
                "unknown_grades": s.unknown_grades,
                "commands": s.commands,
                "publish_failures": s.publish_failures,
                "sensor_not_ready": s.sensor_not_ready,
                "network": conn.network.as_str(),
                "broker": conn.broker.as_str(),
            })
        );
        return;
    }
    println!(
        "{} decisions ({} local, {} remote) in {} cycles; {} routed",
        s.decisions(),
        s.local_decisions,
        s.remote_decisions,
        s.cycles,
        s.sequences_completed
    );
    if s.actuation_faults + s.settle_timeouts + s.unknown_grades + s.publish_failures > 0 {
        println!(
            "faults: actuation {}, settle timeouts {}, unknown grades {}, publish failures {}",
            s.actuation_faults, s.settle_timeouts, s.unknown_grades, s.publish_failures
        );
    }
}

pub fn classify(cfg: &Config, grams: f32, json: bool) -> Result<()> {
    if !grams.is_finite() {
        return Err(GraderError::Config(format!("grams must be finite, got {grams}")).into());
    }
    let local = ThresholdTable::from(&cfg.grading.local).classify(grams);
    let remote = ThresholdTable::from(&cfg.grading.remote).classify(grams);
    if json {
        println!(
            "{}",
            json!({
                "grams": grams,
                "local": local.as_str(),
                "remote": remote.as_str(),
                "agree": local == remote,
            })
        );
    } else {
        println!("{grams:.2} g -> local {local}, remote {remote}");
        if local != remote {
            println!("note: the remote classifier's table disagrees; local grading is authoritative");
        }
    }
    Ok(())
}

pub fn calibrate(
    cfg: &Config,
    calibration: Calibration,
    known_grams: f32,
    place_wait: Duration,
    json: bool,
) -> Result<()> {
    if !(known_grams.is_finite() && known_grams > 0.0) {
        return Err(GraderError::Config(format!(
            "--known-grams must be > 0, got {known_grams}"
        ))
        .into());
    }
    let (scale, sim) = devices::open_scale(cfg, calibration)?;
    let mut scale = CalibratedScale::new(scale, calibration, (&cfg.scale).into());

    if !json {
        eprintln!("Taring: keep the platform empty...");
    }
    let tare = scale.tare()?;
    match &sim {
        Some(handle) => handle.set_grams(known_grams),
        None => {
            if !json {
                eprintln!(
                    "Place the {known_grams} g reference weight on the platform ({}s)...",
                    place_wait.as_secs()
                );
            }
            std::thread::sleep(place_wait);
        }
    }
    let loaded = scale.read_raw()?.round() as i32;
    let derived = Calibration::with_known_weight(tare, loaded, known_grams)?;
    tracing::info!(
        calibration_factor = derived.calibration_factor,
        tare_offset = derived.tare_offset,
        "calibrated"
    );

    if json {
        println!(
            "{}",
            json!({
                "calibration_factor": derived.calibration_factor,
                "tare_offset": derived.tare_offset,
                "known_grams": known_grams,
                "raw_loaded": loaded,
            })
        );
    } else {
        println!("Calibration complete. Add to the config:");
        println!("[calibration]");
        println!("calibration_factor = {:.2}", derived.calibration_factor);
        println!("tare_offset = {}", derived.tare_offset);
    }
    Ok(())
}

pub fn self_check(cfg: &Config, calibration: Calibration, json: bool) -> Result<()> {
    let grams = {
        let (scale, _sim) = devices::open_scale(cfg, calibration)?;
        let mut scale = CalibratedScale::new(scale, calibration, (&cfg.scale).into());
        scale.read()?.grams
    };
    let (builder, _sim) = devices::controller_builder(cfg, calibration)?;
    let ctrl = builder.try_build()?;
    tracing::debug!(?ctrl, "self-check controller");

    if json {
        println!(
            "{}",
            json!({
                "ok": true,
                "scale": devices::SCALE_BACKEND,
                "broker": devices::BROKER_BACKEND,
                "grams": grams,
            })
        );
    } else {
        println!(
            "OK (scale: {}, broker: {}, reading {grams:.2} g)",
            devices::SCALE_BACKEND,
            devices::BROKER_BACKEND
        );
    }
    Ok(())
}
