//! Grading controller: the single-threaded cooperative loop tying the
//! components together.
//!
//! One cycle: poll connectivity, then either advance a running sequence or
//! decide, publish and actuate. While a ticked sequence runs, inbound
//! messages are still drained (overrides buffer) but no decision is made.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use grader_traits::{Broker, Clock, Motor, Network, Scale, Servo};

use crate::SharedClock;
use crate::actuation::{ActuationSequencer, TickOutcome};
use crate::config::{ActuationMode, RunnerCfg};
use crate::connectivity::{ConnectionState, ConnectivityManager};
use crate::engine::GradeEngine;
use crate::status::CycleOutcome;
use crate::telemetry::{StatusReport, TelemetryPublisher};
use crate::types::DecisionSource;

pub type BoxedEngine = GradeEngine<Box<dyn Scale>>;
pub type BoxedLink = ConnectivityManager<Box<dyn Network>, Box<dyn Broker>>;
pub type BoxedSequencer = ActuationSequencer<Box<dyn Servo>, Box<dyn Servo>, Box<dyn Motor>>;

/// Counters for the CLI summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub cycles: u64,
    pub local_decisions: u64,
    pub remote_decisions: u64,
    pub sequences_completed: u64,
    pub actuation_faults: u64,
    pub settle_timeouts: u64,
    pub unknown_grades: u64,
    pub commands: u64,
    pub publish_failures: u64,
    pub sensor_not_ready: u64,
}

impl ControllerStats {
    pub fn decisions(&self) -> u64 {
        self.local_decisions + self.remote_decisions
    }
}

pub struct GradingController {
    pub(crate) engine: BoxedEngine,
    pub(crate) link: BoxedLink,
    pub(crate) telemetry: TelemetryPublisher,
    pub(crate) sequencer: BoxedSequencer,
    pub(crate) mode: ActuationMode,
    pub(crate) runner: RunnerCfg,
    pub(crate) clock: SharedClock,
    pub(crate) epoch: Instant,
    pub(crate) cycles: u64,
    pub(crate) local_decisions: u64,
    pub(crate) remote_decisions: u64,
}

impl core::fmt::Debug for GradingController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GradingController")
            .field("mode", &self.mode)
            .field("thresholds", &self.engine.thresholds())
            .field("connection", &self.link.state())
            .field("busy", &self.sequencer.is_busy())
            .field("cycles", &self.cycles)
            .finish()
    }
}

impl GradingController {
    pub fn builder() -> crate::builder::GradingControllerBuilder {
        crate::builder::GradingControllerBuilder::default()
    }

    pub fn cycle(&mut self) -> CycleOutcome {
        self.cycles += 1;

        if let Some(grade) = self.sequencer.current_grade() {
            self.link.service();
            self.heartbeat();
            return match self.sequencer.tick() {
                Ok(TickOutcome::Completed(g)) => CycleOutcome::Actuated(g),
                Ok(TickOutcome::Running) => CycleOutcome::Actuating(grade),
                Ok(TickOutcome::Idle) | Err(_) => CycleOutcome::Idle,
            };
        }

        self.link.poll();
        self.heartbeat();

        let decision = self.engine.decide();
        if let Some(sample) = self.engine.last_sample() {
            let now_ms = self.clock.ms_since(self.epoch);
            self.telemetry
                .maybe_publish_live(&mut self.link, now_ms, sample.grams);
        }
        let Some(decision) = decision else {
            return CycleOutcome::Idle;
        };

        match decision.source {
            DecisionSource::LocalSensor => self.local_decisions += 1,
            DecisionSource::RemoteOverride => self.remote_decisions += 1,
        }
        if !self.telemetry.publish_decision(&mut self.link, &decision) {
            tracing::debug!(grade = %decision.grade, "decision telemetry dropped");
        }

        let res = match self.mode {
            ActuationMode::Ticked => self.sequencer.start(decision.grade),
            ActuationMode::Blocking => self.sequencer.execute(decision.grade),
        };
        if let Err(e) = res {
            tracing::warn!(error = %e, grade = %decision.grade, "item not routed");
        }
        CycleOutcome::Decided(decision)
    }

    fn heartbeat(&mut self) {
        let now_ms = self.clock.ms_since(self.epoch);
        let report = StatusReport {
            uptime_ms: now_ms,
            connection: self.link.state(),
            decisions: self.local_decisions + self.remote_decisions,
        };
        self.telemetry
            .maybe_publish_status(&mut self.link, now_ms, &report);
    }

    /// Cycle until `shutdown` is raised or `max_cycles` have run. Actuators
    /// are rested before returning.
    pub fn run(&mut self, shutdown: &AtomicBool, max_cycles: Option<u64>) -> ControllerStats {
        self.run_with(shutdown, max_cycles, |_| {})
    }

    /// [`run`](Self::run) with an observer called after every cycle.
    pub fn run_with(
        &mut self,
        shutdown: &AtomicBool,
        max_cycles: Option<u64>,
        mut observe: impl FnMut(&CycleOutcome),
    ) -> ControllerStats {
        let mut ran = 0u64;
        tracing::info!(mode = ?self.mode, "controller started");
        while !shutdown.load(Ordering::Relaxed) && max_cycles.is_none_or(|m| ran < m) {
            ran += 1;
            let outcome = self.cycle();
            observe(&outcome);
            match outcome {
                CycleOutcome::Idle => self.clock.sleep(self.runner.cycle),
                CycleOutcome::Actuating(_) => {
                    let tick = self.sequencer.cfg().tick;
                    let wait = self.sequencer.remaining().map_or(tick, |r| r.min(tick));
                    self.clock.sleep(wait);
                }
                CycleOutcome::Decided(_) | CycleOutcome::Actuated(_) => {}
            }
        }
        if let Err(e) = self.sequencer.abort() {
            tracing::error!(error = %e, "failed to rest actuators on shutdown");
        }
        let stats = self.stats();
        tracing::info!(
            cycles = stats.cycles,
            local = stats.local_decisions,
            remote = stats.remote_decisions,
            "controller stopped"
        );
        stats
    }

    pub fn stats(&self) -> ControllerStats {
        let link = self.link.stats();
        ControllerStats {
            cycles: self.cycles,
            local_decisions: self.local_decisions,
            remote_decisions: self.remote_decisions,
            sequences_completed: self.sequencer.completed(),
            actuation_faults: self.sequencer.faults(),
            settle_timeouts: self.engine.detector().settle_timeouts(),
            unknown_grades: link.unknown_grades,
            commands: link.commands,
            publish_failures: link.publish_failures,
            sensor_not_ready: self.engine.stats().not_ready,
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn last_command(&self) -> Option<&str> {
        self.link.last_command()
    }

    pub fn is_actuating(&self) -> bool {
        self.sequencer.is_busy()
    }

    pub fn engine(&self) -> &BoxedEngine {
        &self.engine
    }
}
