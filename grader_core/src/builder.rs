//! Builder for `GradingController`.
//!
//! Devices are injected as boxed trait objects; configuration either comes
//! piecewise or from a validated `grader_config::Config` via `apply_config`.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use grader_traits::{Broker, Clock, MonotonicClock, Motor, Network, Scale, Servo};

use crate::SharedClock;
use crate::actuation::ActuationSequencer;
use crate::calibration::Calibration;
use crate::classify::ThresholdTable;
use crate::config::{ActuationCfg, LinkCfg, RunnerCfg, ScaleCfg, StabilityCfg, TelemetryCfg};
use crate::connectivity::ConnectivityManager;
use crate::controller::GradingController;
use crate::engine::GradeEngine;
use crate::error::{BuildError, Result};
use crate::pending::PendingOverride;
use crate::scale::CalibratedScale;
use crate::stability::StabilityDetector;
use crate::telemetry::TelemetryPublisher;

#[derive(Default)]
pub struct GradingControllerBuilder {
    scale: Option<Box<dyn Scale>>,
    diverter: Option<Box<dyn Servo>>,
    pusher: Option<Box<dyn Servo>>,
    conveyor: Option<Box<dyn Motor>>,
    network: Option<Box<dyn Network>>,
    broker: Option<Box<dyn Broker>>,
    calibration: Option<Calibration>,
    scale_cfg: ScaleCfg,
    stability: StabilityCfg,
    thresholds: ThresholdTable,
    link: LinkCfg,
    telemetry: TelemetryCfg,
    actuation: ActuationCfg,
    runner: RunnerCfg,
    clock: Option<SharedClock>,
    pending: Option<PendingOverride>,
    shutdown: Option<Arc<AtomicBool>>,
    progress: Option<Box<dyn FnMut(u32)>>,
}

impl GradingControllerBuilder {
    pub fn with_scale(mut self, s: impl Scale + 'static) -> Self {
        self.scale = Some(Box::new(s));
        self
    }

    pub fn with_diverter(mut self, s: impl Servo + 'static) -> Self {
        self.diverter = Some(Box::new(s));
        self
    }

    pub fn with_pusher(mut self, s: impl Servo + 'static) -> Self {
        self.pusher = Some(Box::new(s));
        self
    }

    pub fn with_conveyor(mut self, m: impl Motor + 'static) -> Self {
        self.conveyor = Some(Box::new(m));
        self
    }

    pub fn with_network(mut self, n: impl Network + 'static) -> Self {
        self.network = Some(Box::new(n));
        self
    }

    pub fn with_broker(mut self, b: impl Broker + 'static) -> Self {
        self.broker = Some(Box::new(b));
        self
    }

    pub fn with_calibration(mut self, c: Calibration) -> Self {
        self.calibration = Some(c);
        self
    }

    pub fn with_scale_cfg(mut self, c: ScaleCfg) -> Self {
        self.scale_cfg = c;
        self
    }

    pub fn with_stability(mut self, c: StabilityCfg) -> Self {
        self.stability = c;
        self
    }

    pub fn with_thresholds(mut self, t: ThresholdTable) -> Self {
        self.thresholds = t;
        self
    }

    pub fn with_link(mut self, c: LinkCfg) -> Self {
        self.link = c;
        self
    }

    pub fn with_telemetry(mut self, c: TelemetryCfg) -> Self {
        self.telemetry = c;
        self
    }

    pub fn with_actuation(mut self, c: ActuationCfg) -> Self {
        self.actuation = c;
        self
    }

    pub fn with_runner(mut self, c: RunnerCfg) -> Self {
        self.runner = c;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share an override slot with another writer (e.g. a CLI injection).
    pub fn with_pending(mut self, p: PendingOverride) -> Self {
        self.pending = Some(p);
        self
    }

    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn with_network_progress(mut self, hook: impl FnMut(u32) + 'static) -> Self {
        self.progress = Some(Box::new(hook));
        self
    }

    /// Take every runtime setting from a parsed file. A persisted calibration
    /// is used only when none was set explicitly.
    pub fn apply_config(mut self, cfg: &grader_config::Config) -> Self {
        self.scale_cfg = (&cfg.scale).into();
        self.stability = (&cfg.stability).into();
        self.thresholds = (&cfg.grading.local).into();
        self.link = cfg.into();
        self.telemetry = (&cfg.telemetry).into();
        self.actuation = (&cfg.actuation).into();
        self.runner = (&cfg.runner).into();
        if self.calibration.is_none()
            && let Some(p) = &cfg.calibration
        {
            self.calibration = Some(p.into());
        }
        self
    }

    fn validate(&self) -> std::result::Result<(), BuildError> {
        if self.scale_cfg.samples_per_read == 0 {
            return Err(BuildError::InvalidConfig("samples_per_read must be >= 1"));
        }
        if self.stability.window < 2 {
            return Err(BuildError::InvalidConfig("stability window must be >= 2"));
        }
        if !self.stability.presence_floor_g.is_finite() || self.stability.presence_floor_g <= 0.0 {
            return Err(BuildError::InvalidConfig("presence floor must be finite and > 0"));
        }
        if !self.stability.tolerance_g.is_finite() || self.stability.tolerance_g < 0.0 {
            return Err(BuildError::InvalidConfig("tolerance must be finite and >= 0"));
        }
        if self.thresholds.grade_b_min_g > self.thresholds.grade_a_min_g {
            return Err(BuildError::InvalidConfig(
                "grade B threshold must not exceed grade A threshold",
            ));
        }
        let a = &self.actuation;
        if a.conveyor_a < a.conveyor_b || a.conveyor_b < a.conveyor_c {
            return Err(BuildError::InvalidConfig(
                "conveyor durations must satisfy a >= b >= c",
            ));
        }
        if a.tick.is_zero() {
            return Err(BuildError::InvalidConfig("actuation tick must be > 0"));
        }
        if let Some(c) = &self.calibration
            && (!c.calibration_factor.is_finite() || c.calibration_factor == 0.0)
        {
            return Err(BuildError::InvalidConfig(
                "calibration factor must be finite and non-zero",
            ));
        }
        Ok(())
    }

    pub fn try_build(self) -> Result<GradingController> {
        self.validate()?;
        let scale = self.scale.ok_or(BuildError::MissingScale)?;
        let diverter = self.diverter.ok_or(BuildError::MissingDiverter)?;
        let pusher = self.pusher.ok_or(BuildError::MissingPusher)?;
        let conveyor = self.conveyor.ok_or(BuildError::MissingConveyor)?;
        let network = self.network.ok_or(BuildError::MissingNetwork)?;
        let broker = self.broker.ok_or(BuildError::MissingBroker)?;

        let clock: SharedClock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let pending = self.pending.unwrap_or_default();
        let calibration = self.calibration.unwrap_or_default();

        let scale = CalibratedScale::new(scale, calibration, self.scale_cfg)
            .with_clock(clock.clone());
        let engine = GradeEngine::new(
            scale,
            StabilityDetector::new(self.stability),
            self.thresholds,
            pending.clone(),
        );

        let telemetry = TelemetryPublisher::new(self.telemetry, self.link.topics.clone());
        let mut link = ConnectivityManager::new(network, broker, self.link, pending)
            .with_clock(clock.clone());
        if let Some(flag) = self.shutdown {
            link = link.with_shutdown(flag);
        }
        if let Some(hook) = self.progress {
            link = link.with_progress(hook);
        }

        let mode = self.actuation.mode;
        let sequencer = ActuationSequencer::new(diverter, pusher, conveyor, self.actuation)
            .with_clock(clock.clone());

        tracing::debug!(
            calibration_factor = calibration.calibration_factor,
            tare_offset = calibration.tare_offset,
            ?mode,
            "controller built"
        );

        Ok(GradingController {
            engine,
            link,
            telemetry,
            sequencer,
            mode,
            runner: self.runner,
            epoch: clock.now(),
            clock,
            cycles: 0,
            local_decisions: 0,
            remote_decisions: 0,
        })
    }
}
