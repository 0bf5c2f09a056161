//! Calibrated Scale: averaged raw reads converted to grams.

use std::sync::Arc;
use std::time::Instant;

use grader_traits::{Clock, MonotonicClock, Scale};

use crate::SharedClock;
use crate::calibration::Calibration;
use crate::config::ScaleCfg;
use crate::error::GraderError;
use crate::hw_error::map_boxed;
use crate::types::WeightSample;

pub struct CalibratedScale<S> {
    scale: S,
    calibration: Calibration,
    cfg: ScaleCfg,
    clock: SharedClock,
    epoch: Instant,
}

impl<S: Scale> CalibratedScale<S> {
    pub fn new(scale: S, calibration: Calibration, cfg: ScaleCfg) -> Self {
        let clock: SharedClock = Arc::new(MonotonicClock::new());
        let epoch = clock.now();
        Self {
            scale,
            calibration,
            cfg,
            clock,
            epoch,
        }
    }

    /// Replace the clock used for sample timestamps. Resets the epoch.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.epoch = clock.now();
        self.clock = clock;
        self
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Mean of `samples_per_read` raw reads. Any failed read fails the whole
    /// average; a not-ready driver maps to `SensorNotReady`.
    pub fn read_raw(&mut self) -> Result<f64, GraderError> {
        let n = self.cfg.samples_per_read.max(1);
        let mut sum = 0i64;
        for _ in 0..n {
            let raw = self
                .scale
                .read(self.cfg.read_timeout)
                .map_err(|e| map_boxed(&e))?;
            sum += i64::from(raw);
        }
        Ok(sum as f64 / f64::from(n))
    }

    pub fn read(&mut self) -> Result<WeightSample, GraderError> {
        let raw = self.read_raw()?;
        let mut grams = self.calibration.to_grams(raw);
        if !grams.is_finite() {
            return Err(GraderError::Hardware(format!("non-finite reading from raw {raw}")));
        }
        if grams.abs() < self.cfg.zero_band_g {
            grams = 0.0;
        }
        let sample = WeightSample::new(grams, self.clock.ms_since(self.epoch));
        tracing::trace!(raw, grams, ts_ms = sample.timestamp_ms, "sample");
        Ok(sample)
    }

    /// Take the current average reading as the empty-platform tare.
    pub fn tare(&mut self) -> Result<i32, GraderError> {
        let raw = self.read_raw()?;
        let tare = raw.round() as i32;
        self.calibration.tare_offset = tare;
        tracing::info!(tare_offset = tare, "tared");
        Ok(tare)
    }
}
