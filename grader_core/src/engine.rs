//! Grade Decision Engine: remote override first, then the local sensor path.

use grader_traits::Scale;

use crate::classify::ThresholdTable;
use crate::error::GraderError;
use crate::pending::PendingOverride;
use crate::scale::CalibratedScale;
use crate::stability::{StabilityDetector, StabilityState};
use crate::types::{GradeDecision, WeightSample};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub not_ready: u64,
    pub sensor_errors: u64,
}

pub struct GradeEngine<S> {
    scale: CalibratedScale<S>,
    detector: StabilityDetector,
    thresholds: ThresholdTable,
    pending: PendingOverride,
    last_sample: Option<WeightSample>,
    stats: EngineStats,
}

impl<S: Scale> GradeEngine<S> {
    pub fn new(
        scale: CalibratedScale<S>,
        detector: StabilityDetector,
        thresholds: ThresholdTable,
        pending: PendingOverride,
    ) -> Self {
        Self {
            scale,
            detector,
            thresholds,
            pending,
            last_sample: None,
            stats: EngineStats::default(),
        }
    }

    /// One decision attempt. At most one decision per call.
    pub fn decide(&mut self) -> Option<GradeDecision> {
        self.last_sample = None;

        if let Some(grade) = self.pending.take() {
            self.detector.reset();
            tracing::info!(%grade, source = "remote", "grade decided");
            return Some(GradeDecision::remote(grade));
        }

        let sample = match self.scale.read() {
            Ok(s) => s,
            Err(GraderError::SensorNotReady) => {
                self.stats.not_ready += 1;
                tracing::trace!("sensor not ready; skipping cycle");
                return None;
            }
            Err(e) => {
                self.stats.sensor_errors += 1;
                tracing::warn!(error = %e, "scale read failed; skipping cycle");
                return None;
            }
        };
        self.last_sample = Some(sample);

        match self.detector.observe(sample) {
            StabilityState::Empty | StabilityState::Accumulating => None,
            StabilityState::Stable => {
                let grams = self.detector.latest().map_or(sample.grams, |s| s.grams);
                let grade = self.thresholds.classify(grams);
                self.detector.reset();
                tracing::info!(%grade, grams, source = "local", "grade decided");
                Some(GradeDecision::local(grade, grams))
            }
        }
    }

    /// Sample read during the last `decide()`, if the local path ran.
    pub fn last_sample(&self) -> Option<WeightSample> {
        self.last_sample
    }

    pub fn thresholds(&self) -> ThresholdTable {
        self.thresholds
    }

    pub fn detector(&self) -> &StabilityDetector {
        &self.detector
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }
}
