//! Stability Detector: decides when a stream of samples has settled.
//!
//! The window holds at most K samples. Once full it is STABLE when every
//! sample lies within `tolerance_g` of the first; otherwise the oldest is
//! dropped and accumulation continues. An item that stays above the presence
//! floor without settling for `settle_deadline_ms` is dropped: the detector
//! reports EMPTY until the platform is cleared.

use std::collections::VecDeque;

use crate::config::StabilityCfg;
use crate::error::GraderError;
use crate::types::WeightSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityState {
    Accumulating,
    Stable,
    Empty,
}

#[derive(Debug)]
pub struct StabilityDetector {
    cfg: StabilityCfg,
    window: VecDeque<WeightSample>,
    /// Timestamp of the first present sample of the current item.
    settle_started_ms: Option<u64>,
    /// Set when the current item exceeded the deadline.
    dropped: bool,
    settle_timeouts: u64,
}

impl StabilityDetector {
    pub fn new(cfg: StabilityCfg) -> Self {
        let cap = cfg.window.max(1);
        Self {
            cfg,
            window: VecDeque::with_capacity(cap + 1),
            settle_started_ms: None,
            dropped: false,
            settle_timeouts: 0,
        }
    }

    pub fn observe(&mut self, sample: WeightSample) -> StabilityState {
        if sample.grams < self.cfg.presence_floor_g {
            if !self.window.is_empty() || self.dropped {
                tracing::debug!(grams = sample.grams, "platform empty");
            }
            self.reset();
            return StabilityState::Empty;
        }
        if self.dropped {
            return StabilityState::Empty;
        }

        let started = *self.settle_started_ms.get_or_insert(sample.timestamp_ms);
        let k = self.cfg.window.max(1);
        self.window.push_back(sample);
        while self.window.len() > k {
            self.window.pop_front();
        }

        if self.window.len() == k && self.max_deviation() <= self.cfg.tolerance_g {
            tracing::debug!(grams = sample.grams, "stable");
            return StabilityState::Stable;
        }

        if sample.timestamp_ms.saturating_sub(started) >= self.cfg.settle_deadline_ms {
            self.settle_timeouts += 1;
            tracing::warn!(
                error = %GraderError::SettleTimeout,
                grams = sample.grams,
                deadline_ms = self.cfg.settle_deadline_ms,
                "dropping item"
            );
            self.window.clear();
            self.dropped = true;
            return StabilityState::Empty;
        }

        if self.window.len() == k {
            self.window.pop_front();
        }
        StabilityState::Accumulating
    }

    /// Clear the window and any dropped item. Called after a decision.
    pub fn reset(&mut self) {
        self.window.clear();
        self.settle_started_ms = None;
        self.dropped = false;
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Most recent sample in the window.
    pub fn latest(&self) -> Option<WeightSample> {
        self.window.back().copied()
    }

    /// Items dropped for exceeding the settle deadline.
    pub fn settle_timeouts(&self) -> u64 {
        self.settle_timeouts
    }

    fn max_deviation(&self) -> f32 {
        let Some(first) = self.window.front() else {
            return 0.0;
        };
        self.window
            .iter()
            .map(|s| (s.grams - first.grams).abs())
            .fold(0.0f32, f32::max)
    }
}
