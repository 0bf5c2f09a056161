//! Raw-count to grams conversion.

use crate::error::{GraderError, Result};

/// Linear load-cell model: `grams = (raw - tare_offset) / calibration_factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Raw counts per gram; negative when the cell is wired reversed.
    pub calibration_factor: f32,
    /// Raw counts with an empty platform.
    pub tare_offset: i32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            calibration_factor: 400.40,
            tare_offset: 0,
        }
    }
}

impl Calibration {
    pub fn new(calibration_factor: f32, tare_offset: i32) -> Result<Self> {
        if !calibration_factor.is_finite() || calibration_factor == 0.0 {
            return Err(GraderError::Config(
                "calibration_factor must be finite and non-zero".into(),
            )
            .into());
        }
        Ok(Self {
            calibration_factor,
            tare_offset,
        })
    }

    /// Convert an (averaged) raw reading to grams.
    #[inline]
    pub fn to_grams(&self, raw: f64) -> f32 {
        ((raw - f64::from(self.tare_offset)) / f64::from(self.calibration_factor)) as f32
    }

    /// Derive the factor from a reading taken with a known reference weight.
    pub fn with_known_weight(tare_offset: i32, raw_loaded: i32, known_grams: f32) -> Result<Self> {
        if !(known_grams.is_finite() && known_grams > 0.0) {
            return Err(GraderError::Config("reference weight must be > 0 g".into()).into());
        }
        let delta = i64::from(raw_loaded) - i64::from(tare_offset);
        if delta == 0 {
            return Err(GraderError::Config(
                "loaded reading equals tare; is the reference weight on the platform?".into(),
            )
            .into());
        }
        Self::new(
            (delta as f64 / f64::from(known_grams)) as f32,
            tare_offset,
        )
    }
}
