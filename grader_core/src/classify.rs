//! Ordered weight thresholds.

use crate::types::Grade;

/// `w >= grade_a_min_g -> A`, `grade_b_min_g <= w < grade_a_min_g -> B`, else C.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdTable {
    pub grade_a_min_g: f32,
    pub grade_b_min_g: f32,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            grade_a_min_g: 350.0,
            grade_b_min_g: 250.0,
        }
    }
}

impl ThresholdTable {
    pub fn classify(&self, grams: f32) -> Grade {
        if grams >= self.grade_a_min_g {
            Grade::A
        } else if grams >= self.grade_b_min_g {
            Grade::B
        } else {
            Grade::C
        }
    }
}
