//! Result of one control cycle.

use crate::types::{Grade, GradeDecision};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// No decision this cycle.
    Idle,
    /// A decision was made. In blocking mode it has already been actuated.
    Decided(GradeDecision),
    /// A ticked sequence is still running.
    Actuating(Grade),
    /// A ticked sequence finished this cycle.
    Actuated(Grade),
}
