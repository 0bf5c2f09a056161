//! Maps `Box<dyn Error>` from trait boundaries to typed `GraderError`.
//!
//! With the `hardware-errors` feature, `grader_hardware::HwError` is downcast
//! for precise mapping; otherwise the message text is inspected.

use crate::error::GraderError;

/// Map a trait-boundary error to a typed `GraderError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> GraderError {
    #[cfg(feature = "hardware-errors")]
    {
        use grader_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout | HwError::DataReadyTimeout => GraderError::SensorNotReady,
                other => GraderError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("not ready") {
        GraderError::SensorNotReady
    } else {
        GraderError::Hardware(s)
    }
}

/// Same as [`map_hw_error`] for an owned boxed error.
pub fn map_boxed(e: &grader_traits::BoxError) -> GraderError {
    map_hw_error(e.as_ref())
}
