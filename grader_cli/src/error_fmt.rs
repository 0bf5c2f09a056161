//! Human-readable error descriptions and structured JSON error formatting.

use grader_core::error::{BuildError, GraderError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        let device = match be {
            BuildError::MissingScale => "scale",
            BuildError::MissingDiverter => "diverter servo",
            BuildError::MissingPusher => "pusher servo",
            BuildError::MissingConveyor => "conveyor motor",
            BuildError::MissingNetwork => "network link",
            BuildError::MissingBroker => "broker session",
            BuildError::InvalidConfig(msg) => {
                return format!(
                    "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/grader_config.toml for a sample."
                );
            }
        };
        return format!(
            "What happened: No {device} was provided to the controller.\nLikely causes: The device failed to initialize or was not wired into the builder.\nHow to fix: Check the device setup and that it is passed to the builder."
        );
    }

    if let Some(ge) = err.downcast_ref::<GraderError>() {
        return match ge {
            GraderError::Config(msg) if msg.contains("calibration CSV must have headers") => {
                "Invalid headers in calibration CSV. Expected 'raw,grams'.".to_string()
            }
            GraderError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing [pins], a typo in a key, or out-of-range values.\nHow to fix: Edit the config file, then rerun. See etc/grader_config.toml for a sample."
            ),
            GraderError::SensorNotReady => "What happened: The HX711 did not produce data within the configured timeout.\nLikely causes: Wrong DT/SCK pins, wiring or power issues, or scale.read_timeout_ms too low.\nHow to fix: Check [pins] in the config, verify 5V/GND, and raise scale.read_timeout_ms.".to_string(),
            GraderError::Hardware(msg) | GraderError::HardwareFault(msg) => format!(
                "What happened: Hardware failure ({msg}).\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process may access GPIO."
            ),
            GraderError::UnknownGrade(p) => format!(
                "What happened: {p:?} is not a grade.\nLikely causes: A typo in the grade value.\nHow to fix: Use one of A, B or C."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: configuration 2, hardware 3, anything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    match err.downcast_ref::<GraderError>() {
        Some(GraderError::Config(_)) => 2,
        Some(
            GraderError::SensorNotReady | GraderError::Hardware(_) | GraderError::HardwareFault(_),
        ) => 3,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    match err.downcast_ref::<GraderError>() {
        Some(GraderError::Config(_)) => "Config",
        Some(GraderError::SensorNotReady) => "SensorNotReady",
        Some(GraderError::Hardware(_) | GraderError::HardwareFault(_)) => "Hardware",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_exit_with_two() {
        let e: eyre::Report = GraderError::Config("stability.window must be >= 2".into()).into();
        assert_eq!(exit_code_for_error(&e), 2);
        assert!(humanize(&e).contains("Invalid configuration"));
        let e: eyre::Report = BuildError::MissingScale.into();
        assert_eq!(exit_code_for_error(&e), 2);
        assert!(humanize(&e).contains("No scale"));
    }

    #[test]
    fn hardware_errors_exit_with_three() {
        let e: eyre::Report = GraderError::HardwareFault("open hx711: denied".into()).into();
        assert_eq!(exit_code_for_error(&e), 3);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&e)).unwrap();
        assert_eq!(v["reason"], "Hardware");
        assert_eq!(v["code"], 3);
    }

    #[test]
    fn other_errors_exit_with_one() {
        let e = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&e), 1);
        assert!(humanize(&e).contains("Original: boom"));
    }
}
