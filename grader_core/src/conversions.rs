//! `From` implementations bridging `grader_config` types to `grader_core` types.

use std::time::Duration;

use crate::calibration::Calibration;
use crate::classify::ThresholdTable;
use crate::config::{
    ActuationCfg, ActuationMode, LinkCfg, RunnerCfg, ScaleCfg, StabilityCfg, TelemetryCfg, Topics,
};

impl From<&grader_config::ScaleCfg> for ScaleCfg {
    fn from(c: &grader_config::ScaleCfg) -> Self {
        Self {
            samples_per_read: c.samples_per_read,
            read_timeout: Duration::from_millis(c.read_timeout_ms),
            zero_band_g: c.zero_band_g,
        }
    }
}

impl From<&grader_config::StabilityCfg> for StabilityCfg {
    fn from(c: &grader_config::StabilityCfg) -> Self {
        Self {
            window: c.window,
            presence_floor_g: c.presence_floor_g,
            tolerance_g: c.tolerance_g,
            settle_deadline_ms: c.settle_deadline_ms,
        }
    }
}

impl From<&grader_config::ThresholdCfg> for ThresholdTable {
    fn from(c: &grader_config::ThresholdCfg) -> Self {
        Self {
            grade_a_min_g: c.grade_a_min_g,
            grade_b_min_g: c.grade_b_min_g,
        }
    }
}

impl From<&grader_config::TopicsCfg> for Topics {
    fn from(c: &grader_config::TopicsCfg) -> Self {
        Self {
            override_grade: c.override_grade.clone(),
            command: c.command.clone(),
            weight: c.weight.clone(),
            grade: c.grade.clone(),
            status: c.status.clone(),
        }
    }
}

impl From<&grader_config::Config> for LinkCfg {
    fn from(c: &grader_config::Config) -> Self {
        Self {
            association_poll: Duration::from_millis(c.network.association_poll_ms),
            reconnect_backoff: Duration::from_millis(c.broker.reconnect_backoff_ms),
            topics: Topics::from(&c.topics),
        }
    }
}

impl From<&grader_config::TelemetryCfg> for TelemetryCfg {
    fn from(c: &grader_config::TelemetryCfg) -> Self {
        Self {
            live_weight_interval_ms: c.live_weight_interval_ms,
            echo_remote_grades: c.echo_remote_grades,
            status_interval_ms: c.status_interval_ms,
            device_name: c.device_name.clone(),
        }
    }
}

impl From<grader_config::ActuationMode> for ActuationMode {
    fn from(m: grader_config::ActuationMode) -> Self {
        match m {
            grader_config::ActuationMode::Ticked => ActuationMode::Ticked,
            grader_config::ActuationMode::Blocking => ActuationMode::Blocking,
        }
    }
}

impl From<&grader_config::ActuationCfg> for ActuationCfg {
    fn from(c: &grader_config::ActuationCfg) -> Self {
        Self {
            mode: c.mode.into(),
            diverter_rest_deg: c.diverter_rest_deg,
            diverter_b_deg: c.diverter_b_deg,
            diverter_c_deg: c.diverter_c_deg,
            pusher_rest_deg: c.pusher_rest_deg,
            pusher_engaged_deg: c.pusher_engaged_deg,
            servo_settle: Duration::from_millis(c.servo_settle_ms),
            push_dwell: Duration::from_millis(c.push_dwell_ms),
            conveyor_a: Duration::from_millis(c.conveyor_a_ms),
            conveyor_b: Duration::from_millis(c.conveyor_b_ms),
            conveyor_c: Duration::from_millis(c.conveyor_c_ms),
            tick: Duration::from_millis(c.tick_ms),
        }
    }
}

impl From<&grader_config::RunnerCfg> for RunnerCfg {
    fn from(c: &grader_config::RunnerCfg) -> Self {
        Self {
            cycle: Duration::from_millis(c.cycle_ms),
        }
    }
}

impl From<&grader_config::Calibration> for Calibration {
    fn from(c: &grader_config::Calibration) -> Self {
        Self {
            calibration_factor: c.calibration_factor,
            tare_offset: c.tare_offset,
        }
    }
}

impl From<&grader_config::PersistedCalibration> for Calibration {
    fn from(c: &grader_config::PersistedCalibration) -> Self {
        Self {
            calibration_factor: c.calibration_factor,
            tare_offset: c.tare_offset,
        }
    }
}
