//! Runtime configuration for the controller components.
//!
//! Separate from the TOML schema in `grader_config`; see `conversions` for the
//! bridges.

use std::time::Duration;

/// Calibrated scale settings.
#[derive(Debug, Clone)]
pub struct ScaleCfg {
    /// Raw reads averaged into one sample (>= 1).
    pub samples_per_read: u8,
    /// Per raw read data-ready timeout.
    pub read_timeout: Duration,
    /// |grams| below this is reported as 0.
    pub zero_band_g: f32,
}

impl Default for ScaleCfg {
    fn default() -> Self {
        Self {
            samples_per_read: 5,
            read_timeout: Duration::from_millis(150),
            zero_band_g: 1.0,
        }
    }
}

/// Stability detector settings.
#[derive(Debug, Clone)]
pub struct StabilityCfg {
    /// Window size K.
    pub window: usize,
    pub presence_floor_g: f32,
    pub tolerance_g: f32,
    pub settle_deadline_ms: u64,
}

impl Default for StabilityCfg {
    fn default() -> Self {
        Self {
            window: 10,
            presence_floor_g: 100.0,
            tolerance_g: 5.0,
            settle_deadline_ms: 5_000,
        }
    }
}

/// Topic names used on the message bus.
#[derive(Debug, Clone)]
pub struct Topics {
    pub override_grade: String,
    pub command: String,
    pub weight: String,
    pub grade: String,
    pub status: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            override_grade: "iot/python/grade".into(),
            command: "device/command".into(),
            weight: "iot/machine/weight".into(),
            grade: "iot/machine/grade".into(),
            status: "iot/machine/status".into(),
        }
    }
}

/// Connectivity manager settings.
#[derive(Debug, Clone)]
pub struct LinkCfg {
    pub association_poll: Duration,
    pub reconnect_backoff: Duration,
    pub topics: Topics,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            association_poll: Duration::from_millis(500),
            reconnect_backoff: Duration::from_millis(3_000),
            topics: Topics::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryCfg {
    /// 0 disables live weight messages.
    pub live_weight_interval_ms: u64,
    pub echo_remote_grades: bool,
    /// 0 disables the heartbeat.
    pub status_interval_ms: u64,
    pub device_name: String,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            live_weight_interval_ms: 500,
            echo_remote_grades: false,
            status_interval_ms: 10_000,
            device_name: "Sorter_01".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActuationMode {
    /// Advanced by `tick()` from the control loop.
    #[default]
    Ticked,
    /// Runs to completion inside the cycle.
    Blocking,
}

#[derive(Debug, Clone)]
pub struct ActuationCfg {
    pub mode: ActuationMode,
    pub diverter_rest_deg: u8,
    pub diverter_b_deg: u8,
    pub diverter_c_deg: u8,
    pub pusher_rest_deg: u8,
    pub pusher_engaged_deg: u8,
    pub servo_settle: Duration,
    pub push_dwell: Duration,
    pub conveyor_a: Duration,
    pub conveyor_b: Duration,
    pub conveyor_c: Duration,
    /// Sleep between ticks in blocking mode and while a ticked sequence runs.
    pub tick: Duration,
}

impl Default for ActuationCfg {
    fn default() -> Self {
        Self {
            mode: ActuationMode::Ticked,
            diverter_rest_deg: 90,
            diverter_b_deg: 45,
            diverter_c_deg: 135,
            pusher_rest_deg: 0,
            pusher_engaged_deg: 90,
            servo_settle: Duration::from_millis(300),
            push_dwell: Duration::from_millis(500),
            conveyor_a: Duration::from_millis(3_000),
            conveyor_b: Duration::from_millis(2_000),
            conveyor_c: Duration::from_millis(1_000),
            tick: Duration::from_millis(20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerCfg {
    /// Pause after a cycle with nothing to do.
    pub cycle: Duration,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            cycle: Duration::from_millis(50),
        }
    }
}
