#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and calibration parsing for the grading controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Calibration CSV loader enforces headers and fits the load-cell line with a
//!   single outlier-rejecting refit.
use serde::Deserialize;

mod calibration;

pub use calibration::{Calibration, CalibrationRow, load_calibration_csv};

#[derive(Debug, Deserialize)]
pub struct Pins {
    pub hx711_dt: u8,
    pub hx711_sck: u8,
    pub diverter_servo: u8,
    pub pusher_servo: u8,
    pub conveyor_motor: u8,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScaleCfg {
    /// Raw reads averaged into one sample.
    pub samples_per_read: u8,
    /// Max time to wait for HX711 data-ready per raw read.
    pub read_timeout_ms: u64,
    /// Readings with |grams| below this are reported as exactly 0.
    pub zero_band_g: f32,
}

impl Default for ScaleCfg {
    fn default() -> Self {
        Self {
            samples_per_read: 5,
            read_timeout_ms: 150,
            zero_band_g: 1.0,
        }
    }
}

/// Calibration persisted in the config file; the only state expected to
/// survive a restart.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PersistedCalibration {
    /// Raw counts per gram.
    pub calibration_factor: f32,
    /// Raw counts with an empty platform.
    #[serde(default)]
    pub tare_offset: i32,
}

impl From<PersistedCalibration> for Calibration {
    fn from(p: PersistedCalibration) -> Self {
        Calibration {
            calibration_factor: p.calibration_factor,
            tare_offset: p.tare_offset,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StabilityCfg {
    /// Samples that must agree before a reading is trusted.
    pub window: usize,
    /// Below this the platform is considered empty.
    pub presence_floor_g: f32,
    /// Max deviation from the window's first sample.
    pub tolerance_g: f32,
    /// An item that has not settled after this long is dropped.
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

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ThresholdCfg {
    pub grade_a_min_g: f32,
    pub grade_b_min_g: f32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GradingCfg {
    /// Table applied to stabilized weights on this controller.
    pub local: ThresholdCfg,
    /// Table the external classifier is believed to use. Diagnostics only.
    pub remote: ThresholdCfg,
}

impl Default for GradingCfg {
    fn default() -> Self {
        Self {
            local: ThresholdCfg {
                grade_a_min_g: 350.0,
                grade_b_min_g: 250.0,
            },
            remote: ThresholdCfg {
                grade_a_min_g: 600.0,
                grade_b_min_g: 300.0,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NetworkCfg {
    /// Pause between association attempts while the link is down.
    pub association_poll_ms: u64,
    /// Interface whose kernel operstate decides link up/down.
    pub interface: String,
    /// `host:port` on the local network to probe instead of the interface.
    /// Must not be the broker endpoint.
    pub probe_addr: Option<String>,
    /// Re-probe an up link at most this often.
    pub recheck_s: u64,
}

impl Default for NetworkCfg {
    fn default() -> Self {
        Self {
            association_poll_ms: 500,
            interface: "wlan0".into(),
            probe_addr: None,
            recheck_s: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BrokerCfg {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_s: u64,
    /// Wait after a failed broker connect before the next attempt.
    pub reconnect_backoff_ms: u64,
}

impl Default for BrokerCfg {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "grader-esp".into(),
            keep_alive_s: 60,
            reconnect_backoff_ms: 3_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TopicsCfg {
    pub override_grade: String,
    pub command: String,
    pub weight: String,
    pub grade: String,
    pub status: String,
}

impl Default for TopicsCfg {
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

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActuationMode {
    /// Sequence advanced by short ticks; connectivity keeps being serviced.
    #[default]
    Ticked,
    /// Sequence runs to completion inside the cycle.
    Blocking,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ActuationCfg {
    pub mode: ActuationMode,
    pub diverter_rest_deg: u8,
    pub diverter_b_deg: u8,
    pub diverter_c_deg: u8,
    pub pusher_rest_deg: u8,
    pub pusher_engaged_deg: u8,
    pub servo_settle_ms: u64,
    pub push_dwell_ms: u64,
    pub conveyor_a_ms: u64,
    pub conveyor_b_ms: u64,
    pub conveyor_c_ms: u64,
    pub tick_ms: u64,
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
            servo_settle_ms: 300,
            push_dwell_ms: 500,
            conveyor_a_ms: 3_000,
            conveyor_b_ms: 2_000,
            conveyor_c_ms: 1_000,
            tick_ms: 20,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TelemetryCfg {
    /// Period of live weight messages; 0 disables them.
    pub live_weight_interval_ms: u64,
    /// Also publish grades that came from a remote override.
    pub echo_remote_grades: bool,
    /// Period of the status heartbeat; 0 disables it.
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

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunnerCfg {
    /// Pause after a cycle that produced no decision.
    pub cycle_ms: u64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self { cycle_ms: 50 }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub scale: ScaleCfg,
    /// Optional persisted calibration; a calibration CSV passed at runtime wins.
    #[serde(default)]
    pub calibration: Option<PersistedCalibration>,
    #[serde(default)]
    pub stability: StabilityCfg,
    #[serde(default)]
    pub grading: GradingCfg,
    #[serde(default)]
    pub network: NetworkCfg,
    #[serde(default)]
    pub broker: BrokerCfg,
    #[serde(default)]
    pub topics: TopicsCfg,
    #[serde(default)]
    pub actuation: ActuationCfg,
    #[serde(default)]
    pub telemetry: TelemetryCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub runner: RunnerCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn check_thresholds(name: &str, t: &ThresholdCfg) -> eyre::Result<()> {
    if !t.grade_a_min_g.is_finite() || !t.grade_b_min_g.is_finite() {
        eyre::bail!("grading.{name} thresholds must be finite");
    }
    if t.grade_b_min_g < 0.0 {
        eyre::bail!("grading.{name}.grade_b_min_g must be >= 0");
    }
    if t.grade_b_min_g > t.grade_a_min_g {
        eyre::bail!("grading.{name}.grade_b_min_g must be <= grade_a_min_g");
    }
    Ok(())
}

fn check_topic(name: &str, topic: &str) -> eyre::Result<()> {
    if topic.trim().is_empty() {
        eyre::bail!("topics.{name} must not be empty");
    }
    if topic.contains(['+', '#']) {
        eyre::bail!("topics.{name} must not contain wildcards");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Scale
        if self.scale.samples_per_read == 0 {
            eyre::bail!("scale.samples_per_read must be >= 1");
        }
        if self.scale.read_timeout_ms == 0 {
            eyre::bail!("scale.read_timeout_ms must be >= 1");
        }
        if !self.scale.zero_band_g.is_finite() || self.scale.zero_band_g < 0.0 {
            eyre::bail!("scale.zero_band_g must be >= 0");
        }

        // Calibration
        if let Some(cal) = &self.calibration
            && (!cal.calibration_factor.is_finite() || cal.calibration_factor == 0.0)
        {
            eyre::bail!("calibration.calibration_factor must be finite and non-zero");
        }

        // Stability
        if self.stability.window < 2 {
            eyre::bail!("stability.window must be >= 2");
        }
        if !self.stability.presence_floor_g.is_finite() || self.stability.presence_floor_g <= 0.0 {
            eyre::bail!("stability.presence_floor_g must be finite and > 0");
        }
        if !self.stability.tolerance_g.is_finite() || self.stability.tolerance_g < 0.0 {
            eyre::bail!("stability.tolerance_g must be finite and >= 0");
        }
        if self.stability.settle_deadline_ms == 0 {
            eyre::bail!("stability.settle_deadline_ms must be >= 1");
        }

        // Grading
        check_thresholds("local", &self.grading.local)?;
        check_thresholds("remote", &self.grading.remote)?;

        // Connectivity
        if self.network.association_poll_ms == 0 {
            eyre::bail!("network.association_poll_ms must be >= 1");
        }
        if self.network.interface.trim().is_empty() {
            eyre::bail!("network.interface must not be empty");
        }
        if self.network.recheck_s == 0 {
            eyre::bail!("network.recheck_s must be >= 1");
        }
        if self.broker.host.trim().is_empty() {
            eyre::bail!("broker.host must not be empty");
        }
        if let Some(addr) = self.network.probe_addr.as_deref() {
            let broker = format!("{}:{}", self.broker.host, self.broker.port);
            if addr.trim().is_empty() || !addr.contains(':') {
                eyre::bail!("network.probe_addr must be host:port");
            }
            if addr.trim() == broker {
                eyre::bail!("network.probe_addr must not be the broker endpoint");
            }
        }
        if self.broker.reconnect_backoff_ms == 0 {
            eyre::bail!("broker.reconnect_backoff_ms must be >= 1");
        }
        check_topic("override_grade", &self.topics.override_grade)?;
        check_topic("command", &self.topics.command)?;
        check_topic("weight", &self.topics.weight)?;
        check_topic("grade", &self.topics.grade)?;
        check_topic("status", &self.topics.status)?;
        if self.topics.override_grade == self.topics.command {
            eyre::bail!("topics.override_grade and topics.command must differ");
        }

        // Actuation
        let a = &self.actuation;
        for (name, deg) in [
            ("diverter_rest_deg", a.diverter_rest_deg),
            ("diverter_b_deg", a.diverter_b_deg),
            ("diverter_c_deg", a.diverter_c_deg),
            ("pusher_rest_deg", a.pusher_rest_deg),
            ("pusher_engaged_deg", a.pusher_engaged_deg),
        ] {
            if deg > 180 {
                eyre::bail!("actuation.{name} must be in [0, 180]");
            }
        }
        if a.conveyor_c_ms == 0 {
            eyre::bail!("actuation.conveyor_c_ms must be >= 1");
        }
        if a.conveyor_a_ms < a.conveyor_b_ms || a.conveyor_b_ms < a.conveyor_c_ms {
            eyre::bail!("actuation conveyor times must satisfy a >= b >= c");
        }
        if a.tick_ms == 0 {
            eyre::bail!("actuation.tick_ms must be >= 1");
        }

        // Telemetry
        if self.telemetry.device_name.trim().is_empty() {
            eyre::bail!("telemetry.device_name must not be empty");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
