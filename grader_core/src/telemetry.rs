//! Telemetry Publisher: weight, grade and heartbeat messages.
//!
//! Every publish is a single best-effort attempt; the boolean result is
//! informational only.

use crate::config::{TelemetryCfg, Topics};
use crate::connectivity::ConnectionState;
use crate::types::{DecisionSource, Grade, GradeDecision};

/// Anything that can push a payload onto the bus.
pub trait TelemetrySink {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> bool;
}

/// Heartbeat contents published on the status topic.
#[derive(Debug, Clone, Copy)]
pub struct StatusReport {
    pub uptime_ms: u64,
    pub connection: ConnectionState,
    pub decisions: u64,
}

pub struct TelemetryPublisher {
    cfg: TelemetryCfg,
    topics: Topics,
    last_live_ms: Option<u64>,
    last_status_ms: Option<u64>,
}

impl TelemetryPublisher {
    pub fn new(cfg: TelemetryCfg, topics: Topics) -> Self {
        Self {
            cfg,
            topics,
            last_live_ms: None,
            last_status_ms: None,
        }
    }

    /// Weight as decimal grams text, two places.
    pub fn publish_weight(&self, sink: &mut dyn TelemetrySink, grams: f32) -> bool {
        sink.publish(&self.topics.weight, format_grams(grams).as_bytes())
    }

    pub fn publish_grade(&self, sink: &mut dyn TelemetrySink, grade: Grade) -> bool {
        sink.publish(&self.topics.grade, grade.as_str().as_bytes())
    }

    /// Local decisions publish their weight and grade. Remote decisions are
    /// echoed only when configured. Returns false if any publish failed.
    pub fn publish_decision(&mut self, sink: &mut dyn TelemetrySink, d: &GradeDecision) -> bool {
        match d.source {
            DecisionSource::LocalSensor => {
                let weight_ok = d.weight.is_none_or(|g| self.publish_weight(sink, g));
                let grade_ok = self.publish_grade(sink, d.grade);
                weight_ok && grade_ok
            }
            DecisionSource::RemoteOverride if self.cfg.echo_remote_grades => {
                self.publish_grade(sink, d.grade)
            }
            DecisionSource::RemoteOverride => true,
        }
    }

    /// Live weight, at most once per `live_weight_interval_ms`. `None` when
    /// throttled or disabled.
    pub fn maybe_publish_live(
        &mut self,
        sink: &mut dyn TelemetrySink,
        now_ms: u64,
        grams: f32,
    ) -> Option<bool> {
        let interval = self.cfg.live_weight_interval_ms;
        if !due(interval, self.last_live_ms, now_ms) {
            return None;
        }
        self.last_live_ms = Some(now_ms);
        Some(self.publish_weight(sink, grams))
    }

    pub fn maybe_publish_status(
        &mut self,
        sink: &mut dyn TelemetrySink,
        now_ms: u64,
        report: &StatusReport,
    ) -> Option<bool> {
        if !due(self.cfg.status_interval_ms, self.last_status_ms, now_ms) {
            return None;
        }
        self.last_status_ms = Some(now_ms);
        let body = status_json(&self.cfg.device_name, report);
        Some(sink.publish(&self.topics.status, body.as_bytes()))
    }
}

fn due(interval_ms: u64, last: Option<u64>, now_ms: u64) -> bool {
    interval_ms > 0 && last.is_none_or(|t| now_ms.saturating_sub(t) >= interval_ms)
}

pub fn format_grams(grams: f32) -> String {
    format!("{grams:.2}")
}

pub fn status_json(device: &str, report: &StatusReport) -> String {
    serde_json::json!({
        "device": device,
        "uptime_s": report.uptime_ms / 1_000,
        "network": report.connection.network.as_str(),
        "broker": report.connection.broker.as_str(),
        "decisions": report.decisions,
    })
    .to_string()
}
