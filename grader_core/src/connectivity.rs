//! Connectivity Manager: network association, broker session and inbound
//! message dispatch.
//!
//! `poll()` is the only entry point per cycle. A down network blocks the
//! caller until association succeeds (or shutdown is requested); a down
//! broker gets one connect attempt per poll followed by the fixed backoff.
//! Subscriptions are re-issued after every successful connect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use grader_traits::{Broker, MonotonicClock, Network};

use crate::SharedClock;
use crate::config::LinkCfg;
use crate::error::{GraderError, Link};
use crate::hw_error::map_boxed;
use crate::pending::{PendingOverride, parse_grade};
use crate::telemetry::TelemetrySink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Connected => "connected",
            LinkState::Disconnected => "disconnected",
        }
    }
}

/// Process-wide connection view; only the manager mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub network: LinkState,
    pub broker: LinkState,
}

impl ConnectionState {
    pub fn is_online(&self) -> bool {
        self.network == LinkState::Connected && self.broker == LinkState::Connected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    DisconnectedNet,
    ConnectingNet,
    ConnectedNet,
    DisconnectedBroker,
    ConnectingBroker,
    ConnectedBroker,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub network_losses: u64,
    pub broker_losses: u64,
    pub broker_connects: u64,
    pub broker_failures: u64,
    pub overrides: u64,
    pub unknown_grades: u64,
    pub commands: u64,
    pub publish_failures: u64,
}

type ProgressHook = Box<dyn FnMut(u32)>;

pub struct ConnectivityManager<N, B> {
    network: N,
    broker: B,
    cfg: LinkCfg,
    clock: SharedClock,
    pending: PendingOverride,
    state: ConnectionState,
    phase: ConnectionPhase,
    subscribed: bool,
    last_command: Option<String>,
    stats: LinkStats,
    shutdown: Option<Arc<AtomicBool>>,
    on_progress: Option<ProgressHook>,
}

impl<N: Network, B: Broker> ConnectivityManager<N, B> {
    pub fn new(network: N, broker: B, cfg: LinkCfg, pending: PendingOverride) -> Self {
        Self {
            network,
            broker,
            cfg,
            clock: Arc::new(MonotonicClock::new()),
            pending,
            state: ConnectionState {
                network: LinkState::Disconnected,
                broker: LinkState::Disconnected,
            },
            phase: ConnectionPhase::DisconnectedNet,
            subscribed: false,
            last_command: None,
            stats: LinkStats::default(),
            shutdown: None,
            on_progress: None,
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Abandon the association wait when this flag is raised.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    /// Called with the attempt number each time association is retried.
    pub fn with_progress(mut self, hook: impl FnMut(u32) + 'static) -> Self {
        self.on_progress = Some(Box::new(hook));
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    pub fn topics(&self) -> &crate::config::Topics {
        &self.cfg.topics
    }

    pub fn poll(&mut self) {
        if !self.ensure_network() {
            return;
        }
        self.reconnect();
        if self.state.broker == LinkState::Connected {
            for msg in self.broker.poll() {
                self.on_message(&msg.topic, &msg.payload);
            }
        }
    }

    /// Drain inbound messages without waiting on association or backoff.
    /// Used while an actuation sequence is in progress.
    pub fn service(&mut self) {
        if !self.network.is_connected() || !self.broker.is_connected() || !self.subscribed {
            return;
        }
        for msg in self.broker.poll() {
            self.on_message(&msg.topic, &msg.payload);
        }
    }

    /// Bring the broker session up if it is down. No-op when connected and
    /// subscribed. Returns whether the session is usable afterwards.
    pub fn reconnect(&mut self) -> bool {
        let alive = self.broker.is_connected();
        if alive && self.subscribed {
            self.state.broker = LinkState::Connected;
            self.phase = ConnectionPhase::ConnectedBroker;
            return true;
        }
        if !alive && self.state.broker == LinkState::Connected {
            self.stats.broker_losses += 1;
            tracing::warn!(error = %GraderError::ConnectivityLoss(Link::Broker), "broker session lost");
        }
        self.state.broker = LinkState::Disconnected;
        self.subscribed = false;
        self.phase = ConnectionPhase::ConnectingBroker;

        match self.connect_and_subscribe() {
            Ok(()) => {
                self.subscribed = true;
                self.state.broker = LinkState::Connected;
                self.phase = ConnectionPhase::ConnectedBroker;
                self.stats.broker_connects += 1;
                tracing::info!(
                    override_topic = %self.cfg.topics.override_grade,
                    command_topic = %self.cfg.topics.command,
                    "broker connected"
                );
                true
            }
            Err(e) => {
                self.stats.broker_failures += 1;
                self.phase = ConnectionPhase::DisconnectedBroker;
                tracing::warn!(
                    error = %e,
                    backoff_ms = self.cfg.reconnect_backoff.as_millis() as u64,
                    "broker connect failed"
                );
                self.clock.sleep(self.cfg.reconnect_backoff);
                false
            }
        }
    }

    fn connect_and_subscribe(&mut self) -> Result<(), GraderError> {
        self.broker.connect().map_err(|e| map_boxed(&e))?;
        for topic in [&self.cfg.topics.override_grade, &self.cfg.topics.command] {
            self.broker.subscribe(topic).map_err(|e| map_boxed(&e))?;
        }
        Ok(())
    }

    /// Returns false only when shutdown interrupted the wait.
    fn ensure_network(&mut self) -> bool {
        if self.network.is_connected() {
            if self.state.network == LinkState::Disconnected {
                tracing::info!("network up");
                self.state.network = LinkState::Connected;
            }
            return true;
        }

        if self.state.network == LinkState::Connected {
            self.stats.network_losses += 1;
            tracing::warn!(error = %GraderError::ConnectivityLoss(Link::Network), "network lost");
        }
        self.state.network = LinkState::Disconnected;
        self.state.broker = LinkState::Disconnected;
        self.subscribed = false;
        self.phase = ConnectionPhase::DisconnectedNet;

        let mut attempt = 0u32;
        loop {
            if self.shutdown_requested() {
                return false;
            }
            attempt = attempt.saturating_add(1);
            self.phase = ConnectionPhase::ConnectingNet;
            match self.network.associate() {
                Ok(()) if self.network.is_connected() => break,
                Ok(()) => {}
                Err(e) => tracing::debug!(error = %e, attempt, "association attempt failed"),
            }
            tracing::info!(attempt, "waiting for network");
            if let Some(hook) = self.on_progress.as_mut() {
                hook(attempt);
            }
            self.clock.sleep(self.cfg.association_poll);
        }

        self.state.network = LinkState::Connected;
        self.phase = ConnectionPhase::ConnectedNet;
        tracing::info!(attempts = attempt, "network associated");
        true
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Dispatch one inbound message. Malformed overrides are logged and dropped.
    pub fn on_message(&mut self, topic: &str, payload: &[u8]) {
        if topic == self.cfg.topics.override_grade {
            match parse_grade(payload) {
                Ok(grade) => {
                    self.stats.overrides += 1;
                    if let Some(prev) = self.pending.set(grade) {
                        tracing::info!(%grade, replaced = %prev, "override replaced unconsumed override");
                    } else {
                        tracing::info!(%grade, "override received");
                    }
                }
                Err(e) => {
                    self.stats.unknown_grades += 1;
                    tracing::warn!(error = %e, %topic, "override rejected");
                }
            }
        } else if topic == self.cfg.topics.command {
            self.stats.commands += 1;
            let cmd = String::from_utf8_lossy(payload).into_owned();
            tracing::info!(command = %cmd, "command received");
            self.last_command = Some(cmd);
        } else {
            tracing::debug!(%topic, "ignoring message on unknown topic");
        }
    }

    /// Best-effort publish. One attempt; failures are counted and reported.
    pub fn publish(&mut self, topic: &str, payload: &[u8]) -> bool {
        if self.state.broker != LinkState::Connected {
            self.stats.publish_failures += 1;
            tracing::debug!(%topic, "publish skipped; broker offline");
            return false;
        }
        match self.broker.publish(topic, payload) {
            Ok(()) => true,
            Err(e) => {
                self.stats.publish_failures += 1;
                tracing::warn!(error = %GraderError::PublishFailure(topic.to_string()), cause = %e, "telemetry dropped");
                false
            }
        }
    }
}

impl<N: Network, B: Broker> TelemetrySink for ConnectivityManager<N, B> {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> bool {
        ConnectivityManager::publish(self, topic, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grader_hardware::{SimulatedBroker, SimulatedNetwork};
    use grader_traits::clock::test_clock::TestClock;
    use std::time::Duration;

    fn manager(
        net: SimulatedNetwork,
    ) -> (
        ConnectivityManager<SimulatedNetwork, SimulatedBroker>,
        grader_hardware::SimBrokerHandle,
        PendingOverride,
        Arc<TestClock>,
    ) {
        let broker = SimulatedBroker::new();
        let h = broker.handle();
        let pending = PendingOverride::new();
        let clock = Arc::new(TestClock::new());
        let m = ConnectivityManager::new(net, broker, LinkCfg::default(), pending.clone())
            .with_clock(clock.clone());
        (m, h, pending, clock)
    }

    #[test]
    fn blocks_until_network_associates() {
        let net = SimulatedNetwork::up_after(4);
        let probe = net.share();
        let (mut m, h, _, clock) = manager(net);
        m.poll();
        assert_eq!(probe.attempts(), 4);
        assert!(m.state().is_online());
        assert_eq!(m.phase(), ConnectionPhase::ConnectedBroker);
        assert_eq!(clock.elapsed(), Duration::from_millis(3 * 500));
        assert_eq!(h.subscriptions(), vec!["iot/python/grade", "device/command"]);
    }

    #[test]
    fn shutdown_interrupts_association_wait() {
        let flag = Arc::new(AtomicBool::new(true));
        let (m, _, _, _) = manager(SimulatedNetwork::up_after(u32::MAX));
        let mut m = m.with_shutdown(flag);
        m.poll();
        assert_eq!(m.state().network, LinkState::Disconnected);
    }

    #[test]
    fn refused_broker_backs_off_once_per_poll() {
        let (mut m, h, _, clock) = manager(SimulatedNetwork::connected());
        h.refuse_connects(2);
        m.poll();
        assert_eq!(m.state().broker, LinkState::Disconnected);
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
        m.poll();
        m.poll();
        assert!(m.state().is_online());
        assert_eq!(m.stats().broker_failures, 2);
    }

    #[test]
    fn reconnect_when_connected_is_noop() {
        let (mut m, h, _, _) = manager(SimulatedNetwork::connected());
        m.poll();
        let calls = h.subscribe_calls();
        assert!(m.reconnect());
        assert!(m.reconnect());
        assert_eq!(h.connects(), 1);
        assert_eq!(h.subscribe_calls(), calls);
    }

    #[test]
    fn session_reset_resubscribes() {
        let (mut m, h, pending, _) = manager(SimulatedNetwork::connected());
        m.poll();
        h.drop_session();
        assert!(h.subscriptions().is_empty());
        m.poll();
        assert_eq!(h.connects(), 2);
        assert_eq!(m.stats().broker_losses, 1);
        h.inject("iot/python/grade", b"C");
        m.poll();
        assert_eq!(pending.take(), Some(crate::types::Grade::C));
    }

    #[test]
    fn service_never_waits() {
        let net = SimulatedNetwork::connected();
        let probe = net.share();
        let (mut m, h, pending, clock) = manager(net);
        m.poll();
        h.inject("iot/python/grade", b"A");
        probe.drop_link(5);
        m.service();
        assert_eq!(clock.elapsed(), Duration::ZERO);
        assert_eq!(pending.peek(), None);
        m.poll();
        assert_eq!(clock.elapsed(), Duration::from_millis(4 * 500));
        assert_eq!(pending.take(), Some(crate::types::Grade::A));
    }

    #[test]
    fn bad_override_leaves_pending_untouched() {
        let (mut m, _, pending, _) = manager(SimulatedNetwork::connected());
        m.on_message("iot/python/grade", b"X");
        assert_eq!(pending.peek(), None);
        assert_eq!(m.stats().unknown_grades, 1);
    }

    #[test]
    fn commands_are_recorded() {
        let (mut m, _, pending, _) = manager(SimulatedNetwork::connected());
        m.on_message("device/command", br#"{"action":"start"}"#);
        assert_eq!(m.last_command(), Some(r#"{"action":"start"}"#));
        assert_eq!(m.stats().commands, 1);
        assert_eq!(pending.peek(), None);
    }

    #[test]
    fn publish_offline_fails_without_retry() {
        let (mut m, h, _, _) = manager(SimulatedNetwork::connected());
        assert!(!m.publish("iot/machine/grade", b"A"));
        m.poll();
        h.set_publish_failing(true);
        assert!(!m.publish("iot/machine/grade", b"A"));
        h.set_publish_failing(false);
        assert!(m.publish("iot/machine/grade", b"B"));
        assert_eq!(h.published_on("iot/machine/grade"), vec!["B"]);
        assert_eq!(m.stats().publish_failures, 2);
    }
}
