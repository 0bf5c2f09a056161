//! In-process simulated devices.
//!
//! Each simulated device shares its state with a cloneable handle so a test or
//! the CLI can steer the device (place an item, drop the link, inject a broker
//! message) while the controller owns the device itself.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use grader_traits::{BoxError, Broker, InboundMessage, Motor, Network, Scale, Servo};

use crate::error::HwError;

// ── Scale ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct ScaleState {
    grams: Cell<f32>,
    ready: Cell<bool>,
    jitter_counts: Cell<i32>,
    reads: Cell<u64>,
}

/// Simulated load cell that reports `tare + grams * counts_per_gram` counts.
pub struct SimulatedScale {
    state: Rc<ScaleState>,
    counts_per_gram: f32,
    tare_counts: i32,
    lcg: u32,
}

/// Steering handle for a [`SimulatedScale`].
#[derive(Clone)]
pub struct SimScaleHandle(Rc<ScaleState>);

impl SimulatedScale {
    pub fn new(counts_per_gram: f32, tare_counts: i32) -> Self {
        Self {
            state: Rc::new(ScaleState {
                grams: Cell::new(0.0),
                ready: Cell::new(true),
                jitter_counts: Cell::new(0),
                reads: Cell::new(0),
            }),
            counts_per_gram,
            tare_counts,
            lcg: 0x2545_F491,
        }
    }

    pub fn handle(&self) -> SimScaleHandle {
        SimScaleHandle(self.state.clone())
    }

    fn next_jitter(&mut self) -> i32 {
        let amp = self.state.jitter_counts.get();
        if amp <= 0 {
            return 0;
        }
        self.lcg = self.lcg.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let span = (2 * amp + 1) as u32;
        ((self.lcg >> 8) % span) as i32 - amp
    }
}

impl SimScaleHandle {
    /// Place (or replace) the load on the platform.
    pub fn set_grams(&self, grams: f32) {
        self.0.grams.set(grams);
    }
    /// Simulate a disconnected or busy amplifier.
    pub fn set_ready(&self, ready: bool) {
        self.0.ready.set(ready);
    }
    /// Add uniform electrical noise of +/- `counts` to each raw read.
    pub fn set_jitter_counts(&self, counts: i32) {
        self.0.jitter_counts.set(counts.max(0));
    }
    pub fn reads(&self) -> u64 {
        self.0.reads.get()
    }
}

impl Scale for SimulatedScale {
    fn read(&mut self, _timeout: Duration) -> Result<i32, BoxError> {
        if !self.state.ready.get() {
            return Err(Box::new(HwError::Timeout));
        }
        self.state.reads.set(self.state.reads.get() + 1);
        let counts = (self.state.grams.get() * self.counts_per_gram).round() as i32;
        Ok(self
            .tare_counts
            .saturating_add(counts)
            .saturating_add(self.next_jitter()))
    }
}

// ── Servo ────────────────────────────────────────────────────────────────────

/// Simulated servo recording every commanded angle.
pub struct SimulatedServo {
    angles: Rc<RefCell<Vec<u8>>>,
    fail: Rc<Cell<bool>>,
}

#[derive(Clone)]
pub struct SimServoHandle {
    angles: Rc<RefCell<Vec<u8>>>,
    fail: Rc<Cell<bool>>,
}

impl SimulatedServo {
    pub fn new() -> Self {
        Self {
            angles: Rc::new(RefCell::new(Vec::new())),
            fail: Rc::new(Cell::new(false)),
        }
    }

    pub fn handle(&self) -> SimServoHandle {
        SimServoHandle {
            angles: self.angles.clone(),
            fail: self.fail.clone(),
        }
    }
}

impl Default for SimulatedServo {
    fn default() -> Self {
        Self::new()
    }
}

impl SimServoHandle {
    pub fn angles(&self) -> Vec<u8> {
        self.angles.borrow().clone()
    }
    pub fn last_angle(&self) -> Option<u8> {
        self.angles.borrow().last().copied()
    }
    /// Make subsequent moves fail with a PWM error.
    pub fn set_failing(&self, fail: bool) {
        self.fail.set(fail);
    }
}

impl Servo for SimulatedServo {
    fn set_angle(&mut self, degrees: u8) -> Result<(), BoxError> {
        if self.fail.get() {
            return Err(Box::new(HwError::Pwm("simulated servo fault".into())));
        }
        tracing::trace!(degrees, "servo move (simulated)");
        self.angles.borrow_mut().push(degrees);
        Ok(())
    }
}

// ── Conveyor ─────────────────────────────────────────────────────────────────

/// Simulated conveyor recording run/stop transitions.
pub struct SimulatedConveyor {
    running: Rc<Cell<bool>>,
    starts: Rc<Cell<u32>>,
}

#[derive(Clone)]
pub struct SimConveyorHandle {
    running: Rc<Cell<bool>>,
    starts: Rc<Cell<u32>>,
}

impl SimulatedConveyor {
    pub fn new() -> Self {
        Self {
            running: Rc::new(Cell::new(false)),
            starts: Rc::new(Cell::new(0)),
        }
    }

    pub fn handle(&self) -> SimConveyorHandle {
        SimConveyorHandle {
            running: self.running.clone(),
            starts: self.starts.clone(),
        }
    }
}

impl Default for SimulatedConveyor {
    fn default() -> Self {
        Self::new()
    }
}

impl SimConveyorHandle {
    pub fn is_running(&self) -> bool {
        self.running.get()
    }
    pub fn starts(&self) -> u32 {
        self.starts.get()
    }
}

impl Motor for SimulatedConveyor {
    fn run(&mut self) -> Result<(), BoxError> {
        if !self.running.get() {
            self.starts.set(self.starts.get() + 1);
        }
        self.running.set(true);
        tracing::trace!("conveyor run (simulated)");
        Ok(())
    }
    fn stop(&mut self) -> Result<(), BoxError> {
        self.running.set(false);
        tracing::trace!("conveyor stop (simulated)");
        Ok(())
    }
}

// ── Network ──────────────────────────────────────────────────────────────────

/// Simulated wireless link that associates after a number of failed attempts.
pub struct SimulatedNetwork {
    connected: Rc<Cell<bool>>,
    attempts_until_up: Rc<Cell<u32>>,
    attempts: Rc<Cell<u32>>,
}

impl SimulatedNetwork {
    /// A link that is already up.
    pub fn connected() -> Self {
        Self::with_attempts(0, true)
    }

    /// A link that comes up on the `n`-th association attempt.
    pub fn up_after(n: u32) -> Self {
        Self::with_attempts(n, false)
    }

    fn with_attempts(n: u32, connected: bool) -> Self {
        Self {
            connected: Rc::new(Cell::new(connected)),
            attempts_until_up: Rc::new(Cell::new(n)),
            attempts: Rc::new(Cell::new(0)),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.get()
    }

    /// Drop the link; it re-associates after `n` further attempts.
    pub fn drop_link(&self, n: u32) {
        self.connected.set(false);
        self.attempts_until_up.set(n);
    }

    /// Shared view used by tests after the network is moved into a controller.
    pub fn share(&self) -> Self {
        Self {
            connected: self.connected.clone(),
            attempts_until_up: self.attempts_until_up.clone(),
            attempts: self.attempts.clone(),
        }
    }
}

impl Network for SimulatedNetwork {
    fn is_connected(&mut self) -> bool {
        self.connected.get()
    }

    fn associate(&mut self) -> Result<(), BoxError> {
        self.attempts.set(self.attempts.get() + 1);
        let left = self.attempts_until_up.get();
        if left <= 1 {
            self.attempts_until_up.set(0);
            self.connected.set(true);
            Ok(())
        } else {
            self.attempts_until_up.set(left - 1);
            Err(Box::new(HwError::Network("association pending".into())))
        }
    }
}

// ── Broker ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct BrokerState {
    connected: bool,
    refuse_connects: u32,
    connects: u32,
    subscriptions: Vec<String>,
    subscribe_calls: u32,
    published: Vec<(String, Vec<u8>)>,
    inbox: VecDeque<InboundMessage>,
    fail_publish: bool,
}

/// In-memory broker session. Messages injected through the handle are
/// delivered only on topics the session is subscribed to.
pub struct SimulatedBroker {
    state: Rc<RefCell<BrokerState>>,
}

#[derive(Clone)]
pub struct SimBrokerHandle(Rc<RefCell<BrokerState>>);

impl SimulatedBroker {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(BrokerState::default())),
        }
    }

    pub fn handle(&self) -> SimBrokerHandle {
        SimBrokerHandle(self.state.clone())
    }
}

impl Default for SimulatedBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBrokerHandle {
    /// Queue a message as if another client published it.
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        let mut st = self.0.borrow_mut();
        if st.connected && st.subscriptions.iter().any(|s| s == topic) {
            st.inbox.push_back(InboundMessage::new(topic, payload));
        }
    }
    /// End the session; subscriptions are lost with it.
    pub fn drop_session(&self) {
        let mut st = self.0.borrow_mut();
        st.connected = false;
        st.subscriptions.clear();
        st.inbox.clear();
    }
    /// Refuse the next `n` connection attempts.
    pub fn refuse_connects(&self, n: u32) {
        self.0.borrow_mut().refuse_connects = n;
    }
    pub fn set_publish_failing(&self, fail: bool) {
        self.0.borrow_mut().fail_publish = fail;
    }
    pub fn is_connected(&self) -> bool {
        self.0.borrow().connected
    }
    pub fn connects(&self) -> u32 {
        self.0.borrow().connects
    }
    pub fn subscriptions(&self) -> Vec<String> {
        self.0.borrow().subscriptions.clone()
    }
    pub fn subscribe_calls(&self) -> u32 {
        self.0.borrow().subscribe_calls
    }
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.0.borrow().published.clone()
    }
    /// Payloads published on `topic`, as UTF-8 text.
    pub fn published_on(&self, topic: &str) -> Vec<String> {
        self.0
            .borrow()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| String::from_utf8_lossy(p).into_owned())
            .collect()
    }
}

impl Broker for SimulatedBroker {
    fn is_connected(&mut self) -> bool {
        self.state.borrow().connected
    }

    fn connect(&mut self) -> Result<(), BoxError> {
        let mut st = self.state.borrow_mut();
        if st.refuse_connects > 0 {
            st.refuse_connects -= 1;
            return Err(Box::new(HwError::Broker("connection refused".into())));
        }
        st.connected = true;
        st.connects += 1;
        st.subscriptions.clear();
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BoxError> {
        let mut st = self.state.borrow_mut();
        if !st.connected {
            return Err(Box::new(HwError::Broker("not connected".into())));
        }
        st.subscribe_calls += 1;
        if !st.subscriptions.iter().any(|s| s == topic) {
            st.subscriptions.push(topic.to_string());
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BoxError> {
        let mut st = self.state.borrow_mut();
        if !st.connected {
            return Err(Box::new(HwError::Broker("not connected".into())));
        }
        if st.fail_publish {
            return Err(Box::new(HwError::Broker("publish rejected".into())));
        }
        st.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    fn poll(&mut self) -> Vec<InboundMessage> {
        self.state.borrow_mut().inbox.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_reports_tare_plus_load() {
        let mut scale = SimulatedScale::new(400.0, 8_000);
        let h = scale.handle();
        h.set_grams(2.5);
        let raw = scale.read(Duration::from_millis(10)).unwrap();
        assert_eq!(raw, 9_000);
        assert_eq!(h.reads(), 1);
    }

    #[test]
    fn scale_not_ready_times_out() {
        let mut scale = SimulatedScale::new(400.0, 0);
        scale.handle().set_ready(false);
        let err = scale.read(Duration::from_millis(10)).unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn jitter_stays_within_amplitude() {
        let mut scale = SimulatedScale::new(1.0, 0);
        scale.handle().set_jitter_counts(3);
        for _ in 0..200 {
            let raw = scale.read(Duration::ZERO).unwrap();
            assert!((-3..=3).contains(&raw), "raw {raw} outside jitter band");
        }
    }

    #[test]
    fn network_comes_up_on_nth_attempt() {
        let mut net = SimulatedNetwork::up_after(3);
        assert!(!net.is_connected());
        assert!(net.associate().is_err());
        assert!(net.associate().is_err());
        assert!(net.associate().is_ok());
        assert!(net.is_connected());
        assert_eq!(net.attempts(), 3);
    }

    #[test]
    fn broker_delivers_only_subscribed_topics() {
        let mut broker = SimulatedBroker::new();
        let h = broker.handle();
        broker.connect().unwrap();
        broker.subscribe("grade").unwrap();
        h.inject("grade", b"A");
        h.inject("other", b"B");
        let msgs = broker.poll();
        assert_eq!(msgs, vec![InboundMessage::new("grade", b"A".to_vec())]);
        assert!(broker.poll().is_empty());
    }

    #[test]
    fn dropped_session_loses_subscriptions() {
        let mut broker = SimulatedBroker::new();
        let h = broker.handle();
        broker.connect().unwrap();
        broker.subscribe("grade").unwrap();
        h.drop_session();
        assert!(!broker.is_connected());
        assert!(broker.publish("weight", b"1").is_err());
        broker.connect().unwrap();
        assert!(h.subscriptions().is_empty());
    }
}
