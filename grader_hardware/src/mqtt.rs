//! Broker session over MQTT 3.1.1 (rumqttc).
//!
//! rumqttc's synchronous `Connection` must be iterated to drive network I/O,
//! so each session spawns one pump thread that forwards inbound publishes
//! through a bounded channel. The control loop drains that channel from
//! `Broker::poll`, which keeps all message handling on the loop's thread.
//!
//! A session ends when the pump sees a connection error; `connect()` then
//! builds a fresh session and the caller re-subscribes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use grader_traits::{BoxError, Broker, InboundMessage};
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};

use crate::error::HwError;

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    /// How long `connect()` waits for the broker's CONNACK.
    pub connect_timeout: Duration,
    /// Inbound messages buffered between two polls; when full the oldest is
    /// evicted so the newest override always reaches the loop.
    pub inbox_capacity: usize,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "grader".into(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
            inbox_capacity: 32,
        }
    }
}

struct Session {
    client: Client,
    inbox: xch::Receiver<InboundMessage>,
    connected: Arc<AtomicBool>,
    pump: Option<std::thread::JoinHandle<()>>,
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.client.disconnect();
        if let Some(handle) = self.pump.take()
            && handle.join().is_err()
        {
            tracing::warn!("mqtt pump thread panicked during shutdown");
        }
    }
}

/// Queue `msg`, evicting from the front while the inbox is full. Returns the
/// last evicted message, if any.
fn push_newest(
    tx: &xch::Sender<InboundMessage>,
    rx: &xch::Receiver<InboundMessage>,
    mut msg: InboundMessage,
) -> Option<InboundMessage> {
    let mut evicted = None;
    loop {
        match tx.try_send(msg) {
            Ok(()) => return evicted,
            Err(xch::TrySendError::Full(m)) => {
                msg = m;
                if let Ok(old) = rx.try_recv() {
                    evicted = Some(old);
                }
            }
            Err(xch::TrySendError::Disconnected(_)) => return evicted,
        }
    }
}

pub struct MqttBroker {
    settings: MqttSettings,
    session: Option<Session>,
}

impl MqttBroker {
    pub fn new(settings: MqttSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    fn open_session(&self) -> Result<Session, HwError> {
        let s = &self.settings;
        let mut opts = MqttOptions::new(s.client_id.clone(), s.host.clone(), s.port);
        opts.set_keep_alive(s.keep_alive);
        opts.set_clean_session(true);
        let (client, mut connection) = Client::new(opts, 16);

        let (tx, rx) = xch::bounded(s.inbox_capacity.max(1));
        let evict = rx.clone();
        let (ack_tx, ack_rx) = xch::bounded::<bool>(1);
        let connected = Arc::new(AtomicBool::new(false));
        let connected_pump = connected.clone();

        let pump = std::thread::spawn(move || {
            for notification in connection.iter() {
                match notification {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        connected_pump.store(true, Ordering::Relaxed);
                        let _ = ack_tx.try_send(true);
                    }
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        let msg = InboundMessage::new(p.topic.clone(), p.payload.to_vec());
                        if let Some(old) = push_newest(&tx, &evict, msg) {
                            tracing::warn!(
                                topic = %old.topic,
                                "mqtt inbox full, evicted oldest message"
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "mqtt session ended");
                        connected_pump.store(false, Ordering::Relaxed);
                        let _ = ack_tx.try_send(false);
                        break;
                    }
                }
            }
            tracing::trace!("mqtt pump thread exiting");
        });

        let session = Session {
            client,
            inbox: rx,
            connected,
            pump: Some(pump),
        };
        match ack_rx.recv_timeout(s.connect_timeout) {
            Ok(true) => Ok(session),
            Ok(false) => Err(HwError::Broker(format!(
                "connection to {}:{} failed",
                s.host, s.port
            ))),
            Err(_) => Err(HwError::Broker(format!(
                "no CONNACK from {}:{} within {:?}",
                s.host, s.port, s.connect_timeout
            ))),
        }
    }
}

impl Broker for MqttBroker {
    fn is_connected(&mut self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.connected.load(Ordering::Relaxed))
    }

    fn connect(&mut self) -> Result<(), BoxError> {
        // Tear down the stale session before opening a new one.
        self.session = None;
        let session = self.open_session()?;
        self.session = Some(session);
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BoxError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| HwError::Broker("not connected".into()))?;
        session
            .client
            .subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| Box::new(HwError::Broker(e.to_string())) as BoxError)
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BoxError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| HwError::Broker("not connected".into()))?;
        session
            .client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| Box::new(HwError::Broker(e.to_string())) as BoxError)
    }

    fn poll(&mut self) -> Vec<InboundMessage> {
        self.session
            .as_ref()
            .map(|s| s.inbox.try_iter().collect())
            .unwrap_or_default()
    }
}
