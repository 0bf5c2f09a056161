//! Hardware and transport boundary traits for the grading controller.
//!
//! Every device the controller touches sits behind one of these traits so the
//! control logic in `grader_core` never depends on a concrete driver. Errors
//! cross the boundary as `Box<dyn Error + Send + Sync>` and are mapped to typed
//! errors by the caller.

pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::time::Duration;

/// Error type used at every trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Load-cell amplifier producing raw signed counts.
pub trait Scale {
    /// Block until a conversion is ready or `timeout` expires.
    fn read(&mut self, timeout: Duration) -> Result<i32, BoxError>;
}

/// Positional servo (diverter gate, push actuator).
pub trait Servo {
    fn set_angle(&mut self, degrees: u8) -> Result<(), BoxError>;
}

/// On/off conveyor drive.
pub trait Motor {
    fn run(&mut self) -> Result<(), BoxError>;
    fn stop(&mut self) -> Result<(), BoxError>;
}

/// Wireless link the broker session rides on.
pub trait Network {
    fn is_connected(&mut self) -> bool;
    /// Make one association attempt. Success is observed via `is_connected`.
    fn associate(&mut self) -> Result<(), BoxError>;
}

/// Message delivered by the broker on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Publish/subscribe session with the message broker.
///
/// Subscriptions belong to a session: after `connect()` succeeds the caller
/// must subscribe again.
pub trait Broker {
    fn is_connected(&mut self) -> bool;
    fn connect(&mut self) -> Result<(), BoxError>;
    fn subscribe(&mut self, topic: &str) -> Result<(), BoxError>;
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BoxError>;
    /// Drain messages received since the last call. Never blocks.
    fn poll(&mut self) -> Vec<InboundMessage>;
}

impl<T: Scale + ?Sized> Scale for Box<T> {
    fn read(&mut self, timeout: Duration) -> Result<i32, BoxError> {
        (**self).read(timeout)
    }
}

impl<T: Servo + ?Sized> Servo for Box<T> {
    fn set_angle(&mut self, degrees: u8) -> Result<(), BoxError> {
        (**self).set_angle(degrees)
    }
}

impl<T: Motor + ?Sized> Motor for Box<T> {
    fn run(&mut self) -> Result<(), BoxError> {
        (**self).run()
    }
    fn stop(&mut self) -> Result<(), BoxError> {
        (**self).stop()
    }
}

impl<T: Network + ?Sized> Network for Box<T> {
    fn is_connected(&mut self) -> bool {
        (**self).is_connected()
    }
    fn associate(&mut self) -> Result<(), BoxError> {
        (**self).associate()
    }
}

impl<T: Broker + ?Sized> Broker for Box<T> {
    fn is_connected(&mut self) -> bool {
        (**self).is_connected()
    }
    fn connect(&mut self) -> Result<(), BoxError> {
        (**self).connect()
    }
    fn subscribe(&mut self, topic: &str) -> Result<(), BoxError> {
        (**self).subscribe(topic)
    }
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BoxError> {
        (**self).publish(topic, payload)
    }
    fn poll(&mut self) -> Vec<InboundMessage> {
        (**self).poll()
    }
}
