//! Device adapters for the grading controller.
//!
//! Simulated devices are always available and are what the CLI and tests run
//! against. Real adapters sit behind features: `hardware` (HX711, servos and
//! conveyor on Raspberry Pi GPIO) and `mqtt` (broker session over rumqttc).
pub mod error;
pub mod net;
pub mod sim;
pub mod util;

#[cfg(feature = "hardware")]
pub mod gpio;
#[cfg(feature = "hardware")]
pub mod hx711;
#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use net::{LinkProbe, LinkProbeNetwork};
pub use sim::{
    SimBrokerHandle, SimConveyorHandle, SimScaleHandle, SimServoHandle, SimulatedBroker,
    SimulatedConveyor, SimulatedNetwork, SimulatedScale, SimulatedServo,
};

#[cfg(feature = "hardware")]
pub use gpio::{HardwareConveyor, HardwareScale, HardwareServo};
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttBroker, MqttSettings};
