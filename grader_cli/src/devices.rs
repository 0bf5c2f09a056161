//! Device assembly: simulator by default, GPIO (`hardware`) and broker
//! session (`mqtt`) behind features.

use std::time::Duration;

use eyre::Result;
use grader_config::Config;
use grader_core::{Calibration, GradingController, GradingControllerBuilder};
use grader_hardware::SimScaleHandle;
use grader_traits::{Broker, Motor, Network, Scale, Servo};

#[cfg(feature = "hardware")]
pub const SCALE_BACKEND: &str = "gpio";
#[cfg(not(feature = "hardware"))]
pub const SCALE_BACKEND: &str = "sim";

#[cfg(feature = "mqtt")]
pub const BROKER_BACKEND: &str = "mqtt";
#[cfg(not(feature = "mqtt"))]
pub const BROKER_BACKEND: &str = "sim";

#[cfg(feature = "hardware")]
fn hw_init(what: &str, e: impl std::fmt::Display) -> eyre::Report {
    grader_core::GraderError::HardwareFault(format!("open {what}: {e}")).into()
}

/// Open the load cell. The simulator reports counts consistent with
/// `calibration` and hands back a handle for placing items.
#[cfg(feature = "hardware")]
pub fn open_scale(
    cfg: &Config,
    _calibration: Calibration,
) -> Result<(Box<dyn Scale>, Option<SimScaleHandle>)> {
    let p = &cfg.pins;
    let scale = grader_hardware::HardwareScale::new(p.hx711_dt, p.hx711_sck)
        .map_err(|e| hw_init(&format!("hx711 (dt={}, sck={})", p.hx711_dt, p.hx711_sck), e))?;
    Ok((Box::new(scale), None))
}

#[cfg(not(feature = "hardware"))]
pub fn open_scale(
    _cfg: &Config,
    calibration: Calibration,
) -> Result<(Box<dyn Scale>, Option<SimScaleHandle>)> {
    let scale = grader_hardware::SimulatedScale::new(
        calibration.calibration_factor,
        calibration.tare_offset,
    );
    let handle = scale.handle();
    Ok((Box::new(scale), Some(handle)))
}

pub struct Actuators {
    pub diverter: Box<dyn Servo>,
    pub pusher: Box<dyn Servo>,
    pub conveyor: Box<dyn Motor>,
}

#[cfg(feature = "hardware")]
pub fn open_actuators(cfg: &Config) -> Result<Actuators> {
    use grader_hardware::{HardwareConveyor, HardwareServo};
    let p = &cfg.pins;
    let diverter = HardwareServo::new(p.diverter_servo)
        .map_err(|e| hw_init(&format!("diverter servo (pin {})", p.diverter_servo), e))?;
    let pusher = HardwareServo::new(p.pusher_servo)
        .map_err(|e| hw_init(&format!("pusher servo (pin {})", p.pusher_servo), e))?;
    let conveyor = HardwareConveyor::new(p.conveyor_motor)
        .map_err(|e| hw_init(&format!("conveyor (pin {})", p.conveyor_motor), e))?;
    Ok(Actuators {
        diverter: Box::new(diverter),
        pusher: Box::new(pusher),
        conveyor: Box::new(conveyor),
    })
}

#[cfg(not(feature = "hardware"))]
pub fn open_actuators(_cfg: &Config) -> Result<Actuators> {
    use grader_hardware::{SimulatedConveyor, SimulatedServo};
    Ok(Actuators {
        diverter: Box::new(SimulatedServo::new()),
        pusher: Box::new(SimulatedServo::new()),
        conveyor: Box::new(SimulatedConveyor::new()),
    })
}

/// Network link and broker session. Nothing connects until the first poll.
#[cfg(feature = "mqtt")]
pub fn open_link(cfg: &Config) -> (Box<dyn Network>, Box<dyn Broker>) {
    use grader_hardware::{LinkProbe, LinkProbeNetwork, MqttBroker, MqttSettings};
    let n = &cfg.network;
    let probe = match &n.probe_addr {
        Some(addr) => LinkProbe::Tcp(addr.clone()),
        None => LinkProbe::interface(&n.interface),
    };
    let network = LinkProbeNetwork::new(probe, Duration::from_secs(2))
        .with_recheck(Duration::from_secs(n.recheck_s));
    let b = &cfg.broker;
    let broker = MqttBroker::new(MqttSettings {
        host: b.host.clone(),
        port: b.port,
        client_id: b.client_id.clone(),
        keep_alive: Duration::from_secs(b.keep_alive_s),
        ..MqttSettings::default()
    });
    (Box::new(network), Box::new(broker))
}

#[cfg(not(feature = "mqtt"))]
pub fn open_link(cfg: &Config) -> (Box<dyn Network>, Box<dyn Broker>) {
    use grader_hardware::{SimulatedBroker, SimulatedNetwork};
    tracing::debug!(
        host = %cfg.broker.host,
        poll = ?Duration::from_millis(cfg.network.association_poll_ms),
        "using in-process broker"
    );
    (
        Box::new(SimulatedNetwork::connected()),
        Box::new(SimulatedBroker::new()),
    )
}

/// Open every device and return a builder carrying the file configuration.
pub fn controller_builder(
    cfg: &Config,
    calibration: Calibration,
) -> Result<(GradingControllerBuilder, Option<SimScaleHandle>)> {
    let (scale, sim) = open_scale(cfg, calibration)?;
    let act = open_actuators(cfg)?;
    let (network, broker) = open_link(cfg);
    tracing::info!(scale = SCALE_BACKEND, broker = BROKER_BACKEND, "devices ready");
    let builder = GradingController::builder()
        .with_scale(scale)
        .with_diverter(act.diverter)
        .with_pusher(act.pusher)
        .with_conveyor(act.conveyor)
        .with_network(network)
        .with_broker(broker)
        .with_calibration(calibration)
        .apply_config(cfg);
    Ok((builder, sim))
}
