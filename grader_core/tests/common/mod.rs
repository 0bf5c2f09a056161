#![allow(dead_code)]

use std::sync::Arc;

use grader_core::{ActuationCfg, ActuationMode, Calibration, GradingController, PendingOverride};
use grader_hardware::{
    SimBrokerHandle, SimConveyorHandle, SimScaleHandle, SimServoHandle, SimulatedBroker,
    SimulatedConveyor, SimulatedNetwork, SimulatedScale, SimulatedServo,
};
use grader_traits::clock::test_clock::TestClock;

pub const FACTOR: f32 = 400.40;
pub const TARE: i32 = 8_000;

pub struct Rig {
    pub ctrl: GradingController,
    pub scale: SimScaleHandle,
    pub broker: SimBrokerHandle,
    pub diverter: SimServoHandle,
    pub pusher: SimServoHandle,
    pub conveyor: SimConveyorHandle,
    pub pending: PendingOverride,
    pub clock: Arc<TestClock>,
}

pub fn rig(mode: ActuationMode) -> Rig {
    rig_with(mode, |b| b)
}

pub fn rig_with(
    mode: ActuationMode,
    tweak: impl FnOnce(grader_core::GradingControllerBuilder) -> grader_core::GradingControllerBuilder,
) -> Rig {
    let scale = SimulatedScale::new(FACTOR, TARE);
    let broker = SimulatedBroker::new();
    let diverter = SimulatedServo::new();
    let pusher = SimulatedServo::new();
    let conveyor = SimulatedConveyor::new();
    let clock = Arc::new(TestClock::new());
    let pending = PendingOverride::new();

    let (sh, bh, dh, ph, ch) = (
        scale.handle(),
        broker.handle(),
        diverter.handle(),
        pusher.handle(),
        conveyor.handle(),
    );

    let builder = GradingController::builder()
        .with_scale(scale)
        .with_diverter(diverter)
        .with_pusher(pusher)
        .with_conveyor(conveyor)
        .with_network(SimulatedNetwork::connected())
        .with_broker(broker)
        .with_calibration(Calibration {
            calibration_factor: FACTOR,
            tare_offset: TARE,
        })
        .with_actuation(ActuationCfg {
            mode,
            ..ActuationCfg::default()
        })
        .with_pending(pending.clone())
        .with_clock(clock.clone());

    let ctrl = tweak(builder).try_build().expect("build controller");
    Rig {
        ctrl,
        scale: sh,
        broker: bh,
        diverter: dh,
        pusher: ph,
        conveyor: ch,
        pending,
        clock,
    }
}
