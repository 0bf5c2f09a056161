use std::time::Duration;

use grader_hardware::error::HwError;
use grader_hardware::{SimulatedBroker, SimulatedConveyor, SimulatedScale, SimulatedServo};
use grader_traits::{Broker, Motor, Scale, Servo};
use rstest::rstest;

#[rstest]
#[case(0.0, 8_000)]
#[case(100.0, 48_040)]
#[case(-10.0, 3_996)]
fn scale_counts_follow_calibration(#[case] grams: f32, #[case] expected: i32) {
    let mut scale = SimulatedScale::new(400.40, 8_000);
    scale.handle().set_grams(grams);
    assert_eq!(scale.read(Duration::from_millis(5)).unwrap(), expected);
}

#[test]
fn not_ready_scale_reports_typed_timeout() {
    let mut scale = SimulatedScale::new(1.0, 0);
    scale.handle().set_ready(false);
    let err = scale.read(Duration::from_millis(5)).unwrap_err();
    assert!(matches!(err.downcast_ref::<HwError>(), Some(HwError::Timeout)));
}

#[test]
fn servo_fault_is_reported() {
    let mut servo = SimulatedServo::new();
    let h = servo.handle();
    servo.set_angle(45).unwrap();
    h.set_failing(true);
    assert!(servo.set_angle(90).is_err());
    assert_eq!(h.angles(), vec![45]);
}

#[test]
fn conveyor_counts_starts_once_per_run() {
    let mut conveyor = SimulatedConveyor::new();
    let h = conveyor.handle();
    conveyor.run().unwrap();
    conveyor.run().unwrap();
    conveyor.stop().unwrap();
    conveyor.run().unwrap();
    assert!(h.is_running());
    assert_eq!(h.starts(), 2);
}

#[test]
fn broker_refuses_then_accepts() {
    let mut broker = SimulatedBroker::new();
    let h = broker.handle();
    h.refuse_connects(2);
    assert!(broker.connect().is_err());
    assert!(broker.connect().is_err());
    assert!(broker.connect().is_ok());
    assert_eq!(h.connects(), 1);
}

#[test]
fn failing_publish_is_not_recorded() {
    let mut broker = SimulatedBroker::new();
    let h = broker.handle();
    broker.connect().unwrap();
    h.set_publish_failing(true);
    assert!(broker.publish("iot/machine/weight", b"12.00").is_err());
    h.set_publish_failing(false);
    broker.publish("iot/machine/weight", b"13.00").unwrap();
    assert_eq!(h.published_on("iot/machine/weight"), vec!["13.00".to_string()]);
}
