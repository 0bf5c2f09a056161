use grader_config::{ActuationMode, load_toml};
use rstest::rstest;

const PINS: &str = r#"
[pins]
hx711_dt = 5
hx711_sck = 6
diverter_servo = 12
pusher_servo = 13
conveyor_motor = 19
"#;

fn with_pins(extra: &str) -> String {
    format!("{PINS}\n{extra}")
}

#[rstest]
fn minimal_config_uses_defaults() {
    let cfg = load_toml(PINS).expect("parse TOML");
    cfg.validate().expect("defaults are valid");

    assert_eq!(cfg.scale.samples_per_read, 5);
    assert!((cfg.scale.zero_band_g - 1.0).abs() < f32::EPSILON);
    assert_eq!(cfg.stability.window, 10);
    assert!((cfg.stability.presence_floor_g - 100.0).abs() < f32::EPSILON);
    assert!((cfg.grading.local.grade_a_min_g - 350.0).abs() < f32::EPSILON);
    assert!((cfg.grading.remote.grade_a_min_g - 600.0).abs() < f32::EPSILON);
    assert_eq!(cfg.broker.port, 1883);
    assert_eq!(cfg.topics.override_grade, "iot/python/grade");
    assert_eq!(cfg.topics.command, "device/command");
    assert_eq!(cfg.actuation.mode, ActuationMode::Ticked);
    assert_eq!(cfg.actuation.conveyor_a_ms, 3_000);
    assert_eq!(cfg.telemetry.device_name, "Sorter_01");
    assert!(cfg.calibration.is_none());
}

#[rstest]
fn shipped_sample_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../etc/grader_config.toml");
    let text = std::fs::read_to_string(path).expect("read sample config");
    let cfg = load_toml(&text).expect("parse sample config");
    cfg.validate().expect("sample config validates");
    assert_eq!(cfg.logging.rotation.as_deref(), Some("never"));
    assert!(cfg.calibration.is_some());
}

#[rstest]
fn missing_pins_fail_to_parse() {
    assert!(load_toml("[scale]\nsamples_per_read = 3\n").is_err());
}

#[rstest]
fn persisted_calibration_parses() {
    let cfg = load_toml(&with_pins(
        "[calibration]\ncalibration_factor = -212.5\ntare_offset = 8421\n",
    ))
    .unwrap();
    cfg.validate().unwrap();
    let cal = cfg.calibration.unwrap();
    assert_eq!(cal.tare_offset, 8421);
    assert!((cal.calibration_factor + 212.5).abs() < 1e-4);
}

#[rstest]
fn blocking_mode_parses() {
    let cfg = load_toml(&with_pins("[actuation]\nmode = \"blocking\"\n")).unwrap();
    assert_eq!(cfg.actuation.mode, ActuationMode::Blocking);
}

#[rstest]
#[case("[scale]\nsamples_per_read = 0\n", "samples_per_read")]
#[case("[scale]\nzero_band_g = -1.0\n", "zero_band_g")]
#[case("[calibration]\ncalibration_factor = 0.0\n", "calibration_factor")]
#[case("[stability]\nwindow = 1\n", "stability.window")]
#[case("[stability]\npresence_floor_g = 0.0\n", "presence_floor_g")]
#[case("[stability]\npresence_floor_g = inf\n", "presence_floor_g")]
#[case("[stability]\ntolerance_g = nan\n", "tolerance_g")]
#[case("[stability]\ntolerance_g = -0.5\n", "tolerance_g")]
#[case("[stability]\nsettle_deadline_ms = 0\n", "settle_deadline_ms")]
#[case(
    "[grading.local]\ngrade_a_min_g = 200.0\ngrade_b_min_g = 300.0\n",
    "grading.local.grade_b_min_g"
)]
#[case(
    "[grading.remote]\ngrade_a_min_g = 600.0\ngrade_b_min_g = -1.0\n",
    "grading.remote.grade_b_min_g"
)]
#[case("[broker]\nhost = \"  \"\n", "broker.host")]
#[case("[network]\ninterface = \"\"\n", "network.interface")]
#[case("[network]\nprobe_addr = \"localhost:1883\"\n", "broker endpoint")]
#[case("[network]\nprobe_addr = \"gateway\"\n", "host:port")]
#[case("[topics]\noverride_grade = \"iot/#\"\n", "wildcards")]
#[case("[topics]\ncommand = \"iot/python/grade\"\n", "must differ")]
#[case("[actuation]\npusher_engaged_deg = 200\n", "pusher_engaged_deg")]
#[case("[actuation]\nconveyor_b_ms = 4000\n", "a >= b >= c")]
#[case("[actuation]\ntick_ms = 0\n", "tick_ms")]
#[case("[telemetry]\ndevice_name = \"\"\n", "device_name")]
#[case("[logging]\nrotation = \"weekly\"\n", "rotation")]
fn invalid_values_are_rejected(#[case] extra: &str, #[case] needle: &str) {
    let cfg = load_toml(&with_pins(extra)).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(err.to_string().contains(needle), "{err}");
}
