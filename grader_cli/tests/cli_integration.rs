use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Minimal valid config for the simulator: short window and actuation times so
// a bounded run routes items quickly.
const FAST_SIM: &str = r#"
[pins]
# pins are unused by the simulator but must be present
hx711_dt = 5
hx711_sck = 6
diverter_servo = 17
pusher_servo = 27
conveyor_motor = 22

[scale]
samples_per_read = 1

[stability]
window = 5

[actuation]
servo_settle_ms = 5
push_dwell_ms = 5
conveyor_a_ms = 30
conveyor_b_ms = 20
conveyor_c_ms = 10
tick_ms = 1

[runner]
cycle_ms = 1
"#;

fn write_config(dir: &tempfile::TempDir, toml: &str) -> PathBuf {
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn grader(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("grader").unwrap();
    cmd.arg("--log-level").arg("error").arg("--config").arg(cfg);
    cmd
}

#[rstest]
fn help_lists_commands() {
    Command::cargo_bin("grader")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("classify"))
        .stdout(predicate::str::contains("calibrate"))
        .stdout(predicate::str::contains("self-check"));
}

#[rstest]
#[case("400", "local A, remote B")]
#[case("280", "local B, remote C")]
#[case("150", "local C, remote C")]
#[case("650", "local A, remote A")]
fn classify_reports_both_tables(#[case] grams: &str, #[case] expected: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, FAST_SIM);
    grader(&cfg)
        .arg("classify")
        .arg("--grams")
        .arg(grams)
        .assert()
        .success()
        .stdout(predicate::str::contains(expected));
}

#[rstest]
fn run_grades_simulated_items_in_order() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, FAST_SIM);
    grader(&cfg)
        .args(["run", "--max-cycles", "400"])
        .args(["--sim-weight", "400", "--sim-weight", "280"])
        .assert()
        .success()
        .stdout(predicate::str::contains("grade A (local, 400.00 g)"))
        .stdout(predicate::str::contains("grade B (local, 280.00 g)"))
        .stdout(predicate::str::contains("2 decisions (2 local, 0 remote)"));
}

#[rstest]
fn run_without_items_decides_nothing() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, FAST_SIM);
    grader(&cfg)
        .args(["run", "--max-cycles", "20"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 decisions (0 local, 0 remote) in 20 cycles"));
}

#[rstest]
fn run_uses_injected_override() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, FAST_SIM);
    grader(&cfg)
        .args(["run", "--max-cycles", "5", "--sim-override", "B"])
        .assert()
        .success()
        .stdout(predicate::str::contains("grade B (remote)"));
}

#[rstest]
fn run_in_blocking_mode_routes_each_item() {
    let dir = tempdir().unwrap();
    let toml = format!("{FAST_SIM}\n").replace("[actuation]\n", "[actuation]\nmode = \"blocking\"\n");
    let cfg = write_config(&dir, &toml);
    grader(&cfg)
        .args(["run", "--max-cycles", "40"])
        .args(["--sim-weight", "150", "--sim-weight", "300"])
        .assert()
        .success()
        .stdout(predicate::str::contains("grade C (local, 150.00 g)"))
        .stdout(predicate::str::contains("grade B (local, 300.00 g)"))
        .stdout(predicate::str::contains("2 routed"));
}

#[rstest]
fn calibrate_derives_factor_in_simulator() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, FAST_SIM);
    grader(&cfg)
        .args(["calibrate", "--known-grams", "200"])
        .assert()
        .success()
        .stdout(predicate::str::contains("calibration_factor = 400.40"))
        .stdout(predicate::str::contains("tare_offset = 0"));
}

#[rstest]
fn self_check_passes_with_fitted_csv() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, FAST_SIM);
    let csv = dir.path().join("calib.csv");
    fs::write(&csv, "raw,grams\n8000,0\n48040,100\n88080,200\n").unwrap();
    grader(&cfg)
        .arg("--calibration")
        .arg(&csv)
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("OK (scale: sim"));
}

#[rstest]
// Invalid stability window fails validation
#[case("[stability]\nwindow = 1\n", 2, "stderr", "Invalid configuration")]
// Thresholds out of order
#[case(
    "[grading.local]\ngrade_a_min_g = 200.0\ngrade_b_min_g = 300.0\n",
    2,
    "stderr",
    "grade_b_min_g must be <= grade_a_min_g"
)]
// Unknown actuation mode is a parse error
#[case("[actuation]\nmode = \"sometimes\"\n", 2, "stderr", "Invalid configuration")]
fn cli_reports_bad_config(
    #[case] extra: &str,
    #[case] exit_code: i32,
    #[case] stream: &str,
    #[case] needle: &str,
) {
    let dir = tempdir().unwrap();
    let toml = format!(
        "[pins]\nhx711_dt = 5\nhx711_sck = 6\ndiverter_servo = 17\npusher_servo = 27\nconveyor_motor = 22\n\n{extra}"
    );
    let cfg = write_config(&dir, &toml);

    let assert = grader(&cfg).args(["run", "--max-cycles", "1"]).assert();

    // Check exit status in a chained manner to keep ownership
    let assert = assert.code(exit_code);

    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn missing_config_file_is_a_config_error() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("nope.toml");
    grader(&cfg)
        .args(["classify", "--grams", "1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[rstest]
fn unknown_override_grade_is_rejected_by_parser() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, FAST_SIM);
    grader(&cfg)
        .args(["run", "--sim-override", "Z"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown grade"));
}

#[rstest]
fn cli_reports_bad_calibration_header() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, FAST_SIM);

    // Write a bad-header CSV
    let bad_csv = dir.path().join("calib.csv");
    let mut f = fs::File::create(&bad_csv).unwrap();
    writeln!(f, "raw,value").unwrap();
    writeln!(f, "100,0.0").unwrap();
    writeln!(f, "200,1.0").unwrap();

    grader(&cfg)
        .arg("--calibration")
        .arg(&bad_csv)
        .arg("self-check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid headers"));
}
