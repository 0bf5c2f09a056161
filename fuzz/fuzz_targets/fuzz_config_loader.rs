#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = grader_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // A validated file must also build runtime settings without panicking.
            let _ = grader_core::ThresholdTable::from(&cfg.grading.local).classify(0.0);
            let _ = grader_core::ActuationCfg::from(&cfg.actuation);
        }
    }
});
