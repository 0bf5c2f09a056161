#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Only a lone A, B or C (after trimming whitespace) is a grade.
    match grader_core::parse_grade(data) {
        Ok(g) => assert_eq!(data.trim_ascii(), g.as_str().as_bytes()),
        Err(_) => {
            let t = data.trim_ascii();
            assert!(!matches!(t, b"A" | b"B" | b"C"));
        }
    }
});
