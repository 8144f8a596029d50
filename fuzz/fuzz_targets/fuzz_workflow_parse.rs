#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Parsing and validation must reject bad input without panicking.
        let _ = agentrelay::workflow::WorkflowDefinition::parse(s);
    }
});
