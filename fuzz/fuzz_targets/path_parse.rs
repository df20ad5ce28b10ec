#![no_main]

use cosign_core::HdPath;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Labeled paths come from cosigner JSON; parsing must return Ok or Err.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(path) = HdPath::parse(s) {
            // A parsed path renders back to something that parses to the same indexes
            let reparsed = HdPath::parse(path.as_str()).expect("rendered path must parse");
            assert_eq!(reparsed.indexes(), path.indexes());
        }
    }
});
