#![no_main]

use cosign_tx::{Coin, Input};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Input descriptors arrive as JSON; building a coin from any of them
    // must never panic.
    if let Ok(input) = serde_json::from_slice::<Input>(data) {
        let _ = Coin::from_input(&input, &[], None);
    }
});
