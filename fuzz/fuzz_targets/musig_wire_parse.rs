#![no_main]

use cosign_musig::{PartialSignature, PublicNonce};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Cosigner nonces and partial signatures are untrusted bytes.
    if let Ok(nonce) = PublicNonce::from_bytes(data) {
        assert_eq!(&nonce.to_bytes()[..], data);
    }
    let _ = PartialSignature::from_bytes(data);
});
