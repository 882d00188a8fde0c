//! Fuzz target for decoding a signed `target` back into its envelope.

#![no_main]

use libfuzzer_sys::fuzz_target;

use attestor_signing::Envelope;

fuzz_target!(|target: &str| {
    if let Ok(envelope) = Envelope::from_target(target) {
        let reencoded = envelope.to_target().expect("decoded envelope re-encodes");
        let again = Envelope::from_target(&reencoded).expect("re-encoded target decodes");
        assert_eq!(envelope, again);
    }
});
