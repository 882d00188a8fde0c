//! Fuzz target for key id parsing and the expiry check.
//!
//! Any string must parse or be rejected without panicking, and a rejected
//! id is always treated as expired.

#![no_main]

use libfuzzer_sys::fuzz_target;

use attestor_signing::{RotationPolicy, format_key_id, is_key_expired, parse_key_id};

fuzz_target!(|input: (&str, i64)| {
    let (key_id, now_ms) = input;
    let max_age_ms = RotationPolicy::default().max_age_ms();

    match parse_key_id(key_id) {
        Some(created_at) => {
            assert!(created_at >= 0);
            assert_eq!(parse_key_id(&format_key_id(created_at)), Some(created_at));
            let _ = is_key_expired(key_id, max_age_ms, now_ms);
        },
        None => assert!(is_key_expired(key_id, max_age_ms, now_ms)),
    }
});
