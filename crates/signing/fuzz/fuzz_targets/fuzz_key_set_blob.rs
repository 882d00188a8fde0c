//! Fuzz target for key set blob parsing.
//!
//! Feeds arbitrary strings as the secret payload. Every input must parse
//! into a key set or fail with a configuration error; no record that fails
//! key checks may survive into the set.

#![no_main]

use libfuzzer_sys::fuzz_target;

use attestor_signing::{KeySet, parse_key_id};
use attestor_storage::SecretValue;

fuzz_target!(|data: &[u8]| {
    let Ok(payload) = std::str::from_utf8(data) else {
        return;
    };

    let value = SecretValue::new("fuzz", payload);
    let Ok(key_set) = KeySet::from_secret(&value) else {
        return;
    };

    for record in key_set.records() {
        // Surviving records carry a 32-byte key and a createdAt that
        // agrees with the id.
        assert_eq!(record.public_key().len(), 43, "public key must be 32 bytes base64url");
        if record.has_valid_key_id() {
            assert_eq!(record.created_at(), parse_key_id(record.key_id()));
        }
        assert!(key_set.get(record.key_id()).is_some());
    }
});
