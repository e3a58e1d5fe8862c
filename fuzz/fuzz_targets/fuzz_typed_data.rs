#![no_main]

use hwkeyring_core::{canonical_typed_data_json, sanitize_typed_data};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        if let Ok(sanitized) = sanitize_typed_data(&value) {
            // Sanitizing is idempotent
            assert_eq!(sanitize_typed_data(&sanitized).unwrap(), sanitized);

            // Canonical form is stable
            let first = canonical_typed_data_json(&value).unwrap();
            let second = canonical_typed_data_json(&sanitized).unwrap();
            assert_eq!(first, second);
        }
    }
});
