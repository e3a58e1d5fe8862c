#![no_main]

use hwkeyring_core::{derive_address, Address, ExtendedPublicKey};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Device-supplied key: parse and derive the first account
    if let Ok(key) = text.parse::<ExtendedPublicKey>() {
        if let Ok(address) = derive_address(&key, 0) {
            let again: Address = address.to_checksum().parse().unwrap();
            assert_eq!(again, address);
        }
    }

    // Address parsing in any casing
    if let Ok(address) = text.parse::<Address>() {
        assert!(address.matches_checksum(&address.to_checksum()));
    }
});
