#![no_main]

use hwkeyring_core::{LegacyTransaction, SignatureParts, SignedLegacyTransaction};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Raw bytes as the device might return them
    if let Ok(signature) = SignatureParts::from_signed_rlp(data) {
        // Merging into any fields must encode without panicking
        let signed = SignedLegacyTransaction::new(LegacyTransaction::default(), signature);
        let rlp = signed.rlp();
        let reparsed = SignatureParts::from_signed_rlp(&rlp).unwrap();
        assert_eq!(reparsed, signature);
        let _ = signed.hash();
    }

    // Same bytes as a hex string
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = SignatureParts::from_signed_hex(text);
    }
});
