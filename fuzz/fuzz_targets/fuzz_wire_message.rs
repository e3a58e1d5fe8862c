#![no_main]

use hwkeyring_bridge::{Inbound, WireMessage};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = serde_json::from_slice::<WireMessage>(data) {
        match Inbound::classify(&message) {
            Some(Inbound::Completed { operation, id, .. }) => {
                // Completed messages always carry the id they were sent with
                assert_eq!(message.id, Some(id));
                assert_eq!(operation.response_tag(), message.kind);
            }
            Some(Inbound::Closed) | Some(Inbound::SurfaceError(_)) | None => {}
        }

        // Re-serialization must not panic
        let _ = serde_json::to_vec(&message).unwrap();
    }
});
