//! Cryptographic primitives for address derivation

use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};

use crate::error::{Error, Result};

/// Hash data using Keccak-256
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Expand a SEC1 public key to its 64-byte uncompressed form (`x || y`)
///
/// Accepts compressed (33 bytes) or uncompressed (65 bytes) encodings. Any
/// input that is not a point on secp256k1 is a malformed device response.
pub fn decompress_public_key(public_key: &[u8]) -> Result<[u8; 64]> {
    let point = k256::PublicKey::from_sec1_bytes(public_key)
        .map_err(|e| Error::MalformedDeviceResponse(format!("Invalid public key: {}", e)))?;

    let encoded = point.to_encoded_point(false);
    let bytes = encoded.as_bytes();
    if bytes.len() != 65 {
        return Err(Error::MalformedDeviceResponse(
            "Failed to decompress public key".to_string(),
        ));
    }

    let mut out = [0u8; 64];
    out.copy_from_slice(&bytes[1..]);
    Ok(out)
}
