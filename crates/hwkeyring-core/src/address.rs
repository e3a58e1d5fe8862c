//! Ethereum addresses and checksum casing

use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address as AlloyAddress;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::add_hex_prefix;
use crate::error::{Error, Result};

/// Ethereum address (20 bytes)
///
/// Equality is on the raw bytes, so two renderings of the same address that
/// differ only in letter case compare equal. Serializes as the mixed-case
/// checksum string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(AlloyAddress);

impl Address {
    /// Length of an address in bytes
    pub const LEN: usize = 20;

    /// Create a new Address from bytes
    pub const fn new(bytes: [u8; Self::LEN]) -> Self {
        Self(AlloyAddress::new(bytes))
    }

    /// Get the address bytes
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0 .0 .0
    }

    /// Underlying alloy address
    pub const fn inner(&self) -> AlloyAddress {
        self.0
    }

    /// Address of an uncompressed public key (`x || y`, 64 bytes)
    ///
    /// The address is the low 20 bytes of `keccak256(x || y)`.
    pub fn from_uncompressed_public_key(public_key: &[u8; 64]) -> Self {
        Self(AlloyAddress::from_raw_public_key(public_key))
    }

    /// Lowercase hex without the `0x` prefix
    pub fn to_lower_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Mixed-case checksum rendering with `0x` prefix
    pub fn to_checksum(&self) -> String {
        self.0.to_checksum(None)
    }

    /// Whether `s` is this address rendered with correct checksum casing
    pub fn matches_checksum(&self, s: &str) -> bool {
        add_hex_prefix(s) == self.to_checksum()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Parse a hex address, with or without `0x`, in any letter case
    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<AlloyAddress>()
            .map(Self)
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", s, e)))
    }
}

impl From<AlloyAddress> for Address {
    fn from(address: AlloyAddress) -> Self {
        Self(address)
    }
}

impl From<Address> for AlloyAddress {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self::new(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        AlloyAddress::deserialize(deserializer).map(Self)
    }
}
