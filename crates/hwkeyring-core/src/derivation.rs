//! Public-only account derivation from a device-supplied extended public key
//!
//! The device hands out one extended public key per hd path. Every account
//! address under that path is computed locally from it, so the device is only
//! contacted again for operations that need the private key.

use std::fmt;
use std::str::FromStr;

use bip32::{ChildNumber, Prefix, XPub};

use crate::address::Address;
use crate::crypto::decompress_public_key;
use crate::error::{Error, Result};

/// Branch under the account-level key that holds account addresses
const ADDRESS_BRANCH: u32 = 0;

/// Extended secp256k1 public key as returned by the device
#[derive(Clone)]
pub struct ExtendedPublicKey(XPub);

impl ExtendedPublicKey {
    /// Wrap an already-parsed key
    pub fn new(xpub: XPub) -> Self {
        Self(xpub)
    }

    /// Depth of this key in its tree
    pub fn depth(&self) -> u8 {
        self.0.attrs().depth
    }

    /// Compressed public key (33 bytes)
    pub fn public_key_bytes(&self) -> [u8; 33] {
        self.0.to_bytes()
    }

    /// Base58 `xpub...` rendering
    pub fn to_xpub_string(&self) -> String {
        self.0.to_string(Prefix::XPUB)
    }

    /// Derive a non-hardened child
    fn child(&self, index: u32) -> Result<Self> {
        let number = ChildNumber::new(index, false)
            .map_err(|e| Error::InvalidDerivationPath(format!("index {}: {}", index, e)))?;
        let child = self
            .0
            .derive_child(number)
            .map_err(|e| Error::MalformedDeviceResponse(format!("Child derivation failed: {}", e)))?;
        Ok(Self(child))
    }
}

impl FromStr for ExtendedPublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let xpub = s
            .trim()
            .parse::<XPub>()
            .map_err(|e| Error::MalformedDeviceResponse(format!("Invalid extended public key: {}", e)))?;
        Ok(Self(xpub))
    }
}

impl From<XPub> for ExtendedPublicKey {
    fn from(xpub: XPub) -> Self {
        Self(xpub)
    }
}

impl fmt::Debug for ExtendedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedPublicKey")
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

/// Derive the address at `m/0/index` below `xpub`
///
/// Only public derivation is used. The compressed child key is expanded to
/// its 64-byte form and hashed into an address, rendered with checksum casing
/// through [`Address`]'s `Display`.
pub fn derive_address(xpub: &ExtendedPublicKey, index: u32) -> Result<Address> {
    let child = xpub.child(ADDRESS_BRANCH)?.child(index)?;
    let uncompressed = decompress_public_key(&child.public_key_bytes())?;
    Ok(Address::from_uncompressed_public_key(&uncompressed))
}

/// Derive the addresses for `indices`, in order
pub fn derive_addresses(
    xpub: &ExtendedPublicKey,
    indices: impl IntoIterator<Item = u32>,
) -> Result<Vec<(u32, Address)>> {
    // the branch key is shared by every index
    let branch = xpub.child(ADDRESS_BRANCH)?;
    indices
        .into_iter()
        .map(|index| {
            let child = branch.child(index)?;
            let uncompressed = decompress_public_key(&child.public_key_bytes())?;
            Ok((index, Address::from_uncompressed_public_key(&uncompressed)))
        })
        .collect()
}

/// Full derivation path of the account at `index` under `hd_path`
pub fn account_path(hd_path: &str, index: u32) -> String {
    format!("{}/{}", hd_path.trim_end_matches('/'), index)
}
