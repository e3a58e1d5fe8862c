//! hwkeyring core - shared types for a keyring whose keys live on a device
//!
//! This crate holds everything that can be computed without talking to the
//! device: address derivation from an extended public key, checksum casing,
//! the transaction envelope narrowing the device requires, typed-data
//! canonicalization, and the error type every other crate reports through.

pub mod address;
pub mod crypto;
pub mod derivation;
pub mod error;
pub mod transaction;
pub mod typed_data;

pub use address::Address;
pub use derivation::{account_path, derive_address, derive_addresses, ExtendedPublicKey};
pub use error::{Error, ErrorKind, Result};
pub use transaction::{LegacyTransaction, SignatureParts, SignedLegacyTransaction, TransactionFields};
pub use typed_data::{canonical_typed_data_json, sanitize_typed_data, TypedDataVersion};

/// Keyring type tag reported to the embedding wallet
pub const KEYRING_TYPE: &str = "Hardware Bridge";

/// Derivation path used when none has been configured
pub const DEFAULT_HD_PATH: &str = "m/44'/60'/0'/0";

/// Number of account slots the device exposes
pub const MAX_ACCOUNTS: u32 = 1;

/// Accounts shown per page
pub const ACCOUNTS_PER_PAGE: u32 = 1;

/// Number of pages, `ceil(MAX_ACCOUNTS / ACCOUNTS_PER_PAGE)`
pub const MAX_PAGES: u32 = MAX_ACCOUNTS.div_ceil(ACCOUNTS_PER_PAGE);

/// Remove a leading `0x`, if any
pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

/// Ensure exactly one leading `0x`
pub fn add_hex_prefix(s: &str) -> String {
    format!("0x{}", strip_hex_prefix(s))
}
