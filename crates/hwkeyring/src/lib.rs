//! hwkeyring - signing keyring whose private keys live on a hardware device
//!
//! [`Keyring`] keeps the account list, pagination and the per-session
//! extended public key. It derives addresses itself and only goes to the
//! device, through a [`DeviceBridge`], for the extended key and for
//! signatures.
//!
//! ```ignore
//! let bridge = Arc::new(BridgeClient::new(config, connector, host));
//! let mut keyring = Keyring::with_snapshot(bridge, snapshot);
//! keyring.add_accounts(1).await?;
//! let signature = keyring.sign_personal_message(&address, "0x68656c6c6f").await?;
//! ```

pub mod device;
pub mod keyring;
pub mod snapshot;

pub use device::DeviceBridge;
pub use keyring::{Keyring, KeyringEvent};
pub use snapshot::{Account, KeyringSnapshot, PageAccount};

pub use hwkeyring_bridge as bridge;
pub use hwkeyring_core::{Error, ErrorKind, Result, TransactionFields, TypedDataVersion};
