//! Device seam used by the keyring

use async_trait::async_trait;

use hwkeyring_bridge::BridgeClient;
use hwkeyring_core::{Address, ExtendedPublicKey, LegacyTransaction, Result};

/// Operations the keyring needs from the hardware device
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// Account-level extended public key at `derivation_path`
    async fn fetch_extended_public_key(&self, derivation_path: &str) -> Result<ExtendedPublicKey>;

    /// Signed legacy transaction RLP, hex encoded
    async fn sign_transaction(
        &self,
        address: &Address,
        derivation_path: &str,
        transaction: LegacyTransaction,
    ) -> Result<String>;

    /// Personal-message signature, hex encoded
    async fn sign_message(&self, derivation_path: &str, message_hex: &str) -> Result<String>;

    /// Typed-data signature over canonical JSON, hex encoded
    async fn sign_typed_data(&self, derivation_path: &str, typed_data: String) -> Result<String>;
}

#[async_trait]
impl DeviceBridge for BridgeClient {
    async fn fetch_extended_public_key(&self, derivation_path: &str) -> Result<ExtendedPublicKey> {
        BridgeClient::fetch_extended_public_key(self, derivation_path).await
    }

    async fn sign_transaction(
        &self,
        address: &Address,
        derivation_path: &str,
        transaction: LegacyTransaction,
    ) -> Result<String> {
        BridgeClient::sign_transaction(self, address, derivation_path, transaction).await
    }

    async fn sign_message(&self, derivation_path: &str, message_hex: &str) -> Result<String> {
        BridgeClient::sign_message(self, derivation_path, message_hex).await
    }

    async fn sign_typed_data(&self, derivation_path: &str, typed_data: String) -> Result<String> {
        BridgeClient::sign_typed_data(self, derivation_path, typed_data).await
    }
}
