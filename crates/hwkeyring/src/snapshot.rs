//! Persisted keyring state

use serde::{Deserialize, Serialize};

use hwkeyring_core::{Address, Result};

/// Tracked account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: Address,
    pub derivation_path: String,
}

/// Keyring state as persisted by the embedding wallet
///
/// Every field may be missing; missing fields take their defaults when the
/// snapshot is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyringSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hd_path: Option<String>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub last_unlocked_account_index: u32,
    #[serde(default)]
    pub page: u32,
}

impl KeyringSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Account as shown on an account-selection page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageAccount {
    pub address: Address,
    /// Always empty here; filled in by whoever shows the page
    pub balance: Option<String>,
    pub index: u32,
}
