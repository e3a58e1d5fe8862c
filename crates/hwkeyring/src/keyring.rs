//! Keyring state
//!
//! Tracks accounts, pagination and the per-session extended public key.
//! Addresses are derived locally; the device is asked for the extended key
//! once per unlock and otherwise only for signatures.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};

use hwkeyring_core::{
    account_path, add_hex_prefix, canonical_typed_data_json, derive_addresses, Address, Error,
    ExtendedPublicKey, Result, SignatureParts, SignedLegacyTransaction, TransactionFields,
    TypedDataVersion, ACCOUNTS_PER_PAGE, DEFAULT_HD_PATH, KEYRING_TYPE, MAX_ACCOUNTS, MAX_PAGES,
};

use crate::device::DeviceBridge;
use crate::snapshot::{Account, KeyringSnapshot, PageAccount};

const EVENT_CAPACITY: usize = 32;

/// State change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyringEvent {
    /// Tracked addresses changed; carries the new list
    AccountsChanged(Vec<Address>),
    /// Derivation path changed, discarding everything derived from the old one
    PathChanged(String),
    /// Full session reset
    Reset,
    /// Extended key fetched for this path
    Unlocked(String),
    /// State replaced from a snapshot
    Configured,
}

/// Extended key cached for one hd path
struct UnlockedKey {
    hd_path: String,
    key: ExtendedPublicKey,
}

/// Signing keyring backed by a hardware device
pub struct Keyring {
    bridge: Arc<dyn DeviceBridge>,
    hd_path: String,
    accounts: Vec<Account>,
    last_unlocked_account_index: u32,
    page: u32,
    unlocked: Option<UnlockedKey>,
    events: broadcast::Sender<KeyringEvent>,
}

impl Keyring {
    pub const TYPE: &'static str = KEYRING_TYPE;

    pub fn new(bridge: Arc<dyn DeviceBridge>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            bridge,
            hd_path: DEFAULT_HD_PATH.to_string(),
            accounts: Vec::new(),
            last_unlocked_account_index: 0,
            page: 0,
            unlocked: None,
            events,
        }
    }

    /// Create a keyring and hydrate it from `snapshot`
    pub fn with_snapshot(bridge: Arc<dyn DeviceBridge>, snapshot: KeyringSnapshot) -> Self {
        let mut keyring = Self::new(bridge);
        keyring.configure(snapshot);
        keyring
    }

    pub fn keyring_type(&self) -> &'static str {
        Self::TYPE
    }

    /// Receive state change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<KeyringEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: KeyringEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    // ------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------

    /// Replace state with `snapshot`; missing fields take their defaults
    pub fn configure(&mut self, snapshot: KeyringSnapshot) {
        self.hd_path = snapshot
            .hd_path
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_HD_PATH.to_string());
        self.accounts = snapshot.accounts;
        self.last_unlocked_account_index = snapshot.last_unlocked_account_index;
        self.set_current_page(i64::from(snapshot.page));

        debug!(
            hd_path = %self.hd_path,
            accounts = self.accounts.len(),
            "Keyring configured"
        );
        self.emit(KeyringEvent::Configured);
    }

    pub fn snapshot(&self) -> KeyringSnapshot {
        KeyringSnapshot {
            hd_path: Some(self.hd_path.clone()),
            accounts: self.accounts.clone(),
            last_unlocked_account_index: self.last_unlocked_account_index,
            page: self.page,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn hd_path(&self) -> &str {
        &self.hd_path
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn last_unlocked_account_index(&self) -> u32 {
        self.last_unlocked_account_index
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// Tracked addresses, in the order they were added
    pub fn list_addresses(&self) -> Vec<Address> {
        self.accounts.iter().map(|a| a.address).collect()
    }

    /// Whether an extended key is cached for the current path
    pub fn is_unlocked(&self) -> bool {
        self.unlocked
            .as_ref()
            .is_some_and(|u| u.hd_path == self.hd_path)
    }

    // ------------------------------------------------------------------
    // Derivation path and pagination
    // ------------------------------------------------------------------

    /// Switch derivation path; a different path discards all derived state
    pub fn set_derivation_path(&mut self, path: &str) {
        if path == self.hd_path {
            return;
        }
        self.clear();
        self.hd_path = path.to_string();
        info!(hd_path = %path, "Derivation path changed");
        self.emit(KeyringEvent::PathChanged(path.to_string()));
    }

    /// Set the current page, clamped into `[0, MAX_PAGES)`
    pub fn set_current_page(&mut self, page: i64) {
        let last = i64::from(MAX_PAGES) - 1;
        self.page = page.clamp(0, last) as u32;
    }

    pub async fn first_page(&mut self) -> Result<Vec<PageAccount>> {
        self.set_current_page(0);
        self.current_page_accounts().await
    }

    pub async fn previous_page(&mut self) -> Result<Vec<PageAccount>> {
        self.set_current_page(i64::from(self.page) - 1);
        self.current_page_accounts().await
    }

    pub async fn next_page(&mut self) -> Result<Vec<PageAccount>> {
        self.set_current_page(i64::from(self.page) + 1);
        self.current_page_accounts().await
    }

    /// Accounts covered by the current page
    pub async fn current_page_accounts(&mut self) -> Result<Vec<PageAccount>> {
        let from = self.page * ACCOUNTS_PER_PAGE;
        let to = (from + ACCOUNTS_PER_PAGE).min(MAX_ACCOUNTS);

        let key = self.extended_key().await?;
        let accounts = derive_addresses(&key, from..to)?
            .into_iter()
            .map(|(index, address)| PageAccount {
                address,
                balance: None,
                index,
            })
            .collect();
        Ok(accounts)
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Start index for the next [`add_accounts`](Self::add_accounts)
    pub fn set_account_to_unlock(&mut self, index: u32) {
        self.last_unlocked_account_index = index;
    }

    /// Track up to `count` accounts starting at the unlock index
    ///
    /// Already tracked addresses are skipped. The page goes back to the first
    /// one and the cached extended key is dropped.
    pub async fn add_accounts(&mut self, count: u32) -> Result<Vec<Address>> {
        let from = self.last_unlocked_account_index;
        let to = from.saturating_add(count).min(MAX_ACCOUNTS);

        let key = self.extended_key().await?;
        let mut added = 0;
        for (index, address) in derive_addresses(&key, from..to)? {
            if self.find_account(&address).is_some() {
                continue;
            }
            let derivation_path = account_path(&self.hd_path, index);
            info!(%address, %derivation_path, "Account added");
            self.accounts.push(Account {
                address,
                derivation_path,
            });
            added += 1;
        }

        self.set_current_page(0);
        self.unlocked = None;

        let addresses = self.list_addresses();
        if added > 0 {
            self.emit(KeyringEvent::AccountsChanged(addresses.clone()));
        }
        Ok(addresses)
    }

    /// Track the account at the unlock index; `add_accounts(1)`
    pub async fn add_account(&mut self) -> Result<Vec<Address>> {
        self.add_accounts(1).await
    }

    /// Stop tracking `address`
    pub fn remove_account(&mut self, address: &str) -> Result<()> {
        let position = parse_tracked(address)
            .and_then(|a| self.accounts.iter().position(|acc| acc.address == a))
            .ok_or_else(|| Error::AccountNotFound(address.to_string()))?;

        let removed = self.accounts.remove(position);
        info!(address = %removed.address, "Account removed");
        self.emit(KeyringEvent::AccountsChanged(self.list_addresses()));
        Ok(())
    }

    /// Forget the device entirely
    pub fn forget_device(&mut self) {
        self.reset_state();
    }

    /// Clear accounts, page, unlock index, cached key, and restore the default path
    pub fn reset_state(&mut self) {
        self.clear();
        self.hd_path = DEFAULT_HD_PATH.to_string();
        info!("Keyring state reset");
        self.emit(KeyringEvent::Reset);
    }

    fn clear(&mut self) {
        self.accounts.clear();
        self.page = 0;
        self.last_unlocked_account_index = 0;
        self.unlocked = None;
    }

    // ------------------------------------------------------------------
    // Signing
    // ------------------------------------------------------------------

    /// Sign a transaction with the device
    ///
    /// The device signs legacy transactions only. Fee-market input is narrowed
    /// to a single gas price before it is sent, and the result is always a
    /// legacy transaction.
    pub async fn sign_transaction(
        &self,
        address: &str,
        transaction: &TransactionFields,
    ) -> Result<SignedLegacyTransaction> {
        let account = self.resolve(address)?;
        if transaction.is_fee_market() {
            debug!(address = %account.address, "Narrowing fee-market transaction to legacy");
        }
        let legacy = transaction.to_legacy();

        let signed = self
            .bridge
            .sign_transaction(&account.address, &account.derivation_path, legacy.clone())
            .await?;
        let signature = SignatureParts::from_signed_hex(&signed)?;
        Ok(SignedLegacyTransaction::new(legacy, signature))
    }

    /// Sign a personal message given as hex
    pub async fn sign_personal_message(&self, address: &str, message_hex: &str) -> Result<String> {
        let account = self.resolve(address)?;
        let signature = self
            .bridge
            .sign_message(&account.derivation_path, message_hex)
            .await?;
        Ok(add_hex_prefix(&signature))
    }

    /// Same as [`sign_personal_message`](Self::sign_personal_message)
    pub async fn sign_message(&self, address: &str, message_hex: &str) -> Result<String> {
        self.sign_personal_message(address, message_hex).await
    }

    /// Sign structured data; only [`TypedDataVersion::SUPPORTED`] is accepted
    pub async fn sign_typed_data(
        &self,
        address: &str,
        typed_data: &Value,
        version: TypedDataVersion,
    ) -> Result<String> {
        version.ensure_supported()?;
        let account = self.resolve(address)?;
        let canonical = canonical_typed_data_json(typed_data)?;

        let signature = self
            .bridge
            .sign_typed_data(&account.derivation_path, canonical)
            .await?;
        Ok(add_hex_prefix(&signature))
    }

    /// Private keys never leave the device
    pub fn export_account(&self, address: &str) -> Result<String> {
        debug!(%address, "Refusing account export");
        Err(Error::Unsupported(
            "Not supported on hardware device".to_string(),
        ))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn find_account(&self, address: &Address) -> Option<&Account> {
        self.accounts.iter().find(|a| a.address == *address)
    }

    fn resolve(&self, address: &str) -> Result<&Account> {
        parse_tracked(address)
            .and_then(|a| self.find_account(&a))
            .ok_or_else(|| Error::AccountNotFound(address.to_string()))
    }

    async fn extended_key(&mut self) -> Result<ExtendedPublicKey> {
        if let Some(unlocked) = self.unlocked.as_ref().filter(|u| u.hd_path == self.hd_path) {
            return Ok(unlocked.key.clone());
        }

        let key = self.bridge.fetch_extended_public_key(&self.hd_path).await?;
        self.unlocked = Some(UnlockedKey {
            hd_path: self.hd_path.clone(),
            key: key.clone(),
        });
        debug!(hd_path = %self.hd_path, "Keyring unlocked");
        self.emit(KeyringEvent::Unlocked(self.hd_path.clone()));
        Ok(key)
    }
}

/// Anything that does not parse cannot be tracked
fn parse_tracked(address: &str) -> Option<Address> {
    address.parse().ok()
}
