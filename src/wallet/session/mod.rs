//! Network sessions
//!
//! A session owns the connection to one network backend for one wallet. Two implementations
//! exist: [`SessionManager`] for engine-backed bitcoin and liquid networks, and
//! [`LightningSessionManager`] for the lightning node. Both expose the same [`WalletSession`]
//! contract so the login orchestrator can drive them uniformly.
//!
//! - `config`: connection and tuning settings shared by all sessions of a wallet.
//! - `reconnection`: the process-wide queue serializing connect/disconnect transitions.
//! - `datadir`: existence check and removal of per-wallet local state.
//! - `events`: notification conversion and the per-session event bus.
//! - `resolver`: two-factor and hardware challenge resolution.

pub mod config;
pub mod datadir;
pub mod events;
pub mod lightning;
pub mod manager;
pub mod reconnection;
pub mod resolver;

pub use config::SessionConfig;
pub use events::{EventBus, SessionEvent};
pub use lightning::LightningSessionManager;
pub use manager::SessionManager;
pub use reconnection::ReconnectionQueue;

use crate::wallet::credentials::{Credentials, HwDevice, LoginUserResult, PinData, WalletIdentifier};
use crate::wallet::item::WalletItem;
use crate::wallet::network::NetworkSecurityCase;
use crate::wallet::transaction::{SendTransactionSuccess, Transaction};
use crate::wallet::types::WalletError;

use serde_json::Value;
use std::collections::HashMap;

/// Contract shared by every network session.
#[async_trait::async_trait]
pub trait WalletSession: Send + Sync {
    fn network(&self) -> NetworkSecurityCase;

    fn is_connected(&self) -> bool;

    fn is_logged(&self) -> bool;

    fn is_paused(&self) -> bool;

    fn block_height(&self) -> u32;

    /// Identity reported by the last successful login.
    fn login_data(&self) -> Option<LoginUserResult>;

    fn events(&self) -> EventBus;

    /// Lightning only: whether the last login restored an existing node.
    fn is_restored_node(&self) -> Option<bool> {
        None
    }

    /// No-op when already connected.
    async fn connect(&self) -> Result<(), WalletError>;

    /// Safe to call repeatedly.
    async fn disconnect(&self) -> Result<(), WalletError>;

    /// `None` when the engine cannot derive an identity.
    async fn wallet_identifier(&self, credentials: &Credentials) -> Option<WalletIdentifier>;

    async fn wallet_identifier_from_xpub(&self, master_xpub: &str) -> Option<WalletIdentifier>;

    async fn exist_datadir(&self, wallet_hash_id: &str) -> bool;

    async fn remove_datadir(&self, wallet_hash_id: &str);

    async fn register(
        &self,
        credentials: Option<&Credentials>,
        hw: Option<&HwDevice>,
    ) -> Result<(), WalletError>;

    async fn login_user(
        &self,
        credentials: Option<&Credentials>,
        hw: Option<&HwDevice>,
    ) -> Result<LoginUserResult, WalletError>;

    /// Recover the wallet credentials from a PIN and its encrypted payload.
    async fn decrypt_with_pin(&self, pin: &str, pin_data: &PinData) -> Result<Credentials, WalletError>;

    /// Funds discovery after a restore. Returns whether anything was found.
    async fn discovery(&self) -> Result<bool, WalletError>;

    async fn subaccounts(&self, refresh: bool) -> Result<Vec<WalletItem>, WalletError>;

    async fn subaccount(&self, pointer: u32) -> Result<WalletItem, WalletError>;

    async fn get_balance(&self, pointer: u32, num_confs: u32) -> Result<HashMap<String, i64>, WalletError>;

    async fn transactions(&self, pointer: u32, first: usize) -> Result<Vec<Transaction>, WalletError>;

    async fn create_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError>;

    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError>;

    async fn send_transaction(&self, tx: Transaction) -> Result<SendTransactionSuccess, WalletError>;

    async fn broadcast_transaction(&self, tx_hex: &str) -> Result<SendTransactionSuccess, WalletError>;

    /// Suspend network activity, e.g. when the app goes to background.
    async fn pause(&self);

    async fn resume(&self);

    /// Cached settings, if loaded.
    fn settings(&self) -> Option<Value>;

    async fn load_settings(&self) -> Result<Option<Value>, WalletError>;

    async fn change_settings(&self, settings: Value) -> Result<(), WalletError>;

    /// Warm the asset registry.
    async fn refresh_assets(&self) -> Result<(), WalletError>;
}
