//! Wallet layer: accounts, network sessions and the login orchestrator.

pub mod account;
pub mod credentials;
pub mod failures;
pub mod item;
pub mod manager;
pub mod network;
pub mod session;
pub mod transaction;
pub mod types;

pub use account::{Account, AccountStore, CredentialStore};
pub use credentials::{Credentials, HwDevice, LoginUserResult, PinData, WalletIdentifier};
pub use failures::Failures;
pub use item::{SubaccountType, WalletItem};
pub use manager::{LoginRequest, WalletManager, WalletServices};
pub use network::NetworkSecurityCase;
pub use transaction::{Addressee, SendTransactionSuccess, Transaction};
pub use types::*;
