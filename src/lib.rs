//! Multi-network wallet sessions.
//!
//! Coordinates login across the bitcoin, liquid and lightning backends of a wallet, resolves
//! two-factor challenges raised by the wallet engine and keeps per-network failures apart from
//! the overall login outcome. The engine and the lightning node are external collaborators,
//! described by the traits in [`engine`].

pub mod engine;
pub mod wallet;

pub use wallet::session::{LightningSessionManager, SessionConfig, SessionManager, WalletSession};
pub use wallet::{LoginRequest, WalletError, WalletManager, WalletServices};
