use crate::engine::EngineError;
use crate::wallet::network::NetworkSecurityCase;

fn detail(message: &Option<String>) -> String {
	match message {
		Some(m) if !m.is_empty() => format!(": {}", m),
		_ => String::new(),
	}
}

/// Login failures surfaced by sessions and the login orchestrator.
///
/// Every variant carries the engine's message when one is available.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
	#[error("Wallets were just restored{}", detail(.0))]
	WalletsJustRestored(Option<String>),

	#[error("Wallet not found{}", detail(.0))]
	WalletNotFound(Option<String>),

	#[error("Invalid mnemonic{}", detail(.0))]
	InvalidMnemonic(Option<String>),

	#[error("Connection failed{}", detail(.0))]
	ConnectionFailed(Option<String>),

	#[error("Login failed{}", detail(.0))]
	Failed(Option<String>),

	#[error("Wallet mismatch{}", detail(.0))]
	WalletMismatch(Option<String>),

	#[error("Host unblinding disabled{}", detail(.0))]
	HostUnblindingDisabled(Option<String>),
}

/// Two-factor and hardware interaction failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TwoFactorError {
	/// The user declined; never counted as a failed attempt.
	#[error("Action cancelled: {0}")]
	Cancel(String),

	#[error("Two-factor failure: {0}")]
	Failure(String),

	#[error("Timed out waiting for the connection")]
	ConnectionTimeout,

	#[error("Too many wrong codes")]
	AttemptsExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
	#[error("Invalid transaction: {0}")]
	Invalid(String),

	#[error("Transaction failed: {message}")]
	Failure {
		message: String,
		payment_hash: Option<String>,
	},
}

/// Top level error for wallet and session operations
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
	#[error(transparent)]
	Login(#[from] LoginError),

	#[error(transparent)]
	TwoFactor(#[from] TwoFactorError),

	#[error(transparent)]
	Transaction(#[from] TransactionError),

	#[error("Engine error: {0}")]
	Engine(#[from] EngineError),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Invalid wallet hash id: {0:?}")]
	InvalidWalletHashId(String),

	#[error("No session for network {0}")]
	SessionNotFound(NetworkSecurityCase),

	#[error("Storage error: {0}")]
	Storage(String),
}

impl WalletError {
	/// Message of the underlying engine or two-factor failure, if any.
	pub fn message(&self) -> String {
		match self {
			WalletError::TwoFactor(TwoFactorError::Failure(msg)) => msg.clone(),
			WalletError::Engine(EngineError::Generic(msg)) => msg.clone(),
			other => other.to_string(),
		}
	}

	pub fn is_cancel(&self) -> bool {
		matches!(self, WalletError::TwoFactor(TwoFactorError::Cancel(_)))
	}
}
