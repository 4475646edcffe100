use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection parameters handed to the engine on `connect`.
///
/// Mirrors the engine's `net_params` object. Only the fields this layer
/// actually sets are modelled; the engine fills in the rest from its
/// built-in network registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkParams {
	pub name: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub proxy: String,
	#[serde(default)]
	pub use_tor: bool,
	#[serde(default)]
	pub spv_enabled: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub electrum_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub electrum_tls: Option<bool>,
	#[serde(default = "default_user_agent")]
	pub user_agent: String,
}

fn default_user_agent() -> String {
	format!("green_wallet_sessions_{}", env!("CARGO_PKG_VERSION"))
}

impl Default for NetworkParams {
	fn default() -> Self {
		Self {
			name: String::new(),
			proxy: String::new(),
			use_tor: false,
			spv_enabled: false,
			electrum_url: None,
			electrum_tls: None,
			user_agent: default_user_agent(),
		}
	}
}

/// Status object returned by an engine call object.
///
/// The engine drives two-factor and hardware interactions through a small
/// state machine; each `get_status` returns one of these.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TwoFactorStatus {
	Done {
		#[serde(default)]
		result: Option<Value>,
	},
	Error {
		#[serde(default)]
		error: String,
	},
	Call,
	RequestCode {
		#[serde(default)]
		methods: Vec<String>,
	},
	ResolveCode {
		#[serde(default)]
		method: Option<String>,
		#[serde(default)]
		methods: Vec<String>,
		#[serde(default)]
		attempts_remaining: Option<u32>,
		#[serde(default)]
		required_data: Option<RequiredData>,
	},
}

/// Hardware request embedded in a `resolve_code` status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredData {
	pub action: String,
	#[serde(default)]
	pub device: Option<Value>,
	#[serde(flatten)]
	pub details: serde_json::Map<String, Value>,
}

/// Two-factor configuration of a multisig wallet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TwoFactorConfig {
	#[serde(default)]
	pub any_enabled: bool,
	#[serde(default)]
	pub all_methods: Vec<String>,
	#[serde(default)]
	pub enabled_methods: Vec<String>,
}

/// Classification of a user-provided lightning payment destination.
#[derive(Debug, Clone, PartialEq)]
pub enum InputType {
	BitcoinAddress { address: String, amount_sat: Option<u64> },
	Bolt11(LnInvoice),
	LnUrlPay(LnUrlPayRequestData),
	LnUrlAuth { url: String },
	LnUrlWithdraw { url: String },
	NodeId { node_id: String },
	Url { url: String },
	LnUrlError { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LnInvoice {
	pub bolt11: String,
	pub payment_hash: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub amount_msat: Option<u64>,
	/// Creation time, unix seconds.
	pub timestamp: u64,
	/// Validity window in seconds from `timestamp`.
	pub expiry: u64,
}

impl LnInvoice {
	pub fn amount_satoshi(&self) -> Option<u64> {
		self.amount_msat.map(|msat| msat / 1000)
	}

	pub fn expires_at(&self) -> i64 {
		self.timestamp.saturating_add(self.expiry) as i64
	}

	pub fn is_expired_at(&self, now: i64) -> bool {
		now >= self.expires_at()
	}

	pub fn is_expired(&self) -> bool {
		self.is_expired_at(chrono::Utc::now().timestamp())
	}

	/// Amount that will actually be paid: the invoice amount, or the user's
	/// amount for zero-amount invoices.
	pub fn sendable_satoshi(&self, user_satoshi: Option<u64>) -> Option<u64> {
		self.amount_satoshi().or(user_satoshi)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LnUrlPayRequestData {
	pub callback: String,
	pub domain: String,
	pub min_sendable: u64,
	pub max_sendable: u64,
	#[serde(default)]
	pub comment_allowed: u16,
	#[serde(default)]
	pub ln_address: Option<String>,
}

impl LnUrlPayRequestData {
	pub fn min_sendable_satoshi(&self) -> u64 {
		self.min_sendable.div_ceil(1000)
	}

	pub fn max_sendable_satoshi(&self) -> u64 {
		self.max_sendable / 1000
	}

	/// Fixed-amount requests dictate the amount; otherwise the user decides.
	pub fn sendable_satoshi(&self, user_satoshi: Option<u64>) -> Option<u64> {
		if self.min_sendable_satoshi() == self.max_sendable_satoshi() {
			Some(self.min_sendable_satoshi())
		} else {
			user_satoshi
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
	Sent,
	Received,
	ClosedChannel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
	Pending,
	Complete,
	Failed,
}

/// A settled or pending lightning payment as reported by the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
	pub id: String,
	pub payment_type: PaymentType,
	pub payment_time: i64,
	pub amount_msat: u64,
	pub fee_msat: u64,
	pub status: PaymentStatus,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub payment_hash: Option<String>,
	#[serde(default)]
	pub bolt11: Option<String>,
}

/// On-chain to lightning swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapInfo {
	pub bitcoin_address: String,
	pub created_at: i64,
	#[serde(default)]
	pub paid_msat: u64,
	#[serde(default)]
	pub confirmed_sats: u64,
	#[serde(default)]
	pub unconfirmed_sats: u64,
	#[serde(default)]
	pub lock_height: Option<u32>,
}

/// Lightning to on-chain swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseSwapInfo {
	pub id: String,
	pub onchain_amount_sat: u64,
	pub created_at: i64,
	#[serde(default)]
	pub claim_txid: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LnUrlPayResult {
	EndpointSuccess { payment: Payment },
	EndpointError { reason: String },
	PayError { reason: String, payment_hash: String },
}

/// Events pushed by the lightning node's background listener.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
	Synced,
	NewBlock(u32),
	InvoicePaid { payment_hash: String, bolt11: String },
	PaymentSucceed { payment: Payment },
	PaymentFailed { error: String },
}

/// Error types for calls into the wallet engine and the lightning node.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
	#[error("{0}")]
	Generic(String),

	#[error("JSON parse error: {0}")]
	Json(String),

	#[error("Engine call timed out")]
	Timeout,

	#[error("Session not connected")]
	NotConnected,

	#[error("Unsupported: {0}")]
	Unsupported(String),
}

impl From<serde_json::Error> for EngineError {
	fn from(e: serde_json::Error) -> Self {
		EngineError::Json(e.to_string())
	}
}

impl From<tokio::task::JoinError> for EngineError {
	fn from(e: tokio::task::JoinError) -> Self {
		EngineError::Generic(format!("engine task failed: {}", e))
	}
}
