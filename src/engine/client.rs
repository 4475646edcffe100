//!
//! Contract with the external wallet engine and the lightning node.
//!
//! The engine is an opaque native library: every call is synchronous and may block on network
//! I/O. Nothing in this crate implements it; sessions receive an implementation at construction
//! time and push each call onto tokio's blocking pool through [`run_blocking`], so no async task
//! ever blocks a runtime worker.

use super::types::*;
use serde_json::Value;
use std::sync::Arc;

/// Callback installed on an engine session to receive raw notifications.
pub type NotificationHandler = Box<dyn Fn(Value) + Send + Sync>;

/// Callback installed on a lightning node to receive node events.
pub type NodeEventHandler = Box<dyn Fn(NodeEvent) + Send + Sync>;

/// Factory for engine sessions, one per network.
pub trait WalletEngine: Send + Sync {
	fn create_session(&self) -> Result<Arc<dyn EngineSession>, EngineError>;
}

/// One engine session bound to a single network.
///
/// Calls that may require user interaction return a [`TwoFactorCall`] to be driven by the
/// resolver; everything else returns its JSON result directly.
pub trait EngineSession: Send + Sync {
	fn connect(&self, params: &NetworkParams) -> Result<(), EngineError>;

	/// Drops the underlying connection. Safe to call on a disconnected session.
	fn disconnect(&self) -> Result<(), EngineError>;

	/// Hint the engine to suspend or resume network activity, e.g. `{"hint": "disconnect"}`.
	fn reconnect_hint(&self, hint: &Value) -> Result<(), EngineError>;

	fn get_wallet_identifier(&self, params: &NetworkParams, details: &Value) -> Result<Value, EngineError>;

	fn register_user(&self, details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError>;

	fn login_user(&self, details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError>;

	/// Decrypts a stored PIN payload; the call result holds the wallet credentials.
	fn decrypt_with_pin(&self, details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError>;

	fn get_subaccounts(&self, details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError>;

	fn get_subaccount(&self, pointer: u32) -> Result<Arc<dyn TwoFactorCall>, EngineError>;

	fn update_subaccount(&self, details: &Value) -> Result<(), EngineError>;

	fn get_balance(&self, details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError>;

	fn get_transactions(&self, details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError>;

	fn create_transaction(&self, details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError>;

	fn sign_transaction(&self, details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError>;

	fn send_transaction(&self, details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError>;

	fn broadcast_transaction(&self, tx_hex: &str) -> Result<String, EngineError>;

	fn get_two_factor_config(&self) -> Result<Value, EngineError>;

	fn get_settings(&self) -> Result<Value, EngineError>;

	fn change_settings(&self, details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError>;

	fn refresh_assets(&self, details: &Value) -> Result<(), EngineError>;

	fn set_notification_handler(&self, handler: NotificationHandler);
}

/// Engine call object, possibly paused waiting for a two-factor code or a hardware reply.
pub trait TwoFactorCall: Send + Sync {
	fn get_status(&self) -> Result<Value, EngineError>;

	fn call(&self) -> Result<(), EngineError>;

	fn request_code(&self, method: &str) -> Result<(), EngineError>;

	fn resolve_code(&self, code: &str) -> Result<(), EngineError>;
}

/// Lightning node backend (event-driven, no polling).
pub trait LightningNode: Send + Sync {
	/// Connects the node. With `check_credentials` set, fails if no node exists for the seed
	/// instead of registering a new one.
	fn connect(&self, mnemonic: &str, check_credentials: bool) -> Result<(), EngineError>;

	fn stop(&self) -> Result<(), EngineError>;

	/// Node credentials to persist after a successful connect.
	fn credentials(&self) -> Option<Value>;

	fn balance_sat(&self) -> Result<u64, EngineError>;

	fn parse_input(&self, input: &str) -> Result<InputType, EngineError>;

	fn send_payment(&self, bolt11: &str, amount_sat: Option<u64>) -> Result<Payment, EngineError>;

	fn pay_lnurl(
		&self,
		data: &LnUrlPayRequestData,
		amount_sat: u64,
		comment: &str,
	) -> Result<LnUrlPayResult, EngineError>;

	fn list_payments(&self) -> Result<Vec<Payment>, EngineError>;

	fn list_refundables(&self) -> Result<Vec<SwapInfo>, EngineError>;

	fn list_reverse_swaps(&self) -> Result<Vec<ReverseSwapInfo>, EngineError>;

	fn swap_progress(&self) -> Result<Option<SwapInfo>, EngineError>;

	fn set_event_handler(&self, handler: NodeEventHandler);
}

/// Builds a node rooted at a working directory.
pub trait LightningNodeFactory: Send + Sync {
	fn create_node(
		&self,
		working_dir: &std::path::Path,
		testnet: bool,
	) -> Result<Arc<dyn LightningNode>, EngineError>;
}

/// Run a synchronous engine call on the blocking pool.
pub async fn run_blocking<T, F>(f: F) -> Result<T, EngineError>
where
	F: FnOnce() -> Result<T, EngineError> + Send + 'static,
	T: Send + 'static,
{
	tokio::task::spawn_blocking(f).await?
}
