//! Per-network login failures.
//!
//! The engine reports some capability gaps only as free text on its generic error channel.
//! [`translate_login_error`] is the single place that inspects that text; everything else works
//! with the resulting [`LoginError`].

use crate::wallet::network::NetworkSecurityCase;
use crate::wallet::types::{LoginError, TwoFactorError, WalletError};

use std::collections::HashMap;
use tracing::warn;

/// Engine text raised when a hardware wallet refuses host unblinding.
pub const HOST_UNBLINDING_DISABLED: &str = "HWW must enable host unblinding for singlesig wallets";

/// Engine text for a wallet that does not exist on the server.
pub const LOGIN_FAILED: &str = "id_login_failed";

/// Map a session login error to the error recorded for its network.
pub fn translate_login_error(error: WalletError) -> WalletError {
	let text = match &error {
		WalletError::TwoFactor(TwoFactorError::Failure(text)) => text.clone(),
		WalletError::Login(LoginError::Failed(Some(text))) => text.clone(),
		WalletError::Engine(e) => e.to_string(),
		_ => return error,
	};
	if text.contains(HOST_UNBLINDING_DISABLED) {
		LoginError::HostUnblindingDisabled(Some(text)).into()
	} else if text == LOGIN_FAILED {
		LoginError::WalletNotFound(Some(text)).into()
	} else {
		error
	}
}

/// Failures of the current login attempt, keyed by network.
#[derive(Debug, Default)]
pub struct Failures {
	errors: HashMap<NetworkSecurityCase, WalletError>,
}

impl Failures {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&mut self, network: NetworkSecurityCase, error: WalletError) {
		let error = translate_login_error(error);
		warn!("Login failed on {}: {}", network, error);
		self.errors.insert(network, error);
	}

	pub fn reset(&mut self) {
		self.errors.clear();
	}

	pub fn get(&self, network: &NetworkSecurityCase) -> Option<&WalletError> {
		self.errors.get(network)
	}

	pub fn networks(&self) -> Vec<NetworkSecurityCase> {
		let mut networks: Vec<_> = self.errors.keys().copied().collect();
		networks.sort();
		networks
	}

	pub fn len(&self) -> usize {
		self.errors.len()
	}

	pub fn is_empty(&self) -> bool {
		self.errors.is_empty()
	}

	/// Failures worth showing to the user. A wallet that simply does not exist on a network
	/// is not a warning.
	pub fn warnings(&self) -> Vec<(NetworkSecurityCase, String)> {
		let mut warnings: Vec<_> = self
			.errors
			.iter()
			.filter(|(_, e)| !matches!(e, WalletError::Login(LoginError::WalletNotFound(_))))
			.map(|(network, e)| (*network, e.to_string()))
			.collect();
		warnings.sort_by_key(|(network, _)| *network);
		warnings
	}
}
