//! Supported networks and their static parameters.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const BTC_ASSET: &str = "btc";
pub const LIGHTNING_ASSET: &str = "lightning";
pub const LBTC_ASSET: &str = "6f0279e9ed041c3d710a9f57d0c02928416460c4b722ae3457a11eec381c526d";
pub const LTEST_ASSET: &str = "144c654344aa716d6f3abcc1ca90e5641e4e2a7f633bc09fe3baf64585819a49";

/// Which kind of backend serves a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerType {
	/// Singlesig, electrum backed
	Electrum,
	/// Multisig, backed by the wallet service
	Green,
	/// Lightning node
	Breez,
}

/// A (network, security model) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkSecurityCase {
	#[serde(rename = "electrum-mainnet")]
	BitcoinSS,
	#[serde(rename = "mainnet")]
	BitcoinMS,
	#[serde(rename = "electrum-testnet")]
	TestnetSS,
	#[serde(rename = "testnet")]
	TestnetMS,
	#[serde(rename = "electrum-liquid")]
	LiquidSS,
	#[serde(rename = "liquid")]
	LiquidMS,
	#[serde(rename = "electrum-testnet-liquid")]
	TestnetLiquidSS,
	#[serde(rename = "testnet-liquid")]
	TestnetLiquidMS,
	#[serde(rename = "lightning-mainnet")]
	Lightning,
	#[serde(rename = "lightning-testnet")]
	TestnetLightning,
}

use NetworkSecurityCase::*;

impl NetworkSecurityCase {
	pub const ALL: [NetworkSecurityCase; 10] = [
		BitcoinSS,
		BitcoinMS,
		TestnetSS,
		TestnetMS,
		LiquidSS,
		LiquidMS,
		TestnetLiquidSS,
		TestnetLiquidMS,
		Lightning,
		TestnetLightning,
	];

	/// Engine network name.
	pub fn network(&self) -> &'static str {
		match self {
			BitcoinSS => "electrum-mainnet",
			BitcoinMS => "mainnet",
			TestnetSS => "electrum-testnet",
			TestnetMS => "testnet",
			LiquidSS => "electrum-liquid",
			LiquidMS => "liquid",
			TestnetLiquidSS => "electrum-testnet-liquid",
			TestnetLiquidMS => "testnet-liquid",
			Lightning => "lightning-mainnet",
			TestnetLightning => "lightning-testnet",
		}
	}

	pub fn from_network(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|case| case.network() == name)
	}

	/// Underlying chain, shared by the singlesig and multisig flavours.
	pub fn chain(&self) -> &'static str {
		let name = self.network();
		name.strip_prefix("electrum-")
			.or_else(|| name.strip_prefix("lightning-"))
			.unwrap_or(name)
	}

	pub fn server_type(&self) -> ServerType {
		match self {
			BitcoinSS | TestnetSS | LiquidSS | TestnetLiquidSS => ServerType::Electrum,
			BitcoinMS | TestnetMS | LiquidMS | TestnetLiquidMS => ServerType::Green,
			Lightning | TestnetLightning => ServerType::Breez,
		}
	}

	pub fn mainnet(&self) -> bool {
		matches!(self, BitcoinSS | BitcoinMS | LiquidSS | LiquidMS | Lightning)
	}

	pub fn liquid(&self) -> bool {
		matches!(self, LiquidSS | LiquidMS | TestnetLiquidSS | TestnetLiquidMS)
	}

	pub fn electrum(&self) -> bool {
		self.server_type() == ServerType::Electrum
	}

	pub fn lightning(&self) -> bool {
		self.server_type() == ServerType::Breez
	}

	pub fn multisig(&self) -> bool {
		self.server_type() == ServerType::Green
	}

	pub fn singlesig(&self) -> bool {
		self.electrum()
	}

	pub fn bitcoin(&self) -> bool {
		!self.liquid() && !self.lightning()
	}

	/// Asset id balances of this network are denominated in.
	pub fn policy_asset(&self) -> &'static str {
		match self {
			LiquidSS | LiquidMS => LBTC_ASSET,
			TestnetLiquidSS | TestnetLiquidMS => LTEST_ASSET,
			Lightning | TestnetLightning => LIGHTNING_ASSET,
			_ => BTC_ASSET,
		}
	}

	/// Singlesig bitcoin network that backs this network's identity derivation.
	pub fn chain_network(&self) -> NetworkSecurityCase {
		if self.mainnet() { BitcoinSS } else { TestnetSS }
	}

	/// Display position; bitcoin first, then lightning, then liquid.
	pub fn sort_rank(&self) -> usize {
		const ORDER: [NetworkSecurityCase; 10] = [
			BitcoinSS,
			TestnetSS,
			BitcoinMS,
			TestnetMS,
			Lightning,
			TestnetLightning,
			LiquidSS,
			TestnetLiquidSS,
			LiquidMS,
			TestnetLiquidMS,
		];
		ORDER.iter().position(|case| case == self).unwrap_or(0)
	}
}

impl fmt::Display for NetworkSecurityCase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.network())
	}
}

impl PartialOrd for NetworkSecurityCase {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for NetworkSecurityCase {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.sort_rank().cmp(&other.sort_rank())
	}
}
