use crate::wallet::network::NetworkSecurityCase;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Script/security type of a subaccount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubaccountType {
	#[serde(rename = "p2wpkh")]
	SegWit,
	#[serde(rename = "p2sh-p2wpkh")]
	SegwitWrapped,
	#[serde(rename = "p2tr")]
	Taproot,
	#[serde(rename = "p2pkh")]
	Legacy,
	#[serde(rename = "2of2")]
	Standard,
	#[serde(rename = "2of2_no_recovery")]
	Amp,
	#[serde(rename = "2of3")]
	TwoOfThree,
	#[serde(rename = "lightning")]
	Lightning,
}

impl SubaccountType {
	pub fn singlesig(&self) -> bool {
		matches!(
			self,
			SubaccountType::Legacy
				| SubaccountType::SegwitWrapped
				| SubaccountType::SegWit
				| SubaccountType::Taproot
		)
	}

	pub fn multisig(&self) -> bool {
		matches!(
			self,
			SubaccountType::Standard | SubaccountType::Amp | SubaccountType::TwoOfThree
		)
	}
}

/// A subaccount of one network session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletItem {
	#[serde(default)]
	pub name: String,
	pub pointer: u32,
	#[serde(rename = "receiving_id", default)]
	pub receiving_id: String,
	#[serde(rename = "type")]
	pub kind: SubaccountType,
	#[serde(default)]
	pub bip44_discovered: Option<bool>,
	#[serde(default)]
	pub hidden: bool,
	pub network: NetworkSecurityCase,
	/// Cached balance per asset; `None` until a balance refresh completes.
	#[serde(default)]
	pub satoshi: Option<HashMap<String, i64>>,
	#[serde(default)]
	pub has_txs: bool,
}

impl WalletItem {
	pub fn new(
		name: impl Into<String>,
		pointer: u32,
		kind: SubaccountType,
		network: NetworkSecurityCase,
	) -> Self {
		Self {
			name: name.into(),
			pointer,
			receiving_id: String::new(),
			kind,
			bip44_discovered: None,
			hidden: false,
			network,
			satoshi: None,
			has_txs: false,
		}
	}

	/// Stable identifier, `network:pointer`.
	pub fn id(&self) -> String {
		format!("{}:{}", self.network.network(), self.pointer)
	}

	/// Balance in the network's policy asset.
	pub fn btc(&self) -> Option<i64> {
		self.satoshi
			.as_ref()
			.and_then(|s| s.get(self.network.policy_asset()).copied())
	}

	pub fn bip44_discovered(&self) -> bool {
		self.bip44_discovered.unwrap_or(false)
	}

	/// Display order: network, then type, then pointer.
	pub fn display_cmp(&self, other: &Self) -> Ordering {
		self.network
			.cmp(&other.network)
			.then(self.kind.cmp(&other.kind))
			.then(self.pointer.cmp(&other.pointer))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn parses_engine_subaccount() {
		let item: WalletItem = serde_json::from_value(json!({
			"name": "",
			"pointer": 16,
			"receiving_id": "",
			"type": "p2wpkh",
			"bip44_discovered": true,
			"hidden": false,
			"network": "electrum-mainnet"
		}))
		.unwrap();
		assert_eq!(item.id(), "electrum-mainnet:16");
		assert!(item.kind.singlesig());
		assert!(item.bip44_discovered());
		assert_eq!(item.btc(), None);
	}

	#[test]
	fn display_order() {
		let mut items = vec![
			WalletItem::new("b", 1, SubaccountType::Standard, NetworkSecurityCase::LiquidMS),
			WalletItem::new("a", 0, SubaccountType::Lightning, NetworkSecurityCase::Lightning),
			WalletItem::new("c", 1, SubaccountType::SegWit, NetworkSecurityCase::BitcoinSS),
			WalletItem::new("d", 0, SubaccountType::Legacy, NetworkSecurityCase::BitcoinSS),
			WalletItem::new("e", 0, SubaccountType::SegWit, NetworkSecurityCase::BitcoinSS),
		];
		items.sort_by(|a, b| a.display_cmp(b));
		let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
		assert_eq!(names, vec!["e", "c", "d", "a", "b"]);
	}
}
