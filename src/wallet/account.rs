use crate::wallet::credentials::HwDevice;
use crate::wallet::network::NetworkSecurityCase;
use crate::wallet::types::WalletError;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Persisted metadata of one wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
	pub id: String,
	pub name: String,
	/// Prominent network: the one whose identity keys the wallet.
	pub network: NetworkSecurityCase,
	#[serde(default)]
	pub keychain: String,
	#[serde(default)]
	pub wallet_hash_id: Option<String>,
	#[serde(default)]
	pub xpub_hash_id: Option<String>,
	#[serde(default)]
	pub lightning_wallet_hash_id: Option<String>,
	#[serde(default)]
	pub is_derived_lightning: bool,
	#[serde(default)]
	pub watchonly: bool,
	#[serde(default)]
	pub hw_device: Option<HwDevice>,
}

impl Account {
	pub fn new(id: impl Into<String>, name: impl Into<String>, network: NetworkSecurityCase) -> Self {
		let id = id.into();
		Self {
			keychain: id.clone(),
			id,
			name: name.into(),
			network,
			wallet_hash_id: None,
			xpub_hash_id: None,
			lightning_wallet_hash_id: None,
			is_derived_lightning: false,
			watchonly: false,
			hw_device: None,
		}
	}

	pub fn is_hw(&self) -> bool {
		self.hw_device.is_some()
	}

	pub fn mainnet(&self) -> bool {
		self.network.mainnet()
	}

	/// Secure storage key of the PIN payload.
	pub fn pin_key(&self) -> String {
		format!("{}_pin", self.keychain)
	}

	/// Secure storage key of the wrong-PIN counter.
	pub fn pin_attempts_key(&self) -> String {
		format!("{}_pin_attempts", self.keychain)
	}
}

/// Secure storage key of a lightning node's credentials.
pub fn lightning_credentials_key(wallet_hash_id: &str) -> String {
	format!("lightning_{}", wallet_hash_id)
}

/// Repository for account metadata
#[async_trait::async_trait]
pub trait AccountStore: Send + Sync {
	async fn upsert(&self, account: &Account) -> Result<(), WalletError>;
	async fn get(&self, id: &str) -> Result<Option<Account>, WalletError>;
	async fn remove(&self, id: &str) -> Result<(), WalletError>;
}

/// Secure key/value storage owned by the platform.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
	async fn get(&self, key: &str) -> Result<Option<Value>, WalletError>;
	async fn set(&self, key: &str, value: Value) -> Result<(), WalletError>;
	async fn remove(&self, key: &str) -> Result<(), WalletError>;
}

#[derive(Default)]
pub struct InMemoryAccountStore {
	accounts: Mutex<HashMap<String, Account>>,
}

impl InMemoryAccountStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl AccountStore for InMemoryAccountStore {
	async fn upsert(&self, account: &Account) -> Result<(), WalletError> {
		self.accounts
			.lock()
			.await
			.insert(account.id.clone(), account.clone());
		Ok(())
	}

	async fn get(&self, id: &str) -> Result<Option<Account>, WalletError> {
		Ok(self.accounts.lock().await.get(id).cloned())
	}

	async fn remove(&self, id: &str) -> Result<(), WalletError> {
		self.accounts.lock().await.remove(id);
		Ok(())
	}
}

/// File-based implementation of AccountStore, one JSON file per account
pub struct FileAccountStore {
	data_dir: PathBuf,
}

impl FileAccountStore {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn account_filename(&self, id: &str) -> PathBuf {
		self.data_dir.join("accounts").join(format!("{}.json", id))
	}
}

#[async_trait::async_trait]
impl AccountStore for FileAccountStore {
	async fn upsert(&self, account: &Account) -> Result<(), WalletError> {
		let filename = self.account_filename(&account.id);
		if let Some(parent) = filename.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		let document = serde_json::json!({
			"account": account,
			"updated_at": chrono::Utc::now().to_rfc3339(),
		});
		tokio::fs::write(&filename, serde_json::to_vec_pretty(&document)?).await?;
		debug!("Saved account {} to {:?}", account.id, filename);
		Ok(())
	}

	async fn get(&self, id: &str) -> Result<Option<Account>, WalletError> {
		let filename = self.account_filename(id);
		if !tokio::fs::try_exists(&filename).await? {
			return Ok(None);
		}
		let content = tokio::fs::read(&filename).await?;
		let mut document: Value = serde_json::from_slice(&content)?;
		let account = serde_json::from_value(document["account"].take())?;
		Ok(Some(account))
	}

	async fn remove(&self, id: &str) -> Result<(), WalletError> {
		let filename = self.account_filename(id);
		if tokio::fs::try_exists(&filename).await? {
			tokio::fs::remove_file(&filename).await?;
			info!("Removed account {}", id);
		}
		Ok(())
	}
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
	entries: Mutex<HashMap<String, Value>>,
}

impl InMemoryCredentialStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl CredentialStore for InMemoryCredentialStore {
	async fn get(&self, key: &str) -> Result<Option<Value>, WalletError> {
		Ok(self.entries.lock().await.get(key).cloned())
	}

	async fn set(&self, key: &str, value: Value) -> Result<(), WalletError> {
		self.entries.lock().await.insert(key.to_string(), value);
		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<(), WalletError> {
		self.entries.lock().await.remove(key);
		Ok(())
	}
}
