use crate::wallet::types::WalletError;

use std::path::PathBuf;
use tracing::info;

/// Repository for per-wallet local state directories
#[async_trait::async_trait]
pub trait DatadirRepository: Send + Sync {
	/// Directory holding the state of `wallet_hash_id`.
	fn path(&self, wallet_hash_id: &str) -> Result<PathBuf, WalletError>;
	async fn exists(&self, wallet_hash_id: &str) -> Result<bool, WalletError>;
	async fn remove(&self, wallet_hash_id: &str) -> Result<(), WalletError>;
}

/// Reject anything that could escape the state root.
pub fn validate_wallet_hash_id(wallet_hash_id: &str) -> Result<(), WalletError> {
	if wallet_hash_id.is_empty() || !wallet_hash_id.chars().all(|c| c.is_ascii_alphanumeric()) {
		return Err(WalletError::InvalidWalletHashId(wallet_hash_id.to_string()));
	}
	Ok(())
}

/// File-based implementation of DatadirRepository, `{root}/{wallet_hash_id}[/{suffix}]`
pub struct FileDatadirRepository {
	root: PathBuf,
	suffix: Option<String>,
}

impl FileDatadirRepository {
	pub fn new(root: PathBuf) -> Self {
		Self { root, suffix: None }
	}

	/// Lightning nodes keep their state one level deeper, under `{hash}/0`.
	pub fn with_suffix(root: PathBuf, suffix: impl Into<String>) -> Self {
		Self {
			root,
			suffix: Some(suffix.into()),
		}
	}
}

#[async_trait::async_trait]
impl DatadirRepository for FileDatadirRepository {
	fn path(&self, wallet_hash_id: &str) -> Result<PathBuf, WalletError> {
		validate_wallet_hash_id(wallet_hash_id)?;
		let dir = self.root.join(wallet_hash_id);
		Ok(match &self.suffix {
			Some(suffix) => dir.join(suffix),
			None => dir,
		})
	}

	async fn exists(&self, wallet_hash_id: &str) -> Result<bool, WalletError> {
		let path = self.path(wallet_hash_id)?;
		Ok(tokio::fs::try_exists(&path).await?)
	}

	async fn remove(&self, wallet_hash_id: &str) -> Result<(), WalletError> {
		let path = self.path(wallet_hash_id)?;
		match tokio::fs::remove_dir_all(&path).await {
			Ok(()) => {
				info!("Removed datadir {:?}", path);
				Ok(())
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}
