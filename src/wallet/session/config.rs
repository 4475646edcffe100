//! Session configuration.
//!
//! One `SessionConfig` is shared by every session of a wallet. It carries the connection settings
//! (proxy, Tor, personal electrum servers), the root data directory, and the tuning knobs for the
//! reconnection path and the two-factor resolver.

use crate::engine::NetworkParams;
use crate::wallet::network::NetworkSecurityCase;
use crate::wallet::types::WalletError;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Exponential backoff bounds for the automatic reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub max_elapsed_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 500,
            max_interval_ms: 10_000,
            max_elapsed_secs: 60,
        }
    }
}

/// Two-factor resolver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// How many times to poll for a connection before a `call` gives up.
    pub connection_attempts: u32,
    /// Pause between connection polls.
    pub connection_wait_secs: u64,
    /// Wrong codes tolerated before the flow is abandoned.
    pub max_code_attempts: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            connection_attempts: 5,
            connection_wait_secs: 3,
            max_code_attempts: 3,
        }
    }
}

impl ResolverConfig {
    pub fn connection_wait(&self) -> Duration {
        Duration::from_secs(self.connection_wait_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Root of all per-wallet local state.
    pub datadir: PathBuf,
    pub proxy: Option<String>,
    pub use_tor: bool,
    pub spv_enabled: bool,
    /// Personal electrum servers, per network.
    pub electrum_urls: HashMap<NetworkSecurityCase, String>,
    pub electrum_tls: bool,
    pub reconnect: ReconnectConfig,
    pub resolver: ResolverConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            datadir: PathBuf::from("./green-data"),
            proxy: None,
            use_tor: false,
            spv_enabled: false,
            electrum_urls: HashMap::new(),
            electrum_tls: true,
            reconnect: ReconnectConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_datadir(datadir: impl Into<PathBuf>) -> Self {
        Self {
            datadir: datadir.into(),
            ..Default::default()
        }
    }

    /// Load a JSON config file; missing fields take their defaults.
    pub async fn load(path: &Path) -> Result<Self, WalletError> {
        let content = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Engine connection parameters for `network`.
    pub fn network_params(&self, network: NetworkSecurityCase) -> NetworkParams {
        let electrum_url = self.electrum_urls.get(&network).cloned();
        NetworkParams {
            name: network.network().to_string(),
            proxy: self.proxy.clone().unwrap_or_default(),
            use_tor: self.use_tor,
            spv_enabled: self.spv_enabled && network.singlesig(),
            electrum_tls: electrum_url.as_ref().map(|_| self.electrum_tls),
            electrum_url,
            ..Default::default()
        }
    }

    /// Root for electrum-backed wallet state: `{datadir}/state`.
    pub fn state_dir(&self) -> PathBuf {
        self.datadir.join("state")
    }

    /// Root for lightning node working directories: `{datadir}/breezSdk`.
    pub fn lightning_dir(&self) -> PathBuf {
        self.datadir.join("breezSdk")
    }
}
