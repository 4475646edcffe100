//! Multi-network login orchestrator.
//!
//! `WalletManager` owns one session per network of an account and drives them as a group:
//!
//! - Decides whether a login is a full restore (no known identity or no local state on the
//!   prominent network) or a continuation.
//! - Logs every not-yet-logged session in concurrently. A failing network never aborts its
//!   siblings; its error is recorded in [`Failures`] and the session is disconnected.
//! - Fails the whole attempt only when no session ended up logged in.
//! - Loads the merged subaccount list and warms the asset registry in the background.
//!
//! Collaborators (engine, lightning node factory, account and credential stores) are injected at
//! construction; nothing here is process-global apart from the reconnection queue the sessions
//! share.

use crate::engine::{EngineError, LightningNodeFactory, WalletEngine};
use crate::wallet::account::{Account, AccountStore, CredentialStore};
use crate::wallet::credentials::{Credentials, HwDevice, PinData, WalletIdentifier};
use crate::wallet::failures::Failures;
use crate::wallet::item::WalletItem;
use crate::wallet::network::NetworkSecurityCase;
use crate::wallet::session::manager::lock;
use crate::wallet::session::events::{EventBus, EventDispatcher};
use crate::wallet::session::resolver::{HwResolver, TwoFactorPrompt};
use crate::wallet::session::{
    LightningSessionManager, ReconnectionQueue, SessionConfig, SessionManager, WalletSession,
};
use crate::wallet::transaction::Transaction;
use crate::wallet::types::{LoginError, WalletError};

use futures::future::join_all;
use itertools::Itertools;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Wrong PINs tolerated before the stored PIN payload is purged.
pub const MAX_PIN_ATTEMPTS: u32 = 3;

/// Networks an account gets a session for.
pub fn session_networks(account: &Account) -> Vec<NetworkSecurityCase> {
    use NetworkSecurityCase::*;
    let lightning = if account.mainnet() { Lightning } else { TestnetLightning };
    let networks = if account.is_derived_lightning {
        vec![account.network, lightning]
    } else if account.mainnet() {
        vec![BitcoinSS, LiquidSS, BitcoinMS, LiquidMS, Lightning]
    } else {
        vec![TestnetSS, TestnetLiquidSS, TestnetMS, TestnetLiquidMS]
    };
    let supports_liquid = account.hw_device.as_ref().is_none_or(|hw| hw.supports_liquid);
    networks
        .into_iter()
        .filter(|network| supports_liquid || !network.liquid())
        .collect()
}

/// What a login attempt authenticates with.
#[derive(Debug, Clone, Default)]
pub struct LoginRequest {
    pub credentials: Option<Credentials>,
    /// Credentials of the lightning node; lightning is skipped without them.
    pub lightning_credentials: Option<Credentials>,
    pub device: Option<HwDevice>,
    pub master_xpub: Option<String>,
    pub full_restore: bool,
}

impl LoginRequest {
    pub fn software(credentials: Credentials) -> Self {
        Self {
            lightning_credentials: Some(credentials.clone()),
            credentials: Some(credentials),
            ..Default::default()
        }
    }

    pub fn hardware(device: HwDevice, master_xpub: impl Into<String>) -> Self {
        Self {
            device: Some(device),
            master_xpub: Some(master_xpub.into()),
            ..Default::default()
        }
    }

    pub fn with_lightning_credentials(mut self, credentials: Credentials) -> Self {
        self.lightning_credentials = Some(credentials);
        self
    }

    pub fn with_full_restore(mut self) -> Self {
        self.full_restore = true;
        self
    }
}

/// Services a [`WalletManager`] builds its sessions from.
#[derive(Clone)]
pub struct WalletServices {
    pub engine: Arc<dyn WalletEngine>,
    pub node_factory: Arc<dyn LightningNodeFactory>,
    pub account_store: Arc<dyn AccountStore>,
    pub credential_store: Arc<dyn CredentialStore>,
    pub queue: ReconnectionQueue,
    pub prompt: Option<Arc<dyn TwoFactorPrompt>>,
    pub hw: Option<Arc<dyn HwResolver>>,
}

pub struct WalletManager {
    account: Mutex<Account>,
    prominent_network: NetworkSecurityCase,
    sessions: BTreeMap<NetworkSecurityCase, Arc<dyn WalletSession>>,
    account_store: Arc<dyn AccountStore>,
    credential_store: Arc<dyn CredentialStore>,
    failures: Mutex<Failures>,
    subaccounts: Mutex<Vec<WalletItem>>,
    current_subaccount: Mutex<Option<String>>,
    login_generation: AtomicU64,
}

impl WalletManager {
    /// Manager over explicitly built sessions.
    pub fn new(
        account: Account,
        sessions: Vec<Arc<dyn WalletSession>>,
        account_store: Arc<dyn AccountStore>,
        credential_store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            prominent_network: account.network,
            account: Mutex::new(account),
            sessions: sessions.into_iter().map(|s| (s.network(), s)).collect(),
            account_store,
            credential_store,
            failures: Mutex::new(Failures::new()),
            subaccounts: Mutex::new(Vec::new()),
            current_subaccount: Mutex::new(None),
            login_generation: AtomicU64::new(0),
        }
    }

    /// Manager with one engine or lightning session per network of the account.
    pub fn from_engine(account: Account, config: Arc<SessionConfig>, services: WalletServices) -> Self {
        let sessions = session_networks(&account)
            .into_iter()
            .map(|network| -> Arc<dyn WalletSession> {
                if network.lightning() {
                    LightningSessionManager::new(
                        network,
                        services.engine.clone(),
                        services.node_factory.clone(),
                        services.credential_store.clone(),
                        config.clone(),
                    )
                } else {
                    SessionManager::with_resolvers(
                        network,
                        services.engine.clone(),
                        config.clone(),
                        services.queue.clone(),
                        services.prompt.clone(),
                        services.hw.clone(),
                    )
                }
            })
            .collect();
        Self::new(account, sessions, services.account_store, services.credential_store)
    }

    pub fn account(&self) -> Account {
        lock(&self.account).clone()
    }

    pub fn prominent_network(&self) -> NetworkSecurityCase {
        self.prominent_network
    }

    pub fn session(&self, network: NetworkSecurityCase) -> Option<Arc<dyn WalletSession>> {
        self.sessions.get(&network).cloned()
    }

    pub fn prominent_session(&self) -> Result<Arc<dyn WalletSession>, WalletError> {
        self.session(self.prominent_network)
            .ok_or(WalletError::SessionNotFound(self.prominent_network))
    }

    pub fn lightning_session(&self) -> Option<Arc<dyn WalletSession>> {
        self.sessions.values().find(|s| s.network().lightning()).cloned()
    }

    pub fn networks(&self) -> Vec<NetworkSecurityCase> {
        self.sessions.keys().copied().collect()
    }

    /// Logged in sessions, in display order.
    pub fn active_sessions(&self) -> Vec<Arc<dyn WalletSession>> {
        self.sessions.values().filter(|s| s.is_logged()).cloned().collect()
    }

    pub fn active_networks(&self) -> Vec<NetworkSecurityCase> {
        self.active_sessions().iter().map(|s| s.network()).collect()
    }

    pub fn logged(&self) -> bool {
        self.sessions.values().any(|s| s.is_logged())
    }

    /// Feed the events of every session into `dispatcher`, in publish order per session.
    pub fn dispatch_events(&self, dispatcher: EventDispatcher) -> JoinHandle<()> {
        let merged = EventBus::new();
        let receiver = merged.subscribe();
        for session in self.sessions.values() {
            let mut source = session.events().subscribe();
            let sink = merged.clone();
            let network = session.network();
            tokio::spawn(async move {
                loop {
                    match source.recv().await {
                        Ok(event) => sink.publish(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("WM events of {} lagged, skipped {}", network, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }
        dispatcher.spawn(receiver)
    }

    /// Per-network errors of the last login attempt.
    pub fn failure_sessions(&self) -> MutexGuard<'_, Failures> {
        lock(&self.failures)
    }

    /// Failures to show the user as non-fatal warnings.
    pub fn warnings(&self) -> Vec<(NetworkSecurityCase, String)> {
        lock(&self.failures).warnings()
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<(), WalletError> {
        self.login_request(LoginRequest::software(credentials.clone())).await
    }

    pub async fn login_hw(&self, device: HwDevice, master_xpub: &str) -> Result<(), WalletError> {
        self.login_request(LoginRequest::hardware(device, master_xpub)).await
    }

    /// Log in, giving up as soon as `cancel` turns true.
    ///
    /// Session logins already in flight keep running on their own task; whatever they produce
    /// after the cancellation is discarded.
    pub async fn login_cancellable(
        self: &Arc<Self>,
        request: LoginRequest,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<(), WalletError> {
        let this = self.clone();
        let login = tokio::spawn(async move { this.login_request(request).await });
        tokio::select! {
            result = login => result.map_err(EngineError::from)?,
            Ok(_) = cancel.wait_for(|cancelled| *cancelled) => {
                self.login_generation.fetch_add(1, Ordering::SeqCst);
                info!("WM login cancelled");
                Err(LoginError::Failed(Some("cancelled".into())).into())
            }
        }
    }

    /// Full login flow for every session not already logged in.
    pub async fn login_request(&self, request: LoginRequest) -> Result<(), WalletError> {
        let generation = self.login_generation.load(Ordering::SeqCst);
        let prominent = self.prominent_session()?;
        let parent_id = self.wallet_identifier(prominent.as_ref(), &request).await;
        let exist_datadir = match &parent_id {
            Some(id) => prominent.exist_datadir(&id.wallet_hash_id).await,
            None => false,
        };
        let full_restore =
            request.full_restore || lock(&self.account).xpub_hash_id.is_none() || !exist_datadir;

        lock(&self.failures).reset();
        let pending: Vec<_> = self.sessions.values().filter(|s| !s.is_logged()).cloned().collect();
        info!("WM login start: {} sessions, full restore: {}", pending.len(), full_restore);

        let results = join_all(pending.iter().map(|session| {
            let request = &request;
            let parent_id = parent_id.as_ref();
            async move {
                let network = session.network();
                info!("WM login {} begin", network);
                let result = if network.lightning() {
                    self.login_lightning_session(session.as_ref(), request, full_restore, parent_id)
                        .await
                } else {
                    self.login_session(session.as_ref(), request, full_restore).await
                };
                (session.clone(), result)
            }
        }))
        .await;

        if self.login_generation.load(Ordering::SeqCst) != generation {
            debug!("WM discarding results of a cancelled login");
            return Err(LoginError::Failed(Some("cancelled".into())).into());
        }

        for (session, result) in results {
            match result {
                Ok(()) => info!("WM login {} success", session.network()),
                Err(e) => {
                    if let Err(disconnect) = session.disconnect().await {
                        debug!("WM disconnect {} after failure: {}", session.network(), disconnect);
                    }
                    lock(&self.failures).add(session.network(), e);
                }
            }
        }

        let active = self.active_sessions();
        info!("WM login end: {} sessions", active.len());
        if active.is_empty() {
            return Err(LoginError::Failed(None).into());
        }
        self.save_account().await;

        self.subaccounts(false).await?;
        if full_restore {
            if let Err(e) = self.sync_settings().await {
                warn!("WM sync settings failed: {}", e);
            }
        }
        self.warm_registry();
        Ok(())
    }

    async fn wallet_identifier(
        &self,
        session: &dyn WalletSession,
        request: &LoginRequest,
    ) -> Option<WalletIdentifier> {
        match (&request.credentials, &request.device, &request.master_xpub) {
            (Some(credentials), _, _) => session.wallet_identifier(credentials).await,
            (None, Some(_), Some(xpub)) => session.wallet_identifier_from_xpub(xpub).await,
            _ => None,
        }
    }

    async fn login_session(
        &self,
        session: &dyn WalletSession,
        request: &LoginRequest,
        full_restore: bool,
    ) -> Result<(), WalletError> {
        let network = session.network();
        if network.liquid() && request.device.as_ref().is_some_and(|d| !d.supports_liquid) {
            return Ok(());
        }
        let wallet_id = self
            .wallet_identifier(session, request)
            .await
            .ok_or(LoginError::Failed(Some("id_login_failed".into())))?;
        let wallet_hash_id = wallet_id.wallet_hash_id;
        let exist_datadir = session.exist_datadir(&wallet_hash_id).await;
        let is_prominent = network == self.prominent_network;
        // non-prominent networks are only restored on a full restore
        if !full_restore && !exist_datadir && !is_prominent {
            debug!("WM skip {}: no local state", network);
            return Ok(());
        }
        let remove_datadir = !exist_datadir && !is_prominent;

        let result = session
            .login_user(request.credentials.as_ref(), request.device.as_ref())
            .await?;
        if is_prominent {
            let mut account = lock(&self.account);
            account.xpub_hash_id = Some(result.xpub_hash_id);
            account.wallet_hash_id = Some(result.wallet_hash_id);
        }
        if session.is_logged() && (full_restore || !exist_datadir) {
            let funded = session.discovery().await?;
            info!("WM discovery {}: funded {}", network, funded);
            if !funded && remove_datadir {
                if let Err(e) = session.disconnect().await {
                    debug!("WM disconnect {}: {}", network, e);
                }
                session.remove_datadir(&wallet_hash_id).await;
                info!("WM removed empty datadir of {}", network);
            }
        }
        Ok(())
    }

    async fn login_lightning_session(
        &self,
        session: &dyn WalletSession,
        request: &LoginRequest,
        full_restore: bool,
        parent_id: Option<&WalletIdentifier>,
    ) -> Result<(), WalletError> {
        let Some(credentials) = request.lightning_credentials.as_ref() else {
            return Ok(());
        };
        let wallet_id = session.wallet_identifier(credentials).await;
        let wallet_hash_id = wallet_id.map(|id| id.wallet_hash_id);
        let mut exist_datadir = session
            .exist_datadir(wallet_hash_id.as_deref().unwrap_or_default())
            .await;
        if !exist_datadir {
            // nodes created before derived credentials are keyed by the parent wallet
            exist_datadir = session
                .exist_datadir(parent_id.map(|id| id.wallet_hash_id.as_str()).unwrap_or_default())
                .await;
        }
        if !full_restore && !exist_datadir {
            return Ok(());
        }
        let restore = full_restore || !exist_datadir;

        let result = session.login_user(Some(credentials), None).await?;
        lock(&self.account).lightning_wallet_hash_id = Some(result.wallet_hash_id);
        if session.is_logged() && restore {
            let funded = session.discovery().await?;
            info!("WM discovery {}: funded {}", session.network(), funded);
            if !funded {
                if session.is_restored_node().unwrap_or(false) {
                    return Ok(());
                }
                if let Err(e) = session.disconnect().await {
                    debug!("WM disconnect {}: {}", session.network(), e);
                }
                if let Some(wallet_hash_id) = wallet_hash_id {
                    session.remove_datadir(&wallet_hash_id).await;
                }
            }
        }
        Ok(())
    }

    /// Unlock with a PIN, then log in.
    ///
    /// A wrong PIN counts against the account; after [`MAX_PIN_ATTEMPTS`] the stored PIN payload is
    /// purged and the wallet needs its mnemonic again.
    pub async fn login_with_pin(
        &self,
        pin: &str,
        pin_data: &PinData,
        bip39_passphrase: Option<&str>,
    ) -> Result<(), WalletError> {
        let prominent = self.prominent_session()?;
        prominent.connect().await?;
        let account = self.account();
        let credentials = match prominent.decrypt_with_pin(pin, pin_data).await {
            Ok(credentials) => credentials,
            Err(e) if is_wrong_pin(&e) => {
                let attempts = self.pin_attempts(&account).await + 1;
                warn!("WM wrong pin, attempt {}", attempts);
                if attempts >= MAX_PIN_ATTEMPTS {
                    self.credential_store.remove(&account.pin_key()).await?;
                    self.credential_store.remove(&account.pin_attempts_key()).await?;
                    return Err(LoginError::Failed(Some("id_invalid_pin".into())).into());
                }
                self.credential_store
                    .set(&account.pin_attempts_key(), json!(attempts))
                    .await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        self.credential_store.remove(&account.pin_attempts_key()).await?;

        let credentials = match bip39_passphrase.filter(|p| !p.is_empty()) {
            Some(passphrase) => Credentials {
                mnemonic: credentials.mnemonic,
                ..Default::default()
            }
            .with_passphrase(passphrase),
            None => credentials,
        };
        self.login(&credentials).await
    }

    async fn pin_attempts(&self, account: &Account) -> u32 {
        match self.credential_store.get(&account.pin_attempts_key()).await {
            Ok(Some(value)) => value.as_u64().unwrap_or_default() as u32,
            Ok(None) => 0,
            Err(e) => {
                warn!("WM pin attempts unavailable: {}", e);
                0
            }
        }
    }

    /// Register a new wallet on the bitcoin singlesig network and log it in.
    pub async fn create(&self, credentials: &Credentials) -> Result<(), WalletError> {
        let network = if self.prominent_network.mainnet() {
            NetworkSecurityCase::BitcoinSS
        } else {
            NetworkSecurityCase::TestnetSS
        };
        let session = self.session(network).ok_or(WalletError::SessionNotFound(network))?;
        session.connect().await?;
        session.register(Some(credentials), None).await?;
        info!("WM registered {}", network);
        self.login_request(LoginRequest::software(credentials.clone()).with_full_restore())
            .await
    }

    /// Subaccounts of every logged in session, keeping previously loaded balances.
    pub async fn subaccounts(&self, refresh: bool) -> Result<Vec<WalletItem>, WalletError> {
        let active = self.active_sessions();
        let lists = join_all(active.iter().map(|s| s.subaccounts(refresh))).await;
        let mut fresh: Vec<WalletItem> = lists
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .sorted_by(WalletItem::display_cmp)
            .collect();

        let mut cached = lock(&self.subaccounts);
        for item in fresh.iter_mut() {
            let previous = cached
                .iter()
                .find(|p| p.network == item.network && p.pointer == item.pointer);
            item.satoshi = previous.and_then(|p| p.satoshi.clone());
            item.has_txs = previous.is_some_and(|p| p.has_txs);
        }
        *cached = fresh.clone();
        Ok(fresh)
    }

    /// Refresh every visible subaccount's balance and return the per-asset totals.
    pub async fn balances(&self) -> Result<HashMap<String, i64>, WalletError> {
        let visible: Vec<WalletItem> = lock(&self.subaccounts)
            .iter()
            .filter(|s| !s.hidden)
            .cloned()
            .collect();
        let fetched = join_all(visible.iter().map(|item| async move {
            let session = self
                .session(item.network)
                .ok_or(WalletError::SessionNotFound(item.network))?;
            session.get_balance(item.pointer, 0).await
        }))
        .await;

        let mut totals: HashMap<String, i64> = HashMap::new();
        let mut cached = lock(&self.subaccounts);
        for (item, balance) in visible.iter().zip(fetched) {
            let balance = balance?;
            for (asset, satoshi) in &balance {
                *totals.entry(asset.clone()).or_default() += satoshi;
            }
            if let Some(entry) = cached
                .iter_mut()
                .find(|c| c.network == item.network && c.pointer == item.pointer)
            {
                entry.satoshi = Some(balance);
            }
        }
        Ok(totals)
    }

    /// One page of transactions across `subaccounts`, newest first.
    pub async fn transactions(
        &self,
        subaccounts: &[WalletItem],
        first: usize,
    ) -> Result<Vec<Transaction>, WalletError> {
        let pages = join_all(subaccounts.iter().map(|item| async move {
            let session = self
                .session(item.network)
                .ok_or(WalletError::SessionNotFound(item.network))?;
            session.transactions(item.pointer, first).await
        }))
        .await;
        Ok(pages
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .sorted_by(Transaction::newest_first)
            .collect())
    }

    /// Selected subaccount, or the first visible one.
    pub fn current_subaccount(&self) -> Option<WalletItem> {
        let subaccounts = lock(&self.subaccounts);
        let selected = lock(&self.current_subaccount).clone();
        match selected {
            Some(id) => subaccounts.iter().find(|s| s.id() == id).cloned(),
            None => subaccounts.iter().find(|s| !s.hidden).cloned(),
        }
    }

    pub fn set_current_subaccount(&self, item: &WalletItem) {
        let mut subaccounts = lock(&self.subaccounts);
        if let Some(entry) = subaccounts
            .iter_mut()
            .find(|s| s.network == item.network && s.pointer == item.pointer)
        {
            *entry = item.clone();
        }
        *lock(&self.current_subaccount) = Some(item.id());
    }

    pub async fn pause(&self) {
        join_all(self.active_sessions().iter().map(|s| s.pause())).await;
    }

    pub async fn resume(&self) {
        join_all(self.active_sessions().iter().map(|s| s.resume())).await;
    }

    pub async fn disconnect(&self) {
        for session in self.sessions.values() {
            if let Err(e) = session.disconnect().await {
                debug!("WM disconnect {}: {}", session.network(), e);
            }
        }
    }

    /// Copy the settings of the multisig session (or the prominent one) into every other session.
    pub async fn sync_settings(&self) -> Result<(), WalletError> {
        use NetworkSecurityCase::*;
        let logged = |network| self.session(network).is_some_and(|s| s.is_logged());
        let mainnet = self.prominent_network.mainnet();
        let (bitcoin_ms, liquid_ms) = if mainnet { (BitcoinMS, LiquidMS) } else { (TestnetMS, TestnetLiquidMS) };
        let source = if logged(bitcoin_ms) {
            bitcoin_ms
        } else if logged(liquid_ms) {
            liquid_ms
        } else {
            self.prominent_network
        };
        let session = self.session(source).ok_or(WalletError::SessionNotFound(source))?;
        let Some(settings) = session.load_settings().await? else {
            return Ok(());
        };
        for session in self.active_sessions() {
            if let Err(e) = session.change_settings(settings.clone()).await {
                debug!("WM settings {}: {}", session.network(), e);
            }
            if let Err(e) = session.load_settings().await {
                debug!("WM reload settings {}: {}", session.network(), e);
            }
        }
        Ok(())
    }

    /// Refresh asset metadata on a background task. Errors are only logged.
    pub fn warm_registry(&self) -> JoinHandle<()> {
        let sessions = self.active_sessions();
        tokio::spawn(async move {
            for session in sessions {
                if let Err(e) = session.refresh_assets().await {
                    warn!("WM registry refresh {} failed: {}", session.network(), e);
                }
            }
        })
    }

    async fn save_account(&self) {
        let account = self.account();
        if let Err(e) = self.account_store.upsert(&account).await {
            warn!("WM account {} not saved: {}", account.id, e);
        }
    }
}

fn is_wrong_pin(error: &WalletError) -> bool {
    let message = error.message();
    message.contains("id_invalid_pin") || message.contains("login failed")
}
