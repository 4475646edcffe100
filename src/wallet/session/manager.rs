//! Engine-backed network session.
//!
//! `SessionManager` owns one engine session for one bitcoin or liquid network. It mirrors the
//! engine's connection state in `connected`/`logged`/`paused`, caches settings and two-factor
//! configuration, and routes every call object through the [`ResolverManager`].
//!
//! Connect, disconnect and datadir removal go through the shared [`ReconnectionQueue`]; reads do
//! not. Engine notifications arrive on the engine's own thread and are converted into
//! [`SessionEvent`]s on the session's [`EventBus`]. A network-connected notification after a
//! disconnect triggers a hidden re-login, retried with backoff.

use crate::engine::{EngineSession, TwoFactorCall, TwoFactorConfig, WalletEngine, run_blocking};
use crate::wallet::credentials::{Credentials, HwDevice, LoginUserResult, PinData, WalletIdentifier};
use crate::wallet::item::WalletItem;
use crate::wallet::network::NetworkSecurityCase;
use crate::wallet::session::WalletSession;
use crate::wallet::session::config::SessionConfig;
use crate::wallet::session::datadir::{DatadirRepository, FileDatadirRepository};
use crate::wallet::session::events::{EventBus, SessionEvent, convert_engine_notification};
use crate::wallet::session::reconnection::{ReconnectionQueue, retry_reconnect};
use crate::wallet::session::resolver::{HwResolver, ResolverContext, ResolverManager, TwoFactorPrompt};
use crate::wallet::transaction::{SendTransactionSuccess, TRANSACTIONS_PAGE, Transaction};
use crate::wallet::types::{LoginError, TwoFactorError, WalletError};

use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connection flags shared with the resolver's connection probe.
#[derive(Debug, Default)]
pub(crate) struct ConnectionState {
    pub connected: AtomicBool,
    pub logged: AtomicBool,
    pub paused: AtomicBool,
    pub reconnecting: AtomicBool,
    pub block_height: AtomicU32,
}

impl ConnectionState {
    pub fn reset(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.logged.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Usable for engine calls that need the network. Login call objects run before `logged` is
    /// set, so only the connection counts. The hidden re-login runs while still paused.
    pub fn ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
            && (!self.paused.load(Ordering::SeqCst) || self.reconnecting.load(Ordering::SeqCst))
    }
}

fn connection_failed(e: impl std::fmt::Display) -> WalletError {
    LoginError::ConnectionFailed(Some(e.to_string())).into()
}

/// Single network session against the wallet engine.
pub struct SessionManager {
    network: NetworkSecurityCase,
    engine: Arc<dyn WalletEngine>,
    session: Mutex<Option<Arc<dyn EngineSession>>>,
    runtime: Mutex<Option<Handle>>,
    config: Arc<SessionConfig>,
    queue: ReconnectionQueue,
    datadir: Arc<dyn DatadirRepository>,
    resolver: ResolverContext,
    state: Arc<ConnectionState>,
    settings: Mutex<Option<Value>>,
    two_factor_config: Mutex<Option<TwoFactorConfig>>,
    login_data: Mutex<Option<LoginUserResult>>,
    connection_warnings: Mutex<Vec<String>>,
    events: EventBus,
    me: Weak<SessionManager>,
}

impl SessionManager {
    pub fn new(
        network: NetworkSecurityCase,
        engine: Arc<dyn WalletEngine>,
        config: Arc<SessionConfig>,
        queue: ReconnectionQueue,
    ) -> Arc<Self> {
        Self::with_resolvers(network, engine, config, queue, None, None)
    }

    /// Session whose call objects can prompt the user and talk to a hardware wallet.
    pub fn with_resolvers(
        network: NetworkSecurityCase,
        engine: Arc<dyn WalletEngine>,
        config: Arc<SessionConfig>,
        queue: ReconnectionQueue,
        prompt: Option<Arc<dyn TwoFactorPrompt>>,
        hw: Option<Arc<dyn HwResolver>>,
    ) -> Arc<Self> {
        let state = Arc::new(ConnectionState::default());
        let probe_state = state.clone();
        let mut resolver = ResolverContext::new(network, config.resolver.clone())
            .with_connection_probe(Arc::new(move || probe_state.ready()));
        resolver.prompt = prompt;
        resolver.hw = hw;

        Arc::new_cyclic(|me| Self {
            network,
            engine,
            session: Mutex::new(None),
            runtime: Mutex::new(None),
            datadir: Arc::new(FileDatadirRepository::new(config.state_dir())),
            config,
            queue,
            resolver,
            state,
            settings: Mutex::new(None),
            two_factor_config: Mutex::new(None),
            login_data: Mutex::new(None),
            connection_warnings: Mutex::new(Vec::new()),
            events: EventBus::new(),
            me: me.clone(),
        })
    }

    pub fn two_factor_config(&self) -> Option<TwoFactorConfig> {
        lock(&self.two_factor_config).clone()
    }

    /// Problems reported while connecting, such as an unreachable personal electrum server.
    pub fn connection_warnings(&self) -> Vec<String> {
        lock(&self.connection_warnings).clone()
    }

    /// Current engine session, created on first use.
    fn engine_session(&self) -> Result<Arc<dyn EngineSession>, WalletError> {
        let mut guard = lock(&self.session);
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }
        let session = self.engine.create_session()?;
        if let Ok(handle) = Handle::try_current() {
            *lock(&self.runtime) = Some(handle);
        }
        let me = self.me.clone();
        session.set_notification_handler(Box::new(move |notification| {
            if let Some(manager) = me.upgrade() {
                manager.handle_notification(&notification);
            }
        }));
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn resolve(&self, call: Arc<dyn TwoFactorCall>) -> Result<Option<Value>, WalletError> {
        ResolverManager::new(call, self.resolver.clone()).run().await
    }

    /// Run an engine call that returns a call object and resolve it.
    async fn call_resolved<F>(&self, f: F) -> Result<Value, WalletError>
    where
        F: FnOnce(&dyn EngineSession) -> Result<Arc<dyn TwoFactorCall>, crate::engine::EngineError>
            + Send
            + 'static,
    {
        let session = self.engine_session()?;
        let call = run_blocking(move || f(session.as_ref())).await?;
        Ok(self.resolve(call).await?.unwrap_or_else(|| json!({})))
    }

    fn parse_item(&self, mut value: Value) -> Result<WalletItem, WalletError> {
        if let Some(map) = value.as_object_mut() {
            map.insert("network".into(), json!(self.network.network()));
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn update_subaccount(&self, pointer: u32, hidden: bool) -> Result<(), WalletError> {
        let session = self.engine_session()?;
        let details = json!({ "subaccount": pointer, "hidden": hidden });
        run_blocking(move || session.update_subaccount(&details)).await?;
        Ok(())
    }

    pub async fn load_two_factor_config(&self) -> Result<Option<TwoFactorConfig>, WalletError> {
        let session = self.engine_session()?;
        let raw = run_blocking(move || session.get_two_factor_config()).await?;
        let config: TwoFactorConfig = serde_json::from_value(raw)?;
        *lock(&self.two_factor_config) = Some(config.clone());
        Ok(Some(config))
    }

    async fn on_login(&self, data: &LoginUserResult) {
        self.state.logged.store(true, Ordering::SeqCst);
        *lock(&self.login_data) = Some(data.clone());
        if self.network.multisig() {
            if let Err(e) = self.load_two_factor_config().await {
                warn!("{} two-factor config unavailable: {}", self.network, e);
            }
        }
    }

    /// Hidden re-login after the engine regained its connection.
    pub async fn reconnect(&self) -> Result<(), WalletError> {
        self.state.reconnecting.store(true, Ordering::SeqCst);
        let result = retry_reconnect(&self.config.reconnect, || async {
            self.call_resolved(|s| s.login_user(&json!({})))
                .await
                .map_err(|e| match e {
                    WalletError::Engine(inner) => connection_failed(inner),
                    timeout @ WalletError::TwoFactor(TwoFactorError::ConnectionTimeout) => connection_failed(timeout),
                    other => other,
                })?;
            Ok(())
        })
        .await;
        self.state.reconnecting.store(false, Ordering::SeqCst);
        result?;
        self.state.paused.store(false, Ordering::SeqCst);
        info!("{} reconnected", self.network);
        Ok(())
    }

    async fn send_hint(&self, hint: &'static str) {
        let Ok(session) = self.engine_session() else {
            return;
        };
        self.queue
            .run(&format!("hint {} {}", hint, self.network), || async move {
                let details = json!({ "tor_hint": hint, "hint": hint });
                if let Err(e) = run_blocking(move || session.reconnect_hint(&details)).await {
                    debug!("reconnect hint failed: {}", e);
                }
            })
            .await;
    }

    fn handle_notification(&self, notification: &Value) {
        for event in convert_engine_notification(self.network, notification) {
            match &event {
                SessionEvent::Block { height, .. } => {
                    self.state.block_height.store(*height, Ordering::SeqCst);
                    if self.state.paused.load(Ordering::SeqCst) {
                        continue;
                    }
                }
                SessionEvent::Settings { settings, .. } => {
                    *lock(&self.settings) = Some(settings.clone());
                }
                SessionEvent::TwoFactorReset { .. } => {
                    self.spawn(|manager| async move {
                        if let Err(e) = manager.load_two_factor_config().await {
                            warn!("{} two-factor reload failed: {}", manager.network, e);
                        }
                    });
                }
                SessionEvent::Network { connected, .. } => {
                    let logged = self.state.logged.load(Ordering::SeqCst);
                    if !logged
                        && !*connected
                        && self.network.singlesig()
                        && self.config.electrum_urls.contains_key(&self.network)
                    {
                        lock(&self.connection_warnings).push(format!(
                            "Your Personal Electrum Server for {} can't be reached",
                            self.network.chain()
                        ));
                        continue;
                    }
                    if !(self.state.connected.load(Ordering::SeqCst) && logged) {
                        continue;
                    }
                    if !*connected {
                        self.state.paused.store(true, Ordering::SeqCst);
                    } else {
                        let event = event.clone();
                        self.spawn(|manager| async move {
                            match manager.reconnect().await {
                                Ok(()) => manager.events.publish(event),
                                Err(e) => warn!("{} reconnect failed: {}", manager.network, e),
                            }
                        });
                        continue;
                    }
                }
                _ => {}
            }
            self.events.publish(event);
        }
    }

    fn spawn<F, Fut>(&self, task: F)
    where
        F: FnOnce(Arc<SessionManager>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (Some(manager), Some(handle)) = (self.me.upgrade(), lock(&self.runtime).clone()) else {
            return;
        };
        handle.spawn(task(manager));
    }
}

#[async_trait::async_trait]
impl WalletSession for SessionManager {
    fn network(&self) -> NetworkSecurityCase {
        self.network
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    fn is_logged(&self) -> bool {
        self.state.logged.load(Ordering::SeqCst)
    }

    fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    fn block_height(&self) -> u32 {
        self.state.block_height.load(Ordering::SeqCst)
    }

    fn login_data(&self) -> Option<LoginUserResult> {
        lock(&self.login_data).clone()
    }

    fn events(&self) -> EventBus {
        self.events.clone()
    }

    async fn connect(&self) -> Result<(), WalletError> {
        if self.is_connected() {
            return Ok(());
        }
        if self.config.use_tor {
            self.resume().await;
        }
        let params = self.config.network_params(self.network);
        self.queue
            .run(&format!("connect {}", self.network), || async {
                if self.is_connected() {
                    return Ok(());
                }
                lock(&self.connection_warnings).clear();
                self.state.paused.store(false, Ordering::SeqCst);
                let session = self.engine_session()?;
                run_blocking(move || session.connect(&params))
                    .await
                    .map_err(connection_failed)?;
                self.state.connected.store(true, Ordering::SeqCst);
                info!("{} connected", self.network);
                Ok(())
            })
            .await
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.queue
            .run(&format!("disconnect {}", self.network), || async {
                self.state.reset();
                *lock(&self.login_data) = None;
                let session = lock(&self.session).take();
                if let Some(session) = session {
                    if let Err(e) = run_blocking(move || session.disconnect()).await {
                        warn!("{} disconnect: {}", self.network, e);
                    }
                }
            })
            .await;
        info!("{} disconnected", self.network);
        Ok(())
    }

    async fn wallet_identifier(&self, credentials: &Credentials) -> Option<WalletIdentifier> {
        let details = credentials.to_details().ok()?;
        let session = self.engine_session().ok()?;
        let params = self.config.network_params(self.network);
        match run_blocking(move || session.get_wallet_identifier(&params, &details)).await {
            Ok(raw) => serde_json::from_value(raw).ok(),
            Err(e) => {
                warn!("{} wallet identifier: {}", self.network, e);
                None
            }
        }
    }

    async fn wallet_identifier_from_xpub(&self, master_xpub: &str) -> Option<WalletIdentifier> {
        let details = json!({ "master_xpub": master_xpub });
        let session = self.engine_session().ok()?;
        let params = self.config.network_params(self.network);
        run_blocking(move || session.get_wallet_identifier(&params, &details))
            .await
            .ok()
            .and_then(|raw| serde_json::from_value(raw).ok())
    }

    async fn exist_datadir(&self, wallet_hash_id: &str) -> bool {
        // multisig state lives on the server
        if self.network.multisig() {
            return true;
        }
        match self.datadir.exists(wallet_hash_id).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("{} datadir check: {}", self.network, e);
                false
            }
        }
    }

    async fn remove_datadir(&self, wallet_hash_id: &str) {
        let datadir = self.datadir.clone();
        self.queue
            .run(&format!("remove datadir {}", self.network), || async move {
                if let Err(e) = datadir.remove(wallet_hash_id).await {
                    warn!("datadir removal failed: {}", e);
                }
            })
            .await;
    }

    async fn register(
        &self,
        credentials: Option<&Credentials>,
        hw: Option<&HwDevice>,
    ) -> Result<(), WalletError> {
        self.connect().await?;
        let details = login_details(credentials, hw)?;
        self.call_resolved(move |s| s.register_user(&details)).await?;
        info!("{} registered", self.network);
        Ok(())
    }

    async fn login_user(
        &self,
        credentials: Option<&Credentials>,
        hw: Option<&HwDevice>,
    ) -> Result<LoginUserResult, WalletError> {
        self.connect().await?;
        let details = login_details(credentials, hw)?;
        info!("{} login", self.network);
        let result = self.call_resolved(move |s| s.login_user(&details)).await?;
        let data: LoginUserResult = serde_json::from_value(result)?;
        self.on_login(&data).await;
        info!("{} logged in", self.network);
        Ok(data)
    }

    async fn decrypt_with_pin(&self, pin: &str, pin_data: &PinData) -> Result<Credentials, WalletError> {
        self.connect().await?;
        let details = Credentials::from_pin(pin, pin_data.clone()).to_details()?;
        let result = self.call_resolved(move |s| s.decrypt_with_pin(&details)).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn discovery(&self) -> Result<bool, WalletError> {
        let discovered: Result<bool, WalletError> = async {
            let subaccounts = self.subaccounts(true).await?;
            if let Some(first) = subaccounts.iter().find(|s| s.pointer == 0) {
                if first.kind.singlesig() && !first.bip44_discovered() {
                    self.update_subaccount(0, true).await?;
                }
            }
            Ok(subaccounts.iter().any(WalletItem::bip44_discovered))
        }
        .await;
        discovered.map_err(connection_failed)
    }

    async fn subaccounts(&self, refresh: bool) -> Result<Vec<WalletItem>, WalletError> {
        let details = json!({ "refresh": refresh });
        let result = self.call_resolved(move |s| s.get_subaccounts(&details)).await?;
        let list = result
            .get("subaccounts")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        list.into_iter().map(|item| self.parse_item(item)).collect()
    }

    async fn subaccount(&self, pointer: u32) -> Result<WalletItem, WalletError> {
        let result = self.call_resolved(move |s| s.get_subaccount(pointer)).await?;
        self.parse_item(result)
    }

    async fn get_balance(&self, pointer: u32, num_confs: u32) -> Result<HashMap<String, i64>, WalletError> {
        let details = json!({ "subaccount": pointer, "num_confs": num_confs });
        let result = self.call_resolved(move |s| s.get_balance(&details)).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn transactions(&self, pointer: u32, first: usize) -> Result<Vec<Transaction>, WalletError> {
        let details = json!({ "subaccount": pointer, "first": first, "count": TRANSACTIONS_PAGE });
        let result = self.call_resolved(move |s| s.get_transactions(&details)).await?;
        let list = result
            .get("transactions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(list
            .into_iter()
            .map(Transaction::from_value)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn create_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError> {
        let details = tx.to_value()?;
        let result = self.call_resolved(move |s| s.create_transaction(&details)).await?;
        Ok(Transaction::from_value(result)?)
    }

    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError> {
        let details = tx.to_value()?;
        let result = self.call_resolved(move |s| s.sign_transaction(&details)).await?;
        Ok(Transaction::from_value(result)?)
    }

    async fn send_transaction(&self, tx: Transaction) -> Result<SendTransactionSuccess, WalletError> {
        let details = tx.to_value()?;
        let result = self.call_resolved(move |s| s.send_transaction(&details)).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn broadcast_transaction(&self, tx_hex: &str) -> Result<SendTransactionSuccess, WalletError> {
        let session = self.engine_session()?;
        let tx_hex = tx_hex.to_string();
        let txhash = run_blocking(move || session.broadcast_transaction(&tx_hex)).await?;
        Ok(SendTransactionSuccess {
            txhash: Some(txhash),
            ..Default::default()
        })
    }

    async fn pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
        self.send_hint("disconnect").await;
    }

    async fn resume(&self) {
        self.send_hint("connect").await;
    }

    fn settings(&self) -> Option<Value> {
        lock(&self.settings).clone()
    }

    async fn load_settings(&self) -> Result<Option<Value>, WalletError> {
        let session = self.engine_session()?;
        let settings = run_blocking(move || session.get_settings()).await?;
        *lock(&self.settings) = Some(settings.clone());
        Ok(Some(settings))
    }

    async fn change_settings(&self, settings: Value) -> Result<(), WalletError> {
        let details = settings.clone();
        self.call_resolved(move |s| s.change_settings(&details)).await?;
        *lock(&self.settings) = Some(settings);
        Ok(())
    }

    async fn refresh_assets(&self) -> Result<(), WalletError> {
        let session = self.engine_session()?;
        let details = json!({ "icons": true, "assets": true, "refresh": true });
        run_blocking(move || session.refresh_assets(&details)).await?;
        debug!("{} registry refreshed", self.network);
        Ok(())
    }
}

fn login_details(credentials: Option<&Credentials>, hw: Option<&HwDevice>) -> Result<Value, WalletError> {
    match (credentials, hw) {
        (Some(credentials), _) => Ok(credentials.to_details()?),
        (None, Some(hw)) => Ok(hw.to_details()),
        (None, None) => Err(LoginError::Failed(Some("No login method specified".into())).into()),
    }
}
