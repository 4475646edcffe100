#![allow(dead_code)]

use green_wallet_sessions::engine::*;
use green_wallet_sessions::wallet::credentials::{
    Credentials, HwDevice, LoginUserResult, PinData, WalletIdentifier,
};
use green_wallet_sessions::wallet::item::{SubaccountType, WalletItem};
use green_wallet_sessions::wallet::network::NetworkSecurityCase;
use green_wallet_sessions::wallet::session::{EventBus, WalletSession};
use green_wallet_sessions::wallet::transaction::{SendTransactionSuccess, Transaction};
use green_wallet_sessions::wallet::types::{LoginError, TwoFactorError, WalletError};

use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WALLET_HASH_ID: &str = "abc";
pub const XPUB_HASH_ID: &str = "xpubabc";
pub const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub fn credentials() -> Credentials {
    Credentials::from_mnemonic(MNEMONIC)
}

pub fn pin_data() -> PinData {
    PinData {
        encrypted_data: "ciphertext".into(),
        pin_identifier: "pin-id".into(),
        salt: "salt".into(),
    }
}

// ---------------------------------------------------------------------------
// Engine fakes
// ---------------------------------------------------------------------------

/// Call object replaying a list of statuses and recording what it was sent.
pub struct ScriptedCall {
    statuses: Mutex<VecDeque<Value>>,
    pub sent: Mutex<Vec<String>>,
}

impl ScriptedCall {
    pub fn new(statuses: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.into()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn done(result: Value) -> Arc<Self> {
        Self::new(vec![json!({ "status": "done", "result": result })])
    }

    pub fn error(error: &str) -> Arc<Self> {
        Self::new(vec![json!({ "status": "error", "error": error })])
    }

    fn advance(&self, action: String) {
        self.sent.lock().unwrap().push(action);
    }
}

impl TwoFactorCall for ScriptedCall {
    fn get_status(&self) -> Result<Value, EngineError> {
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| EngineError::Generic("script exhausted".into()))
    }

    fn call(&self) -> Result<(), EngineError> {
        self.advance("call".into());
        Ok(())
    }

    fn request_code(&self, method: &str) -> Result<(), EngineError> {
        self.advance(format!("request:{}", method));
        Ok(())
    }

    fn resolve_code(&self, code: &str) -> Result<(), EngineError> {
        self.advance(format!("code:{}", code));
        Ok(())
    }
}

/// Shared state of every session a [`FakeEngine`] hands out.
#[derive(Default)]
pub struct EngineState {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub connect_error: Mutex<Option<String>>,
    /// Status scripts for the next `login_user` calls; `done` when empty.
    pub login_scripts: Mutex<VecDeque<Vec<Value>>>,
    pub subaccounts: Mutex<Vec<Value>>,
    pub updates: Mutex<Vec<Value>>,
    pub hints: Mutex<Vec<Value>>,
    pub correct_pin: Mutex<Option<String>>,
    pub two_factor_config: Mutex<Value>,
    pub handlers: Mutex<Vec<Arc<NotificationHandler>>>,
}

pub struct FakeEngine {
    pub state: Arc<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        let state = EngineState::default();
        *state.two_factor_config.lock().unwrap() = json!({
            "enabled_methods": ["email"],
            "all_methods": ["email", "sms", "gauth"],
            "any_enabled": true
        });
        Arc::new(Self {
            state: Arc::new(state),
        })
    }

    /// Deliver a raw notification to every session created so far.
    pub fn notify(&self, notification: Value) {
        let handlers = self.state.handlers.lock().unwrap().clone();
        for handler in handlers {
            handler(notification.clone());
        }
    }
}

impl WalletEngine for FakeEngine {
    fn create_session(&self) -> Result<Arc<dyn EngineSession>, EngineError> {
        Ok(Arc::new(FakeEngineSession {
            state: self.state.clone(),
        }))
    }
}

pub struct FakeEngineSession {
    state: Arc<EngineState>,
}

fn identity() -> Value {
    json!({ "wallet_hash_id": WALLET_HASH_ID, "xpub_hash_id": XPUB_HASH_ID })
}

impl EngineSession for FakeEngineSession {
    fn connect(&self, _params: &NetworkParams) -> Result<(), EngineError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        match self.state.connect_error.lock().unwrap().clone() {
            Some(error) => Err(EngineError::Generic(error)),
            None => Ok(()),
        }
    }

    fn disconnect(&self) -> Result<(), EngineError> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reconnect_hint(&self, hint: &Value) -> Result<(), EngineError> {
        self.state.hints.lock().unwrap().push(hint.clone());
        Ok(())
    }

    fn get_wallet_identifier(&self, _params: &NetworkParams, _details: &Value) -> Result<Value, EngineError> {
        Ok(identity())
    }

    fn register_user(&self, _details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError> {
        Ok(ScriptedCall::done(json!({})))
    }

    fn login_user(&self, _details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError> {
        let script = self.state.login_scripts.lock().unwrap().pop_front();
        Ok(match script {
            Some(statuses) => ScriptedCall::new(statuses),
            None => ScriptedCall::done(identity()),
        })
    }

    fn decrypt_with_pin(&self, details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError> {
        let expected = self.state.correct_pin.lock().unwrap().clone();
        Ok(match (details["pin"].as_str(), expected) {
            (Some(pin), Some(expected)) if pin == expected => ScriptedCall::done(json!({ "mnemonic": MNEMONIC })),
            _ => ScriptedCall::error("id_invalid_pin"),
        })
    }

    fn get_subaccounts(&self, _details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError> {
        let subaccounts = self.state.subaccounts.lock().unwrap().clone();
        Ok(ScriptedCall::done(json!({ "subaccounts": subaccounts })))
    }

    fn get_subaccount(&self, pointer: u32) -> Result<Arc<dyn TwoFactorCall>, EngineError> {
        let subaccounts = self.state.subaccounts.lock().unwrap().clone();
        let found = subaccounts
            .into_iter()
            .find(|s| s["pointer"] == json!(pointer))
            .ok_or_else(|| EngineError::Generic("id_subaccount_not_found".into()))?;
        Ok(ScriptedCall::done(found))
    }

    fn update_subaccount(&self, details: &Value) -> Result<(), EngineError> {
        self.state.updates.lock().unwrap().push(details.clone());
        Ok(())
    }

    fn get_balance(&self, _details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError> {
        Ok(ScriptedCall::done(json!({ "btc": 1500 })))
    }

    fn get_transactions(&self, details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError> {
        let first = details["first"].as_u64().unwrap_or_default();
        Ok(ScriptedCall::done(json!({
            "transactions": [
                { "txhash": format!("tx{}", first), "created_at_ts": 10, "type": "incoming", "satoshi": { "btc": 1000 } }
            ]
        })))
    }

    fn create_transaction(&self, details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError> {
        let mut tx = details.clone();
        tx["fee"] = json!(141);
        Ok(ScriptedCall::done(tx))
    }

    fn sign_transaction(&self, details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError> {
        let mut tx = details.clone();
        tx["signed_transaction"] = json!("0200");
        Ok(ScriptedCall::done(tx))
    }

    fn send_transaction(&self, _details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError> {
        Ok(ScriptedCall::done(json!({ "txhash": "ff00" })))
    }

    fn broadcast_transaction(&self, _tx_hex: &str) -> Result<String, EngineError> {
        Ok("ff01".into())
    }

    fn get_two_factor_config(&self) -> Result<Value, EngineError> {
        Ok(self.state.two_factor_config.lock().unwrap().clone())
    }

    fn get_settings(&self) -> Result<Value, EngineError> {
        Ok(json!({ "unit": "BTC" }))
    }

    fn change_settings(&self, _details: &Value) -> Result<Arc<dyn TwoFactorCall>, EngineError> {
        Ok(ScriptedCall::done(json!({})))
    }

    fn refresh_assets(&self, _details: &Value) -> Result<(), EngineError> {
        Ok(())
    }

    fn set_notification_handler(&self, handler: NotificationHandler) {
        self.state.handlers.lock().unwrap().push(Arc::new(handler));
    }
}

// ---------------------------------------------------------------------------
// Lightning fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct NodeState {
    pub balance_sat: Mutex<u64>,
    pub inputs: Mutex<HashMap<String, InputType>>,
    pub payments: Mutex<Vec<Payment>>,
    pub refundables: Mutex<Vec<SwapInfo>>,
    pub reverse_swaps: Mutex<Vec<ReverseSwapInfo>>,
    pub swap_in_progress: Mutex<Option<SwapInfo>>,
    /// `connect` with credential checking fails, as for a node that does not exist yet.
    pub reject_credential_check: AtomicBool,
    pub connects: Mutex<Vec<bool>>,
    pub stopped: AtomicBool,
    pub working_dirs: Mutex<Vec<PathBuf>>,
    pub send_error: Mutex<Option<String>>,
    pub lnurl_result: Mutex<Option<LnUrlPayResult>>,
    pub sent: Mutex<Vec<(String, Option<u64>)>>,
    pub handler: Mutex<Option<Arc<NodeEventHandler>>>,
}

pub struct FakeNodeFactory {
    pub state: Arc<NodeState>,
}

impl FakeNodeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(NodeState::default()),
        })
    }

    pub fn emit(&self, event: NodeEvent) {
        let handler = self.state.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }
}

impl LightningNodeFactory for FakeNodeFactory {
    fn create_node(&self, working_dir: &Path, _testnet: bool) -> Result<Arc<dyn LightningNode>, EngineError> {
        self.state.working_dirs.lock().unwrap().push(working_dir.to_path_buf());
        std::fs::create_dir_all(working_dir).map_err(|e| EngineError::Generic(e.to_string()))?;
        Ok(Arc::new(FakeNode {
            state: self.state.clone(),
        }))
    }
}

pub struct FakeNode {
    state: Arc<NodeState>,
}

impl LightningNode for FakeNode {
    fn connect(&self, _mnemonic: &str, check_credentials: bool) -> Result<(), EngineError> {
        self.state.connects.lock().unwrap().push(check_credentials);
        if check_credentials && self.state.reject_credential_check.load(Ordering::SeqCst) {
            return Err(EngineError::Generic("node not found".into()));
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), EngineError> {
        self.state.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn credentials(&self) -> Option<Value> {
        Some(json!({ "device_key": "k", "device_cert": "c" }))
    }

    fn balance_sat(&self) -> Result<u64, EngineError> {
        Ok(*self.state.balance_sat.lock().unwrap())
    }

    fn parse_input(&self, input: &str) -> Result<InputType, EngineError> {
        self.state
            .inputs
            .lock()
            .unwrap()
            .get(input)
            .cloned()
            .ok_or_else(|| EngineError::Generic("unrecognized input".into()))
    }

    fn send_payment(&self, bolt11: &str, amount_sat: Option<u64>) -> Result<Payment, EngineError> {
        if let Some(error) = self.state.send_error.lock().unwrap().clone() {
            return Err(EngineError::Generic(error));
        }
        self.state.sent.lock().unwrap().push((bolt11.to_string(), amount_sat));
        Ok(payment("paid", PaymentType::Sent, 1_700_000_500, 10_000))
    }

    fn pay_lnurl(&self, _data: &LnUrlPayRequestData, amount_sat: u64, _comment: &str) -> Result<LnUrlPayResult, EngineError> {
        self.state.sent.lock().unwrap().push(("lnurl".into(), Some(amount_sat)));
        Ok(self
            .state
            .lnurl_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(LnUrlPayResult::EndpointSuccess {
                payment: payment("lnurl-paid", PaymentType::Sent, 1_700_000_600, amount_sat * 1000),
            }))
    }

    fn list_payments(&self) -> Result<Vec<Payment>, EngineError> {
        Ok(self.state.payments.lock().unwrap().clone())
    }

    fn list_refundables(&self) -> Result<Vec<SwapInfo>, EngineError> {
        Ok(self.state.refundables.lock().unwrap().clone())
    }

    fn list_reverse_swaps(&self) -> Result<Vec<ReverseSwapInfo>, EngineError> {
        Ok(self.state.reverse_swaps.lock().unwrap().clone())
    }

    fn swap_progress(&self) -> Result<Option<SwapInfo>, EngineError> {
        Ok(self.state.swap_in_progress.lock().unwrap().clone())
    }

    fn set_event_handler(&self, handler: NodeEventHandler) {
        *self.state.handler.lock().unwrap() = Some(Arc::new(handler));
    }
}

pub fn payment(id: &str, payment_type: PaymentType, time: i64, amount_msat: u64) -> Payment {
    Payment {
        id: id.into(),
        payment_type,
        payment_time: time,
        amount_msat,
        fee_msat: 0,
        status: PaymentStatus::Complete,
        description: None,
        payment_hash: Some(format!("hash-{}", id)),
        bolt11: None,
    }
}

pub fn swap(address: &str, created_at: i64, sats: u64) -> SwapInfo {
    SwapInfo {
        bitcoin_address: address.into(),
        created_at,
        paid_msat: 0,
        confirmed_sats: sats,
        unconfirmed_sats: 0,
        lock_height: None,
    }
}

pub fn invoice(bolt11: &str, amount_msat: Option<u64>, expired: bool) -> LnInvoice {
    let now = chrono::Utc::now().timestamp() as u64;
    LnInvoice {
        bolt11: bolt11.into(),
        payment_hash: format!("hash-{}", bolt11),
        description: Some("coffee".into()),
        amount_msat,
        timestamp: if expired { now - 7200 } else { now },
        expiry: 3600,
    }
}

// ---------------------------------------------------------------------------
// Session fake for the orchestrator
// ---------------------------------------------------------------------------

/// Scriptable stand-in for a network session.
pub struct FakeSession {
    network: NetworkSecurityCase,
    fail_with: Option<String>,
    datadirs: Mutex<HashSet<String>>,
    funded: bool,
    discovery_error: Option<String>,
    restored_node: Option<bool>,
    login_delay: Option<Duration>,
    logged: AtomicBool,
    connected: AtomicBool,
    paused: AtomicBool,
    pub login_calls: AtomicUsize,
    pub discovery_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
    pub removed: Mutex<Vec<String>>,
    pub settings: Mutex<Option<Value>>,
    pub subaccounts: Mutex<Vec<WalletItem>>,
    pub balance: Mutex<HashMap<String, i64>>,
    pub transactions: Mutex<Vec<Transaction>>,
    pub correct_pin: Option<String>,
    events: EventBus,
}

impl FakeSession {
    pub fn new(network: NetworkSecurityCase) -> Self {
        let kind = if network.lightning() {
            SubaccountType::Lightning
        } else if network.multisig() {
            SubaccountType::Standard
        } else {
            SubaccountType::SegWit
        };
        Self {
            network,
            fail_with: None,
            datadirs: Mutex::new(HashSet::new()),
            funded: false,
            discovery_error: None,
            restored_node: None,
            login_delay: None,
            logged: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            login_calls: AtomicUsize::new(0),
            discovery_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            removed: Mutex::new(Vec::new()),
            settings: Mutex::new(None),
            subaccounts: Mutex::new(vec![WalletItem::new("", 0, kind, network)]),
            balance: Mutex::new(HashMap::from([(network.policy_asset().to_string(), 1000)])),
            transactions: Mutex::new(Vec::new()),
            correct_pin: None,
            events: EventBus::new(),
        }
    }

    pub fn failing(mut self, error: &str) -> Self {
        self.fail_with = Some(error.into());
        self
    }

    pub fn with_datadir(self) -> Self {
        self.datadirs.lock().unwrap().insert(WALLET_HASH_ID.into());
        self
    }

    pub fn funded(mut self) -> Self {
        self.funded = true;
        self
    }

    /// Discovery fails with a connection error after a successful login.
    pub fn failing_discovery(mut self, error: &str) -> Self {
        self.discovery_error = Some(error.into());
        self
    }

    pub fn restored_node(mut self, restored: bool) -> Self {
        self.restored_node = Some(restored);
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.login_delay = Some(delay);
        self
    }

    pub fn with_pin(mut self, pin: &str) -> Self {
        self.correct_pin = Some(pin.into());
        self
    }

    pub fn with_settings(self, settings: Value) -> Self {
        *self.settings.lock().unwrap() = Some(settings);
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn login_count(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn has_datadir(&self) -> bool {
        self.datadirs.lock().unwrap().contains(WALLET_HASH_ID)
    }
}

#[async_trait::async_trait]
impl WalletSession for FakeSession {
    fn network(&self) -> NetworkSecurityCase {
        self.network
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_logged(&self) -> bool {
        self.logged.load(Ordering::SeqCst)
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn block_height(&self) -> u32 {
        0
    }

    fn login_data(&self) -> Option<LoginUserResult> {
        self.is_logged().then(|| LoginUserResult {
            xpub_hash_id: XPUB_HASH_ID.into(),
            wallet_hash_id: WALLET_HASH_ID.into(),
        })
    }

    fn events(&self) -> EventBus {
        self.events.clone()
    }

    fn is_restored_node(&self) -> Option<bool> {
        self.restored_node
    }

    async fn connect(&self) -> Result<(), WalletError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.logged.store(false, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn wallet_identifier(&self, _credentials: &Credentials) -> Option<WalletIdentifier> {
        Some(WalletIdentifier {
            wallet_hash_id: WALLET_HASH_ID.into(),
            xpub_hash_id: XPUB_HASH_ID.into(),
        })
    }

    async fn wallet_identifier_from_xpub(&self, _master_xpub: &str) -> Option<WalletIdentifier> {
        self.wallet_identifier(&Credentials::default()).await
    }

    async fn exist_datadir(&self, wallet_hash_id: &str) -> bool {
        self.datadirs.lock().unwrap().contains(wallet_hash_id)
    }

    async fn remove_datadir(&self, wallet_hash_id: &str) {
        self.datadirs.lock().unwrap().remove(wallet_hash_id);
        self.removed.lock().unwrap().push(wallet_hash_id.to_string());
    }

    async fn register(&self, _credentials: Option<&Credentials>, _hw: Option<&HwDevice>) -> Result<(), WalletError> {
        Ok(())
    }

    async fn login_user(
        &self,
        _credentials: Option<&Credentials>,
        _hw: Option<&HwDevice>,
    ) -> Result<LoginUserResult, WalletError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.login_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.fail_with {
            return Err(TwoFactorError::Failure(error.clone()).into());
        }
        self.connected.store(true, Ordering::SeqCst);
        self.logged.store(true, Ordering::SeqCst);
        self.datadirs.lock().unwrap().insert(WALLET_HASH_ID.into());
        Ok(LoginUserResult {
            xpub_hash_id: XPUB_HASH_ID.into(),
            wallet_hash_id: WALLET_HASH_ID.into(),
        })
    }

    async fn decrypt_with_pin(&self, pin: &str, _pin_data: &PinData) -> Result<Credentials, WalletError> {
        match &self.correct_pin {
            Some(expected) if expected == pin => Ok(credentials()),
            _ => Err(TwoFactorError::Failure("id_invalid_pin".into()).into()),
        }
    }

    async fn discovery(&self) -> Result<bool, WalletError> {
        self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.discovery_error {
            return Err(LoginError::ConnectionFailed(Some(error.clone())).into());
        }
        Ok(self.funded)
    }

    async fn subaccounts(&self, _refresh: bool) -> Result<Vec<WalletItem>, WalletError> {
        Ok(self.subaccounts.lock().unwrap().clone())
    }

    async fn subaccount(&self, pointer: u32) -> Result<WalletItem, WalletError> {
        self.subaccounts
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.pointer == pointer)
            .cloned()
            .ok_or(WalletError::Storage("no such subaccount".into()))
    }

    async fn get_balance(&self, _pointer: u32, _num_confs: u32) -> Result<HashMap<String, i64>, WalletError> {
        Ok(self.balance.lock().unwrap().clone())
    }

    async fn transactions(&self, _pointer: u32, first: usize) -> Result<Vec<Transaction>, WalletError> {
        Ok(self.transactions.lock().unwrap().iter().skip(first).cloned().collect())
    }

    async fn create_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError> {
        Ok(tx)
    }

    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError> {
        Ok(tx)
    }

    async fn send_transaction(&self, _tx: Transaction) -> Result<SendTransactionSuccess, WalletError> {
        Ok(SendTransactionSuccess::default())
    }

    async fn broadcast_transaction(&self, _tx_hex: &str) -> Result<SendTransactionSuccess, WalletError> {
        Ok(SendTransactionSuccess::default())
    }

    async fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    async fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn settings(&self) -> Option<Value> {
        self.settings.lock().unwrap().clone()
    }

    async fn load_settings(&self) -> Result<Option<Value>, WalletError> {
        Ok(self.settings())
    }

    async fn change_settings(&self, settings: Value) -> Result<(), WalletError> {
        *self.settings.lock().unwrap() = Some(settings);
        Ok(())
    }

    async fn refresh_assets(&self) -> Result<(), WalletError> {
        Ok(())
    }
}
