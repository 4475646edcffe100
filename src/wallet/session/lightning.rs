//! Lightning-backed network session.
//!
//! The node is event driven: block, sync and payment events arrive on the node's listener and are
//! forwarded to the session's [`EventBus`]. Identity derivation still goes through the wallet
//! engine, using the parameters of the bitcoin singlesig network of the same chain.

use crate::engine::{
    EngineError, EngineSession, InputType, LightningNode, LightningNodeFactory, LnInvoice, LnUrlPayRequestData,
    LnUrlPayResult, WalletEngine, run_blocking,
};
use crate::wallet::account::{CredentialStore, lightning_credentials_key};
use crate::wallet::credentials::{Credentials, HwDevice, LoginUserResult, PinData, WalletIdentifier};
use crate::wallet::item::{SubaccountType, WalletItem};
use crate::wallet::network::NetworkSecurityCase;
use crate::wallet::session::WalletSession;
use crate::wallet::session::config::SessionConfig;
use crate::wallet::session::datadir::{DatadirRepository, FileDatadirRepository};
use crate::wallet::session::events::{EventBus, SessionEvent, convert_node_event};
use crate::wallet::session::manager::{ConnectionState, lock};
use crate::wallet::transaction::{
    Addressee, SendTransactionSuccess, TRANSACTIONS_PAGE, Transaction, TxType, ValidateAddresseesResult,
};
use crate::wallet::types::{LoginError, TransactionError, WalletError};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// First failing amount check for a lightning send, as a user-facing message.
pub fn lightning_amount_error(
    satoshi: Option<u64>,
    balance: u64,
    min: Option<u64>,
    max: Option<u64>,
) -> Option<String> {
    let satoshi = match satoshi {
        Some(s) if s > 0 => s,
        _ => return Some("id_invalid_amount".into()),
    };
    if let Some(min) = min.filter(|min| satoshi < *min) {
        return Some(format!("Amount must be at least {}", min));
    }
    if satoshi > balance {
        return Some("id_insufficient_funds".into());
    }
    if let Some(max) = max.filter(|max| satoshi > *max) {
        return Some(format!("Amount must be at most {}", max));
    }
    None
}

fn invoice_addressee(invoice: &LnInvoice, satoshi: u64) -> Addressee {
    Addressee {
        address: invoice.bolt11.clone(),
        satoshi: Some(satoshi as i64),
        has_locked_amount: invoice.amount_msat.is_some(),
        kind: Some(TxType::Bolt11),
        ..Default::default()
    }
}

fn lnurl_addressee(data: &LnUrlPayRequestData, input: &str, satoshi: Option<u64>) -> Addressee {
    Addressee {
        address: input.to_string(),
        satoshi: satoshi.map(|s| s as i64),
        has_locked_amount: data.min_sendable_satoshi() == data.max_sendable_satoshi(),
        min_amount: Some(data.min_sendable_satoshi()),
        max_amount: Some(data.max_sendable_satoshi()),
        domain: Some(data.domain.clone()),
        kind: Some(TxType::Lnurl),
        ..Default::default()
    }
}

pub struct LightningSessionManager {
    network: NetworkSecurityCase,
    engine: Arc<dyn WalletEngine>,
    session: Mutex<Option<Arc<dyn EngineSession>>>,
    node_factory: Arc<dyn LightningNodeFactory>,
    node: Mutex<Option<Arc<dyn LightningNode>>>,
    config: Arc<SessionConfig>,
    credential_store: Arc<dyn CredentialStore>,
    datadir: FileDatadirRepository,
    state: Arc<ConnectionState>,
    is_restored_node: Mutex<Option<bool>>,
    login_data: Mutex<Option<LoginUserResult>>,
    settings: Mutex<Option<Value>>,
    events: EventBus,
}

impl LightningSessionManager {
    pub fn new(
        network: NetworkSecurityCase,
        engine: Arc<dyn WalletEngine>,
        node_factory: Arc<dyn LightningNodeFactory>,
        credential_store: Arc<dyn CredentialStore>,
        config: Arc<SessionConfig>,
    ) -> Arc<Self> {
        Arc::new(Self {
            network,
            engine,
            session: Mutex::new(None),
            node_factory,
            node: Mutex::new(None),
            datadir: FileDatadirRepository::with_suffix(config.lightning_dir(), "0"),
            config,
            credential_store,
            state: Arc::new(ConnectionState::default()),
            is_restored_node: Mutex::new(None),
            login_data: Mutex::new(None),
            settings: Mutex::new(None),
            events: EventBus::new(),
        })
    }

    fn engine_session(&self) -> Result<Arc<dyn EngineSession>, WalletError> {
        let mut guard = lock(&self.session);
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }
        let session = self.engine.create_session()?;
        *guard = Some(session.clone());
        Ok(session)
    }

    fn node(&self) -> Result<Arc<dyn LightningNode>, WalletError> {
        lock(&self.node)
            .clone()
            .ok_or(WalletError::Engine(EngineError::NotConnected))
    }

    /// Working directory of the node of `wallet_hash_id`.
    pub fn working_dir(&self, wallet_hash_id: &str) -> Result<std::path::PathBuf, WalletError> {
        self.datadir.path(wallet_hash_id)
    }

    async fn identifier(&self, details: Value) -> Result<WalletIdentifier, WalletError> {
        let session = self.engine_session()?;
        let params = self.config.network_params(self.network.chain_network());
        let raw = run_blocking(move || session.get_wallet_identifier(&params, &details)).await?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn balance(&self) -> Result<u64, WalletError> {
        let node = self.node()?;
        Ok(run_blocking(move || node.balance_sat()).await?)
    }

    async fn parse_input(&self, input: &str) -> Result<InputType, WalletError> {
        let node = self.node()?;
        let input = input.to_string();
        Ok(run_blocking(move || node.parse_input(&input)).await?)
    }

    fn start_node(&self, wallet_hash_id: &str) -> Result<Arc<dyn LightningNode>, WalletError> {
        let working_dir = self.working_dir(wallet_hash_id)?;
        let node = self.node_factory.create_node(&working_dir, !self.network.mainnet())?;
        let network = self.network;
        let state = self.state.clone();
        let events = self.events.clone();
        node.set_event_handler(Box::new(move |event| {
            debug!("lightning event {:?}", event);
            for event in convert_node_event(network, event) {
                if let SessionEvent::Block { height, .. } = &event {
                    state.block_height.store(*height, Ordering::SeqCst);
                }
                events.publish(event);
            }
        }));
        *lock(&self.node) = Some(node.clone());
        Ok(node)
    }

    /// Validate a destination typed or scanned by the user.
    pub async fn parse_tx_input(&self, input: &str) -> Result<ValidateAddresseesResult, WalletError> {
        let result = match self.parse_input(input).await? {
            InputType::BitcoinAddress { .. } => ValidateAddresseesResult::invalid("id_invalid_address"),
            InputType::Bolt11(invoice) => {
                if invoice.is_expired() {
                    return Ok(ValidateAddresseesResult::rejected("id_invoice_expired"));
                }
                if let Some(satoshi) = invoice.amount_satoshi() {
                    let balance = self.balance().await?;
                    if let Some(error) = lightning_amount_error(Some(satoshi), balance, None, None) {
                        return Ok(ValidateAddresseesResult::rejected(error));
                    }
                }
                ValidateAddresseesResult::valid(vec![invoice_addressee(&invoice, 0)])
            }
            InputType::LnUrlPay(data) => ValidateAddresseesResult::valid(vec![lnurl_addressee(&data, input, None)]),
            InputType::LnUrlAuth { .. } | InputType::LnUrlWithdraw { .. } => {
                ValidateAddresseesResult::valid(vec![Addressee::new(input, None)])
            }
            InputType::NodeId { .. } | InputType::Url { .. } | InputType::LnUrlError { .. } => {
                ValidateAddresseesResult::invalid("Unsupported")
            }
        };
        Ok(result)
    }
}

#[async_trait::async_trait]
impl WalletSession for LightningSessionManager {
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

    fn is_restored_node(&self) -> Option<bool> {
        *lock(&self.is_restored_node)
    }

    async fn connect(&self) -> Result<(), WalletError> {
        self.state.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.state.reset();
        let node = lock(&self.node).take();
        if let Some(node) = node {
            if let Err(e) = run_blocking(move || node.stop()).await {
                warn!("lightning disconnect error {}", e);
                return Err(e.into());
            }
        }
        Ok(())
    }

    async fn wallet_identifier(&self, credentials: &Credentials) -> Option<WalletIdentifier> {
        let details = credentials.to_details().ok()?;
        self.identifier(details).await.ok()
    }

    async fn wallet_identifier_from_xpub(&self, master_xpub: &str) -> Option<WalletIdentifier> {
        self.identifier(json!({ "master_xpub": master_xpub })).await.ok()
    }

    /// A node exists once its credentials have been stored.
    async fn exist_datadir(&self, wallet_hash_id: &str) -> bool {
        if wallet_hash_id.is_empty() {
            return false;
        }
        match self.credential_store.get(&lightning_credentials_key(wallet_hash_id)).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!("lightning credentials lookup: {}", e);
                false
            }
        }
    }

    async fn remove_datadir(&self, wallet_hash_id: &str) {
        if let Err(e) = self.datadir.remove(wallet_hash_id).await {
            warn!("lightning datadir removal failed: {}", e);
        }
        if let Err(e) = self.credential_store.remove(&lightning_credentials_key(wallet_hash_id)).await {
            warn!("lightning credentials removal failed: {}", e);
        }
    }

    async fn register(&self, _credentials: Option<&Credentials>, _hw: Option<&HwDevice>) -> Result<(), WalletError> {
        Ok(())
    }

    async fn login_user(
        &self,
        credentials: Option<&Credentials>,
        _hw: Option<&HwDevice>,
    ) -> Result<LoginUserResult, WalletError> {
        let credentials = credentials.ok_or(LoginError::ConnectionFailed(None))?;
        let mnemonic = credentials
            .mnemonic
            .clone()
            .ok_or(LoginError::InvalidMnemonic(None))?;
        let wallet_id = self.identifier(credentials.to_details()?).await?;
        let key = lightning_credentials_key(&wallet_id.wallet_hash_id);
        let restore = self.credential_store.get(&key).await?.is_none();
        let node = self.start_node(&wallet_id.wallet_hash_id)?;

        info!("lightning login, restore: {}", restore);
        let first = {
            let node = node.clone();
            let mnemonic = mnemonic.clone();
            run_blocking(move || node.connect(&mnemonic, restore)).await
        };
        match first {
            Ok(()) => *lock(&self.is_restored_node) = Some(restore),
            Err(e) => {
                debug!("lightning connect with credential check failed: {}", e);
                let node = node.clone();
                run_blocking(move || node.connect(&mnemonic, false))
                    .await
                    .map_err(|e| {
                        warn!("lightning login failed: {}", e);
                        WalletError::from(e)
                    })?;
            }
        }
        self.state.connected.store(true, Ordering::SeqCst);

        if let Some(node_credentials) = node.credentials() {
            self.credential_store.set(&key, node_credentials).await?;
        }
        let result = LoginUserResult::from(wallet_id);
        self.state.logged.store(true, Ordering::SeqCst);
        *lock(&self.login_data) = Some(result.clone());
        Ok(result)
    }

    async fn decrypt_with_pin(&self, _pin: &str, _pin_data: &PinData) -> Result<Credentials, WalletError> {
        Err(EngineError::Unsupported("decrypt_with_pin".into()).into())
    }

    /// Funded when the node holds a balance or has any payment history.
    async fn discovery(&self) -> Result<bool, WalletError> {
        if self.balance().await? > 0 {
            return Ok(true);
        }
        let node = self.node()?;
        let payments = run_blocking(move || node.list_payments()).await?;
        Ok(!payments.is_empty())
    }

    async fn subaccounts(&self, _refresh: bool) -> Result<Vec<WalletItem>, WalletError> {
        Ok(vec![self.subaccount(0).await?])
    }

    async fn subaccount(&self, _pointer: u32) -> Result<WalletItem, WalletError> {
        Ok(WalletItem::new("", 0, SubaccountType::Lightning, self.network))
    }

    async fn get_balance(&self, _pointer: u32, _num_confs: u32) -> Result<HashMap<String, i64>, WalletError> {
        let sats = match self.node() {
            Ok(_) => self.balance().await?,
            Err(_) => 0,
        };
        Ok(HashMap::from([(self.network.policy_asset().to_string(), sats as i64)]))
    }

    async fn transactions(&self, pointer: u32, first: usize) -> Result<Vec<Transaction>, WalletError> {
        let Ok(node) = self.node() else {
            return Ok(Vec::new());
        };
        let asset = self.network.policy_asset();
        let (payments, refundables, reverse_swaps, in_progress) = run_blocking(move || {
            Ok((
                node.list_payments()?,
                node.list_refundables()?,
                node.list_reverse_swaps()?,
                node.swap_progress()?,
            ))
        })
        .await?;

        let mut txs: Vec<Transaction> = payments
            .iter()
            .map(|p| Transaction::from_payment(p, asset, pointer))
            .chain(refundables.iter().map(|s| Transaction::from_swap_info(s, asset, pointer, true)))
            .chain(reverse_swaps.iter().map(|s| Transaction::from_reverse_swap(s, asset, pointer)))
            .chain(in_progress.iter().map(|s| Transaction::from_swap_info(s, asset, pointer, false)))
            .collect();
        txs.sort_by(Transaction::newest_first);
        Ok(txs.into_iter().skip(first).take(TRANSACTIONS_PAGE).collect())
    }

    /// Fills in the amount and memo for the destination and reports the first amount problem in
    /// `error`. Destinations that are neither invoices nor LNURL-pay come back unchanged.
    async fn create_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError> {
        let Some(first) = tx.addressees.first().cloned() else {
            return Ok(tx);
        };
        let user_satoshi = first.satoshi.map(i64::unsigned_abs);
        let asset = self.network.policy_asset();

        let mut tx = match self.parse_input(&first.address).await? {
            InputType::Bolt11(invoice) => {
                let sendable = invoice.sendable_satoshi(user_satoshi).unwrap_or_default();
                let mut tx = tx.with_error("");
                tx.addressees = vec![invoice_addressee(&invoice, sendable)];
                tx.satoshi = HashMap::from([(asset.to_string(), sendable as i64)]);
                if let Some(description) = &invoice.description {
                    tx.memo = description.clone();
                }
                if invoice.is_expired() {
                    return Ok(tx.with_error("id_invoice_expired"));
                }
                let balance = self.balance().await?;
                match lightning_amount_error(Some(sendable), balance, None, None) {
                    Some(error) => tx.with_error(error),
                    None => tx,
                }
            }
            InputType::LnUrlPay(data) => {
                let sendable = data.sendable_satoshi(user_satoshi).unwrap_or_default();
                let mut tx = tx.with_error("");
                tx.addressees = vec![lnurl_addressee(&data, &first.address, Some(sendable))];
                tx.satoshi = HashMap::from([(asset.to_string(), sendable as i64)]);
                let balance = self.balance().await?;
                let error = lightning_amount_error(
                    Some(sendable),
                    balance,
                    Some(data.min_sendable_satoshi()),
                    Some(data.max_sendable_satoshi()),
                );
                match error {
                    Some(error) => tx.with_error(error),
                    None => tx,
                }
            }
            _ => return Ok(tx),
        };
        tx.subaccount = tx.subaccount.or(Some(0));
        Ok(tx)
    }

    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError> {
        Ok(tx)
    }

    async fn send_transaction(&self, tx: Transaction) -> Result<SendTransactionSuccess, WalletError> {
        let Some(addressee) = tx.addressees.first() else {
            return Err(TransactionError::Invalid("id_error".into()).into());
        };
        let satoshi = addressee.satoshi.map(i64::unsigned_abs);
        let node = self.node()?;
        match self.parse_input(&addressee.address).await? {
            InputType::Bolt11(invoice) => {
                if invoice.is_expired() {
                    return Err(TransactionError::Invalid("id_invoice_expired".into()).into());
                }
                // zero-amount invoices take the user's amount, others must not get one
                let amount = invoice.amount_msat.is_none().then_some(satoshi).flatten();
                let bolt11 = invoice.bolt11.clone();
                let payment = run_blocking(move || node.send_payment(&bolt11, amount))
                    .await
                    .map_err(|e| TransactionError::Failure {
                        message: e.to_string(),
                        payment_hash: Some(invoice.payment_hash.clone()),
                    })?;
                info!("lightning payment {} sent", payment.id);
                Ok(SendTransactionSuccess::from_payment(&payment))
            }
            InputType::LnUrlPay(data) => {
                let comment = tx.memo.clone();
                let amount = satoshi.unwrap_or_default();
                let result = run_blocking(move || node.pay_lnurl(&data, amount, &comment)).await?;
                match result {
                    LnUrlPayResult::EndpointSuccess { payment } => Ok(SendTransactionSuccess::from_payment(&payment)),
                    LnUrlPayResult::EndpointError { reason } => Err(TransactionError::Invalid(reason).into()),
                    LnUrlPayResult::PayError { reason, payment_hash } => Err(TransactionError::Failure {
                        message: reason,
                        payment_hash: Some(payment_hash),
                    }
                    .into()),
                }
            }
            _ => Err(TransactionError::Invalid("id_error".into()).into()),
        }
    }

    async fn broadcast_transaction(&self, _tx_hex: &str) -> Result<SendTransactionSuccess, WalletError> {
        Err(EngineError::Unsupported("broadcast_transaction".into()).into())
    }

    async fn pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
    }

    async fn resume(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
    }

    fn settings(&self) -> Option<Value> {
        lock(&self.settings).clone()
    }

    async fn load_settings(&self) -> Result<Option<Value>, WalletError> {
        Ok(self.settings())
    }

    async fn change_settings(&self, settings: Value) -> Result<(), WalletError> {
        *lock(&self.settings) = Some(settings);
        Ok(())
    }

    async fn refresh_assets(&self) -> Result<(), WalletError> {
        Ok(())
    }
}
