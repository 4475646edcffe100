//! Typed transaction record.
//!
//! The engine hands transactions around as open JSON objects. This type pins down the fields the
//! wallet layer reads or edits and keeps everything else in `extra`, so a transaction can be
//! replayed through `create_transaction`/`sign_transaction`/`send_transaction` without losing
//! engine-private data. Edits consume the value and return a new one.

use crate::engine::{Payment, PaymentStatus, PaymentType, ReverseSwapInfo, SwapInfo};
use crate::wallet::types::TransactionError;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Page size used by every transaction listing.
pub const TRANSACTIONS_PAGE: usize = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxDirection {
    #[default]
    Incoming,
    Outgoing,
    Redeposit,
    Mixed,
}

/// What an addressee pays to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Transaction,
    Sweep,
    BumpFee,
    Bolt11,
    Lnurl,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Addressee {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satoshi: Option<i64>,
    #[serde(default)]
    pub is_greedy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub has_locked_amount: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TxType>,
}

impl Addressee {
    pub fn new(address: impl Into<String>, satoshi: Option<i64>) -> Self {
        Self {
            address: address.into(),
            satoshi,
            ..Default::default()
        }
    }
}

/// Outcome of a successful send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendTransactionSuccess {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txhash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_hash: Option<String>,
}

impl SendTransactionSuccess {
    pub fn from_payment(payment: &Payment) -> Self {
        Self {
            payment_id: Some(payment.id.clone()),
            payment_hash: payment.payment_hash.clone(),
            ..Default::default()
        }
    }
}

/// Outcome of validating a user-entered destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidateAddresseesResult {
    pub is_valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub addressees: Vec<Addressee>,
}

impl ValidateAddresseesResult {
    pub fn valid(addressees: Vec<Addressee>) -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            addressees,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            errors: vec![error.into()],
            addressees: Vec::new(),
        }
    }

    /// Recognised destination that cannot be paid as entered.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            errors: vec![error.into()],
            addressees: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub addressees: Vec<Addressee>,
    #[serde(default)]
    pub block_height: u32,
    #[serde(default)]
    pub can_rbf: bool,
    /// Microseconds since the epoch.
    #[serde(default)]
    pub created_at_ts: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub fee_rate: u64,
    #[serde(default)]
    pub txhash: String,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub satoshi: HashMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subaccount: Option<u32>,
    #[serde(default)]
    pub transaction_vsize: u64,
    #[serde(rename = "type", default)]
    pub direction: TxDirection,
    #[serde(default)]
    pub is_lightning: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice: Option<String>,
    #[serde(default)]
    pub is_refundable_swap: bool,
    #[serde(default)]
    pub is_in_progress_swap: bool,
    #[serde(default)]
    pub is_pending_close_channel: bool,
    /// Engine fields this layer does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transaction {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn with_fee_rate(mut self, fee_rate: u64) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    /// Replace the addressee list. Every addressee needs an address and a non-negative amount.
    pub fn with_addressees(mut self, addressees: Vec<Addressee>) -> Result<Self, TransactionError> {
        for addressee in &addressees {
            if addressee.address.trim().is_empty() {
                return Err(TransactionError::Invalid("id_invalid_address".into()));
            }
            if addressee.satoshi.is_some_and(|s| s < 0) {
                return Err(TransactionError::Invalid("id_invalid_amount".into()));
            }
        }
        self.addressees = addressees;
        Ok(self)
    }

    /// Previous transaction for a fee bump.
    pub fn bump_fee_of(previous: &Transaction, fee_rate: u64) -> Self {
        let mut extra = Map::new();
        extra.insert(
            "previous_transaction".into(),
            serde_json::to_value(previous).unwrap_or(Value::Null),
        );
        Self {
            subaccount: previous.subaccount,
            fee_rate,
            extra,
            ..Default::default()
        }
    }

    pub fn amount(&self, asset: &str) -> i64 {
        self.satoshi.get(asset).copied().unwrap_or_default()
    }

    /// Ascending recency: creation time, then block height, then outgoing before incoming.
    pub fn recency_cmp(&self, other: &Self) -> Ordering {
        self.created_at_ts
            .cmp(&other.created_at_ts)
            .then(self.block_height.cmp(&other.block_height))
            .then_with(|| match (self.direction, other.direction) {
                (TxDirection::Outgoing, TxDirection::Incoming) => Ordering::Less,
                (TxDirection::Incoming, TxDirection::Outgoing) => Ordering::Greater,
                _ => Ordering::Equal,
            })
    }

    /// Newest first.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.recency_cmp(a)
    }

    pub fn from_payment(payment: &Payment, asset: &str, subaccount: u32) -> Self {
        let sats = (payment.amount_msat / 1000) as i64;
        let (direction, signed) = match payment.payment_type {
            PaymentType::Sent => (TxDirection::Outgoing, -sats),
            PaymentType::Received | PaymentType::ClosedChannel => (TxDirection::Incoming, sats),
        };
        Self {
            block_height: u32::from(payment.status == PaymentStatus::Complete),
            created_at_ts: payment.payment_time * 1_000_000,
            fee: payment.fee_msat / 1000,
            txhash: payment.id.clone(),
            memo: payment.description.clone().unwrap_or_default(),
            satoshi: HashMap::from([(asset.to_string(), signed)]),
            subaccount: Some(subaccount),
            direction,
            is_lightning: true,
            payment_hash: payment.payment_hash.clone(),
            invoice: payment.bolt11.clone(),
            is_pending_close_channel: payment.payment_type == PaymentType::ClosedChannel
                && payment.status == PaymentStatus::Pending,
            error: if payment.status == PaymentStatus::Failed {
                "id_payment_failed".into()
            } else {
                String::new()
            },
            ..Default::default()
        }
    }

    pub fn from_swap_info(swap: &SwapInfo, asset: &str, subaccount: u32, refundable: bool) -> Self {
        let sats = (swap.confirmed_sats + swap.unconfirmed_sats) as i64;
        Self {
            created_at_ts: swap.created_at * 1_000_000,
            txhash: swap.bitcoin_address.clone(),
            satoshi: HashMap::from([(asset.to_string(), sats)]),
            subaccount: Some(subaccount),
            direction: TxDirection::Incoming,
            is_lightning: true,
            is_refundable_swap: refundable,
            is_in_progress_swap: !refundable,
            ..Default::default()
        }
    }

    pub fn from_reverse_swap(swap: &ReverseSwapInfo, asset: &str, subaccount: u32) -> Self {
        Self {
            created_at_ts: swap.created_at * 1_000_000,
            txhash: swap.claim_txid.clone().unwrap_or_else(|| swap.id.clone()),
            satoshi: HashMap::from([(asset.to_string(), -(swap.onchain_amount_sat as i64))]),
            subaccount: Some(subaccount),
            direction: TxDirection::Outgoing,
            is_lightning: true,
            is_in_progress_swap: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_unknown_engine_fields() {
        let tx = Transaction::from_value(json!({
            "txhash": "ab",
            "type": "outgoing",
            "fee": 141,
            "utxo_strategy": "default",
            "transaction_outputs": [{ "address": "bc1q" }]
        }))
        .unwrap();
        assert_eq!(tx.direction, TxDirection::Outgoing);
        assert_eq!(tx.fee, 141);

        let value = tx.with_memo("rent").to_value().unwrap();
        assert_eq!(value["utxo_strategy"], "default");
        assert_eq!(value["memo"], "rent");
        assert_eq!(value["transaction_outputs"][0]["address"], "bc1q");
    }

    #[test]
    fn rejects_negative_addressee_amount() {
        let err = Transaction::default()
            .with_addressees(vec![Addressee::new("bc1q", Some(-5))])
            .unwrap_err();
        assert_eq!(err, TransactionError::Invalid("id_invalid_amount".into()));
    }

    #[test]
    fn outgoing_sorts_before_incoming_at_same_height() {
        let base = Transaction {
            created_at_ts: 10,
            block_height: 5,
            ..Default::default()
        };
        let outgoing = Transaction {
            direction: TxDirection::Outgoing,
            ..base.clone()
        };
        let newer = Transaction {
            created_at_ts: 11,
            ..base.clone()
        };
        assert_eq!(outgoing.recency_cmp(&base), Ordering::Less);

        let mut list = vec![base.clone(), newer.clone(), outgoing.clone()];
        list.sort_by(Transaction::newest_first);
        assert_eq!(list, vec![newer, base, outgoing]);
    }

    #[test]
    fn sent_payment_is_negative() {
        let payment = Payment {
            id: "p1".into(),
            payment_type: PaymentType::Sent,
            payment_time: 1_700_000_000,
            amount_msat: 21_000,
            fee_msat: 1_000,
            status: PaymentStatus::Complete,
            description: Some("coffee".into()),
            payment_hash: Some("hash".into()),
            bolt11: None,
        };
        let tx = Transaction::from_payment(&payment, "lightning", 0);
        assert_eq!(tx.amount("lightning"), -21);
        assert_eq!(tx.fee, 1);
        assert_eq!(tx.memo, "coffee");
        assert_eq!(tx.created_at_ts, 1_700_000_000_000_000);
    }
}
