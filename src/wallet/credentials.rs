use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Software login material. Never logged, never persisted by this crate.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bip39_passphrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_data: Option<PinData>,
}

impl Credentials {
    pub fn from_mnemonic(mnemonic: impl Into<String>) -> Self {
        Self {
            mnemonic: Some(mnemonic.into()),
            ..Default::default()
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.bip39_passphrase = Some(passphrase.into());
        self
    }

    pub fn from_pin(pin: impl Into<String>, pin_data: PinData) -> Self {
        Self {
            pin: Some(pin.into()),
            pin_data: Some(pin_data),
            ..Default::default()
        }
    }

    /// Engine `details` object for identifier derivation and login.
    pub fn to_details(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("Credentials")
            .field("mnemonic", &mask(&self.mnemonic))
            .field("bip39_passphrase", &mask(&self.bip39_passphrase))
            .field("password", &mask(&self.password))
            .field("pin", &mask(&self.pin))
            .field("pin_data", &self.pin_data.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Encrypted PIN payload as stored in secure storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinData {
    pub encrypted_data: String,
    pub pin_identifier: String,
    pub salt: String,
}

/// Deterministic identity of a wallet on one network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletIdentifier {
    #[serde(rename = "wallet_hash_id")]
    pub wallet_hash_id: String,
    #[serde(rename = "xpub_hash_id")]
    pub xpub_hash_id: String,
}

/// Identity reported by a successful login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginUserResult {
    #[serde(default)]
    pub xpub_hash_id: String,
    #[serde(default)]
    pub wallet_hash_id: String,
}

impl From<WalletIdentifier> for LoginUserResult {
    fn from(id: WalletIdentifier) -> Self {
        Self {
            xpub_hash_id: id.xpub_hash_id,
            wallet_hash_id: id.wallet_hash_id,
        }
    }
}

/// Capabilities of a connected hardware wallet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwDevice {
    pub name: String,
    #[serde(default)]
    pub supports_liquid: bool,
    #[serde(default)]
    pub supports_host_unblinding: bool,
    #[serde(default)]
    pub supports_arbitrary_scripts: bool,
    #[serde(default)]
    pub supports_low_r: bool,
}

impl HwDevice {
    pub fn to_details(&self) -> Value {
        serde_json::json!({
            "device": {
                "name": self.name,
                "supports_liquid": u8::from(self.supports_liquid),
                "supports_host_unblinding": self.supports_host_unblinding,
                "supports_arbitrary_scripts": self.supports_arbitrary_scripts,
                "supports_low_r": self.supports_low_r,
            }
        })
    }
}

/// Keys whose values must never reach the logs.
pub const SENSITIVE_KEYS: [&str; 5] = ["mnemonic", "password", "pin", "bip39_passphrase", "pin_data"];

/// Copy of `value` with every sensitive key masked, recursively.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if SENSITIVE_KEYS.contains(&k.as_str()) {
                        (k.clone(), Value::String("***".into()))
                    } else {
                        (k.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}
