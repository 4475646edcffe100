//! Event system for wallet sessions.
//!
//! Engine sessions and lightning nodes push notifications from their own threads. This module
//! converts those raw notifications into [`SessionEvent`]s, publishes them on a per-session
//! [`EventBus`], and lets any number of [`SessionEventHandler`]s consume them through an
//! [`EventDispatcher`]. Session state (block height, paused flag, cached settings) is updated by
//! the session itself; handlers only observe.

use crate::engine::NodeEvent;
use crate::wallet::network::NetworkSecurityCase;
use crate::wallet::types::WalletError;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

const EVENT_BUS_CAPACITY: usize = 256;

/// Events that occur during a session's lifetime
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Engine connection state changed
    Network {
        network: NetworkSecurityCase,
        connected: bool,
        wait_ms: u64,
    },
    /// A new block was seen
    Block {
        network: NetworkSecurityCase,
        height: u32,
    },
    /// Wallet settings changed, possibly from another device
    Settings {
        network: NetworkSecurityCase,
        settings: Value,
    },
    /// A two-factor reset was started or cancelled
    TwoFactorReset {
        network: NetworkSecurityCase,
        is_active: bool,
    },
    /// Tor bootstrap progress, 0-100
    Tor {
        network: NetworkSecurityCase,
        progress: u32,
    },
    /// Exchange rate update
    Ticker {
        network: NetworkSecurityCase,
        currency: String,
        rate: String,
    },
    /// Lightning node finished syncing
    Synced { network: NetworkSecurityCase },
    InvoicePaid {
        network: NetworkSecurityCase,
        payment_hash: String,
    },
    PaymentSucceed { network: NetworkSecurityCase },
    PaymentFailed {
        network: NetworkSecurityCase,
        error: String,
    },
}

impl SessionEvent {
    pub fn network(&self) -> NetworkSecurityCase {
        match self {
            SessionEvent::Network { network, .. }
            | SessionEvent::Block { network, .. }
            | SessionEvent::Settings { network, .. }
            | SessionEvent::TwoFactorReset { network, .. }
            | SessionEvent::Tor { network, .. }
            | SessionEvent::Ticker { network, .. }
            | SessionEvent::Synced { network }
            | SessionEvent::InvoicePaid { network, .. }
            | SessionEvent::PaymentSucceed { network }
            | SessionEvent::PaymentFailed { network, .. } => *network,
        }
    }
}

/// Broadcast channel for one session's events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    /// Publish to current subscribers. Events without subscribers are dropped.
    pub fn publish(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            debug!("No subscribers for session event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

/// Trait for handling session events.
///
/// Implementors receive every event published on the buses they are attached to.
#[async_trait::async_trait]
pub trait SessionEventHandler: Send + Sync {
    async fn handle(&mut self, event: &SessionEvent) -> Result<(), WalletError>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
pub struct EventDispatcher {
    handlers: Vec<Box<dyn SessionEventHandler>>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Handlers are called in the order they are registered.
    pub fn register_handler(&mut self, handler: Box<dyn SessionEventHandler>) {
        self.handlers.push(handler);
    }

    /// Dispatch an event to all registered handlers.
    ///
    /// Errors from handlers are logged, but do not stop other handlers from running.
    pub async fn dispatch(&mut self, event: &SessionEvent) {
        for handler in &mut self.handlers {
            if let Err(e) = handler.handle(event).await {
                error!("Handler {} failed to process event: {}", handler.name(), e);
            }
        }
    }

    /// Pump `receiver` into the handlers until the bus closes.
    pub fn spawn(mut self, mut receiver: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => self.dispatch(&event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event dispatcher lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Convert a raw engine notification to session events.
///
/// Unknown events are ignored.
pub fn convert_engine_notification(network: NetworkSecurityCase, notification: &Value) -> Vec<SessionEvent> {
    let Some(kind) = notification.get("event").and_then(Value::as_str) else {
        return Vec::new();
    };
    let body = notification.get(kind).cloned().unwrap_or(Value::Null);

    let event = match kind {
        "network" => {
            let state = body.get("current_state").and_then(Value::as_str).unwrap_or_default();
            SessionEvent::Network {
                network,
                connected: state == "connected",
                wait_ms: body.get("wait_ms").and_then(Value::as_u64).unwrap_or_default(),
            }
        }
        "block" => match body.get("block_height").and_then(Value::as_u64) {
            Some(height) => SessionEvent::Block {
                network,
                height: height as u32,
            },
            None => return Vec::new(),
        },
        "settings" => SessionEvent::Settings {
            network,
            settings: body,
        },
        "twofactor_reset" => SessionEvent::TwoFactorReset {
            network,
            is_active: body.get("is_active").and_then(Value::as_bool).unwrap_or_default(),
        },
        "tor" => SessionEvent::Tor {
            network,
            progress: body.get("progress").and_then(Value::as_u64).unwrap_or_default() as u32,
        },
        "ticker" => SessionEvent::Ticker {
            network,
            currency: body.get("currency").and_then(Value::as_str).unwrap_or_default().to_string(),
            rate: body.get("rate").and_then(Value::as_str).unwrap_or_default().to_string(),
        },
        other => {
            debug!("Ignoring engine notification {}", other);
            return Vec::new();
        }
    };
    vec![event]
}

/// Convert a lightning node event to session events.
pub fn convert_node_event(network: NetworkSecurityCase, event: NodeEvent) -> Vec<SessionEvent> {
    match event {
        NodeEvent::Synced => vec![SessionEvent::Synced { network }],
        NodeEvent::NewBlock(height) => vec![SessionEvent::Block { network, height }],
        NodeEvent::InvoicePaid { payment_hash, .. } => vec![SessionEvent::InvoicePaid {
            network,
            payment_hash,
        }],
        NodeEvent::PaymentSucceed { .. } => vec![SessionEvent::PaymentSucceed { network }],
        NodeEvent::PaymentFailed { error } => vec![SessionEvent::PaymentFailed { network, error }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    const NET: NetworkSecurityCase = NetworkSecurityCase::BitcoinSS;

    #[test]
    fn converts_network_and_block_notifications() {
        let events = convert_engine_notification(
            NET,
            &json!({ "event": "network", "network": { "current_state": "disconnected", "wait_ms": 1500 } }),
        );
        assert_eq!(
            events,
            vec![SessionEvent::Network {
                network: NET,
                connected: false,
                wait_ms: 1500
            }]
        );

        let events = convert_engine_notification(
            NET,
            &json!({ "event": "block", "block": { "block_height": 840000 } }),
        );
        assert_eq!(events, vec![SessionEvent::Block { network: NET, height: 840000 }]);
    }

    #[test]
    fn unknown_notifications_are_ignored() {
        assert!(convert_engine_notification(NET, &json!({ "event": "transaction" })).is_empty());
        assert!(convert_engine_notification(NET, &json!({ "no": "event" })).is_empty());
    }

    struct Recorder(Arc<Mutex<Vec<SessionEvent>>>);

    #[async_trait::async_trait]
    impl SessionEventHandler for Recorder {
        async fn handle(&mut self, event: &SessionEvent) -> Result<(), WalletError> {
            self.0.lock().await.push(event.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl SessionEventHandler for Failing {
        async fn handle(&mut self, _event: &SessionEvent) -> Result<(), WalletError> {
            Err(WalletError::Storage("boom".into()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn failing_handler_does_not_block_others() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register_handler(Box::new(Failing));
        dispatcher.register_handler(Box::new(Recorder(seen.clone())));

        let bus = EventBus::new();
        let handle = dispatcher.spawn(bus.subscribe());
        bus.publish(SessionEvent::Synced {
            network: NetworkSecurityCase::Lightning,
        });
        drop(bus);
        handle.await.unwrap();

        assert_eq!(
            *seen.lock().await,
            vec![SessionEvent::Synced {
                network: NetworkSecurityCase::Lightning
            }]
        );
    }
}
