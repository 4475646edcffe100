//! Serialized connect/disconnect transitions.
//!
//! Every session in the process funnels its connect, disconnect and datadir removal through one
//! [`ReconnectionQueue`], so two networks never interleave engine connection calls that share the
//! same proxy/Tor configuration. Reads (subaccounts, balances, transactions) bypass the queue.

use crate::wallet::session::config::ReconnectConfig;
use crate::wallet::types::{LoginError, WalletError};

use backoff::ExponentialBackoff;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

static SHARED_QUEUE: OnceLock<ReconnectionQueue> = OnceLock::new();

/// FIFO queue for connection state transitions.
#[derive(Clone, Default)]
pub struct ReconnectionQueue {
	lock: Arc<Mutex<()>>,
	completed: Arc<AtomicU64>,
}

impl ReconnectionQueue {
	/// A private queue. Useful when a composition root wants explicit ownership.
	pub fn new() -> Self {
		Self::default()
	}

	/// The process-wide queue.
	pub fn shared() -> Self {
		SHARED_QUEUE.get_or_init(ReconnectionQueue::new).clone()
	}

	/// Run `task` once every previously queued transition has finished.
	///
	/// Tokio's mutex is fair, so transitions run in submission order.
	pub async fn run<F, Fut, T>(&self, label: &str, task: F) -> T
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = T>,
	{
		let _guard = self.lock.lock().await;
		debug!("reconnection queue: {}", label);
		let result = task().await;
		self.completed.fetch_add(1, Ordering::Relaxed);
		result
	}

	/// Transitions completed so far.
	pub fn completed(&self) -> u64 {
		self.completed.load(Ordering::Relaxed)
	}
}

impl ReconnectConfig {
	pub fn backoff(&self) -> ExponentialBackoff {
		ExponentialBackoff {
			current_interval: Duration::from_millis(self.initial_interval_ms),
			initial_interval: Duration::from_millis(self.initial_interval_ms),
			max_interval: Duration::from_millis(self.max_interval_ms),
			max_elapsed_time: Some(Duration::from_secs(self.max_elapsed_secs)),
			..ExponentialBackoff::default()
		}
	}
}

/// Retry a reconnect with exponential backoff.
///
/// Connection failures are retried until the backoff gives up; any other error (a cancelled
/// prompt, a mismatched wallet) aborts immediately.
pub async fn retry_reconnect<F, Fut>(config: &ReconnectConfig, mut attempt: F) -> Result<(), WalletError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<(), WalletError>>,
{
	backoff::future::retry(config.backoff(), || {
		let fut = attempt();
		async move {
			fut.await.map_err(|e| match e {
				WalletError::Login(LoginError::ConnectionFailed(_)) => {
					warn!("Reconnect attempt failed: {}", e);
					backoff::Error::transient(e)
				}
				other => backoff::Error::permanent(other),
			})
		}
	})
	.await
}
