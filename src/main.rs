use green_wallet_sessions::wallet::Account;
use green_wallet_sessions::wallet::manager::session_networks;
use green_wallet_sessions::wallet::network::NetworkSecurityCase;
use green_wallet_sessions::wallet::session::SessionConfig;
use green_wallet_sessions::wallet::session::datadir::{DatadirRepository, FileDatadirRepository};

use std::path::PathBuf;
use tracing::{error, info, warn};

/// Usage: green-wallet-sessions [config.json] [network] [wallet_hash_id]
///
/// Prints the sessions a wallet on `network` would open and, when a wallet hash id is given,
/// which of them already hold local state.
#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive("green_wallet_sessions=debug".parse().unwrap())
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let mut args = std::env::args().skip(1);
	let config = match args.next() {
		Some(path) => match SessionConfig::load(&PathBuf::from(&path)).await {
			Ok(config) => config,
			Err(e) => {
				error!("Failed to load config {}: {}", path, e);
				return;
			}
		},
		None => SessionConfig::default(),
	};
	info!("Using datadir {:?}", config.datadir);

	let network = args
		.next()
		.map(|name| NetworkSecurityCase::from_network(&name))
		.unwrap_or(Some(NetworkSecurityCase::BitcoinSS));
	let Some(network) = network else {
		error!("Unknown network");
		return;
	};

	let account = Account::new("diagnostic", "Diagnostic", network);
	let networks = session_networks(&account);
	info!("{} sessions for a {} wallet", networks.len(), network);

	let wallet_hash_id = args.next();
	let state = FileDatadirRepository::new(config.state_dir());
	let lightning = FileDatadirRepository::with_suffix(config.lightning_dir(), "0");
	for case in networks {
		let params = config.network_params(case);
		let Some(wallet_hash_id) = wallet_hash_id.as_deref() else {
			info!("{:<24} electrum: {:?}", case.network(), params.electrum_url);
			continue;
		};
		let exists = if case.multisig() {
			Ok(true)
		} else if case.lightning() {
			lightning.exists(wallet_hash_id).await
		} else {
			state.exists(wallet_hash_id).await
		};
		match exists {
			Ok(exists) => info!("{:<24} datadir: {}", case.network(), exists),
			Err(e) => warn!("{:<24} datadir check failed: {}", case.network(), e),
		}
	}
}
