//! Startup wiring: ledger selection, oracle registration and the engine.

use std::sync::Arc;

use tracing::{info, warn};

use crate::accounts::AccountPool;
use crate::app_state::AppState;
use crate::config::{Config, LedgerConfig};
use crate::consensus::{ConsensusEngine, RoundHistory};
use crate::error::StartupError;
use crate::ledger::{Ledger, RpcLedger, SimulatedLedger};
use crate::services::{status_source, OracleRegistry, RequestListener, ResponseSubmitter};

/// Everything `main` needs to serve and listen.
pub struct Service {
    pub state: AppState,
    pub listener: RequestListener,
}

pub fn connect_ledger(config: &LedgerConfig) -> Arc<dyn Ledger> {
    match config {
        LedgerConfig::Simulated {
            mnemonic,
            accounts,
            seed,
        } => {
            let mut builder = SimulatedLedger::builder()
                .mnemonic(mnemonic.clone())
                .accounts(*accounts);
            if let Some(seed) = seed {
                builder = builder.seed(*seed);
            }
            info!(accounts, "using simulated ledger");
            Arc::new(builder.build())
        }
        LedgerConfig::Rpc { url, poll_interval } => {
            info!(url = %url, poll_ms = poll_interval.as_millis() as u64, "using JSON-RPC ledger");
            Arc::new(RpcLedger::new(url.clone(), *poll_interval))
        }
    }
}

/// Carve the account pool, register every oracle and build the engine.
///
/// Individual registration failures are logged and skipped; only a ledger
/// that cannot list accounts or quote the fee stops startup.
pub async fn bootstrap(ledger: Arc<dyn Ledger>, config: &Config) -> Result<Service, StartupError> {
    let identities = ledger.accounts().await?;
    let accounts = Arc::new(AccountPool::new(
        identities,
        config.reserved_accounts,
        config.oracle_count,
    )?);

    let registry = Arc::new(OracleRegistry::bootstrap(ledger.clone()).await?);
    let summary = registry.register_all(accounts.oracles()).await;
    if summary.registered.is_empty() {
        warn!("no oracles registered; requests will exhaust without responses");
    }

    let source = status_source(config.force_late_airline);
    let source_description = source.describe();
    info!(status_source = %source_description, "oracle status source selected");

    let submitter = Arc::new(ResponseSubmitter::new(ledger.clone(), source));
    let engine = Arc::new(ConsensusEngine::new(
        registry.clone(),
        submitter,
        Arc::new(RoundHistory::new(config.round_history)),
        config.consensus_threshold,
        config.round_timeout,
    ));

    let listener = RequestListener::new(ledger.clone(), engine.clone());
    let state = AppState::new(ledger, accounts, registry, engine, source_description);

    Ok(Service { state, listener })
}
