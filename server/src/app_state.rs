//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::accounts::AccountPool;
use crate::consensus::{ConsensusEngine, RoundHistory};
use crate::ledger::Ledger;
use crate::services::OracleRegistry;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn Ledger>,
    pub accounts: Arc<AccountPool>,
    pub registry: Arc<OracleRegistry>,
    pub engine: Arc<ConsensusEngine>,
    /// How oracle answers are produced, e.g. `random`.
    pub status_source: String,
}

impl AppState {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        accounts: Arc<AccountPool>,
        registry: Arc<OracleRegistry>,
        engine: Arc<ConsensusEngine>,
        status_source: String,
    ) -> Self {
        Self {
            ledger,
            accounts,
            registry,
            engine,
            status_source,
        }
    }

    pub fn history(&self) -> &Arc<RoundHistory> {
        self.engine.history()
    }
}

impl FromRef<AppState> for Arc<OracleRegistry> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.registry.clone()
    }
}

impl FromRef<AppState> for Arc<RoundHistory> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.engine.history().clone()
    }
}
