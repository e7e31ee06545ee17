//! Ledger boundary: the on-chain oracle contract as seen from the server.
//!
//! The consensus core never talks to a chain directly. Everything it needs
//! (registration, index lookup, the `OracleRequest` event stream and response
//! submission) goes through [`Ledger`], which has an in-process
//! [`SimulatedLedger`] for local runs and tests and an [`RpcLedger`] for a
//! JSON-RPC gateway in front of a real node.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::LedgerError;
use crate::models::{FlightRequest, FlightStatus, Identity, OracleIndexes};

pub mod rpc;
pub mod simulated;

pub use rpc::RpcLedger;
pub use simulated::{SimulatedLedger, SimulatedLedgerBuilder};

/// Why the ledger declined a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The oracle does not hold the request index.
    IndexMismatch,
    /// No open request exists for the index and flight.
    RequestClosed,
    NotRegistered,
    /// Transport or unexpected revert while submitting.
    Ledger(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Accepted,
    Rejected(RejectReason),
}

impl SubmissionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmissionOutcome::Accepted)
    }
}

/// Live stream of `OracleRequest` events, starting at the ledger head.
pub struct RequestSubscription {
    rx: mpsc::UnboundedReceiver<Result<FlightRequest, LedgerError>>,
    task: Option<JoinHandle<()>>,
}

impl RequestSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Result<FlightRequest, LedgerError>>) -> Self {
        Self { rx, task: None }
    }

    /// Subscription fed by a background task that is aborted on drop.
    pub fn with_task(
        rx: mpsc::UnboundedReceiver<Result<FlightRequest, LedgerError>>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Next event, or `None` once the ledger side has gone away.
    pub async fn next(&mut self) -> Option<Result<FlightRequest, LedgerError>> {
        self.rx.recv().await
    }
}

impl Drop for RequestSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Ordered account list the account pool is carved from.
    async fn accounts(&self) -> Result<Vec<Identity>, LedgerError>;

    async fn fetch_registration_fee(&self) -> Result<u128, LedgerError>;

    async fn register_oracle(&self, identity: &Identity, fee: u128) -> Result<(), LedgerError>;

    async fn get_assigned_indexes(&self, identity: &Identity) -> Result<OracleIndexes, LedgerError>;

    /// Subscribe to `OracleRequest` events emitted from now on.
    async fn subscribe_oracle_requests(&self) -> Result<RequestSubscription, LedgerError>;

    async fn submit_oracle_response(
        &self,
        identity: &Identity,
        request: &FlightRequest,
        status: FlightStatus,
    ) -> Result<SubmissionOutcome, LedgerError>;

    /// Ask the contract to raise an oracle request; returns the request index.
    async fn fetch_flight_status(
        &self,
        caller: &Identity,
        airline: &Identity,
        flight: &str,
        timestamp: u64,
    ) -> Result<u8, LedgerError>;
}
