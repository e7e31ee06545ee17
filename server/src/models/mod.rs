//! Data models for the flight oracle server

use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod oracle;

pub use oracle::{
    ConsensusResult, FlightKey, FlightRequest, FlightStatus, Identity, OracleIndexes,
    OracleRecord, INDEXES_PER_ORACLE, MAX_INDEX,
};

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Request body for asking the ledger to raise an oracle request.
#[derive(Debug, Deserialize, Validate)]
pub struct FetchFlightStatusRequest {
    /// Defaults to the airline registered at contract deployment.
    pub airline: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub flight: String,
    #[validate(range(min = 1))]
    pub timestamp: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FetchFlightStatusResponse {
    pub request_index: u8,
    pub airline: Identity,
    pub flight: String,
    pub timestamp: u64,
}

#[derive(Debug, Deserialize)]
pub struct ListRoundsQuery {
    pub limit: Option<usize>,
}

/// Snapshot of the oracle pool served by `/api/status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub registered_oracles: usize,
    /// Decimal string; the fee does not fit a JSON number.
    pub registration_fee: String,
    pub status_source: String,
    pub consensus_threshold: u32,
    pub rounds_recorded: usize,
    pub rounds_in_flight: usize,
}
