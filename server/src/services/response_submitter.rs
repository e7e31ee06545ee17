//! Status generation and response submission for a single oracle.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::ledger::{Ledger, RejectReason, SubmissionOutcome};
use crate::models::{FlightRequest, FlightStatus, OracleRecord};

/// Where an oracle's answer comes from.
pub trait StatusSource: Send + Sync {
    fn next_status(&self) -> FlightStatus;

    fn describe(&self) -> String;
}

/// Uniform pick over every status code.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomStatusSource;

impl StatusSource for RandomStatusSource {
    fn next_status(&self) -> FlightStatus {
        FlightStatus::ALL
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(FlightStatus::Unknown)
    }

    fn describe(&self) -> String {
        "random".to_string()
    }
}

/// Always answers with the same status, for reproducible rounds.
#[derive(Debug, Clone, Copy)]
pub struct FixedStatusSource(pub FlightStatus);

impl FixedStatusSource {
    pub fn late_airline() -> Self {
        Self(FlightStatus::LateAirline)
    }
}

impl StatusSource for FixedStatusSource {
    fn next_status(&self) -> FlightStatus {
        self.0
    }

    fn describe(&self) -> String {
        format!("fixed:{}", self.0.name())
    }
}

/// Pick the status source selected by the `FORCE_LATE_AIRLINE` toggle.
pub fn status_source(force_late_airline: bool) -> Arc<dyn StatusSource> {
    if force_late_airline {
        Arc::new(FixedStatusSource::late_airline())
    } else {
        Arc::new(RandomStatusSource)
    }
}

pub struct ResponseSubmitter {
    ledger: Arc<dyn Ledger>,
    source: Arc<dyn StatusSource>,
}

impl ResponseSubmitter {
    pub fn new(ledger: Arc<dyn Ledger>, source: Arc<dyn StatusSource>) -> Self {
        Self { ledger, source }
    }

    pub fn generate_status(&self) -> FlightStatus {
        self.source.next_status()
    }

    pub fn source_description(&self) -> String {
        self.source.describe()
    }

    /// One submission, no retries. Rejections are an expected outcome.
    pub async fn submit(
        &self,
        oracle: &OracleRecord,
        request: &FlightRequest,
        status: FlightStatus,
    ) -> SubmissionOutcome {
        match self
            .ledger
            .submit_oracle_response(&oracle.identity, request, status)
            .await
        {
            Ok(outcome) => {
                debug!(
                    oracle = %oracle.identity,
                    index = request.request_index,
                    flight = %request.flight,
                    status = %status,
                    accepted = outcome.is_accepted(),
                    "oracle response submitted"
                );
                outcome
            }
            Err(err) => {
                warn!(
                    oracle = %oracle.identity,
                    flight = %request.flight,
                    error = %err,
                    "oracle response could not be submitted"
                );
                SubmissionOutcome::Rejected(RejectReason::Ledger(err.to_string()))
            }
        }
    }
}
