//! Majority agreement over oracle responses.
//!
//! Every `OracleRequest` gets its own [`ConsensusRound`] with a fresh tally;
//! nothing is shared between rounds, so the same request delivered twice is
//! simply evaluated twice.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::models::FlightRequest;
use crate::services::{OracleRegistry, ResponseSubmitter};

pub mod history;
pub mod round;
pub mod tally;

pub use history::RoundHistory;
pub use round::{ConsensusRound, RoundReport, RoundState};
pub use tally::{StatusTally, TallyEntry};

/// Matching accepted responses needed for one status to win a round.
pub const DEFAULT_THRESHOLD: u32 = 3;

pub struct ConsensusEngine {
    registry: Arc<OracleRegistry>,
    submitter: Arc<ResponseSubmitter>,
    history: Arc<RoundHistory>,
    threshold: u32,
    round_timeout: Duration,
}

impl ConsensusEngine {
    pub fn new(
        registry: Arc<OracleRegistry>,
        submitter: Arc<ResponseSubmitter>,
        history: Arc<RoundHistory>,
        threshold: u32,
        round_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            submitter,
            history,
            threshold,
            round_timeout,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn history(&self) -> &Arc<RoundHistory> {
        &self.history
    }

    /// Run one round for `request` to completion and record its report.
    pub async fn process(&self, request: FlightRequest) -> RoundReport {
        let round = ConsensusRound::new(request, self.threshold);
        let flight = round.request().key();
        info!(
            round = %round.id(),
            index = round.request().request_index,
            flight = %flight,
            "consensus round opened"
        );

        self.history.round_started();
        let oracles = self.registry.records();
        let report = round
            .run(&oracles, &self.submitter, self.round_timeout)
            .await;

        match report.outcome {
            RoundState::Decided(status) => {
                info!(
                    round = %report.round_id,
                    flight = %flight,
                    status = %status,
                    accepted = report.accepted,
                    rejected = report.rejected,
                    "consensus round decided"
                );
                if report.credits_insurees() {
                    info!(
                        round = %report.round_id,
                        flight = %flight,
                        airline = %report.request.airline,
                        "flight verified late due to airline, insurees are credited"
                    );
                }
            }
            _ => info!(
                round = %report.round_id,
                flight = %flight,
                matching = report.matching_oracles,
                accepted = report.accepted,
                timed_out = report.timed_out,
                "consensus round exhausted without agreement"
            ),
        }

        self.history.record(report.clone());
        report
    }

    pub fn spawn_round(self: &Arc<Self>, request: FlightRequest) -> JoinHandle<RoundReport> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.process(request).await })
    }
}
