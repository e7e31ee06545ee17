//! One consensus round per `OracleRequest`.
//!
//! The round state lives in a single atomic word: `OPEN`, `EXHAUSTED`, or
//! `DECIDED_BASE + slot` where `slot` identifies the winning status. Moving
//! out of `OPEN` is one compare-and-set, so two codes reaching the threshold
//! at the same time cannot both win.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tracing::{debug, info, trace};
use uuid::Uuid;

use super::tally::{StatusTally, TallyEntry};
use crate::ledger::SubmissionOutcome;
use crate::models::{ConsensusResult, FlightRequest, FlightStatus, OracleRecord};
use crate::services::ResponseSubmitter;

const OPEN: u8 = 0;
const EXHAUSTED: u8 = 1;
const DECIDED_BASE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "status", rename_all = "snake_case")]
pub enum RoundState {
    Open,
    Decided(FlightStatus),
    /// Every oracle was evaluated, or the round timed out, below threshold.
    Exhausted,
}

impl RoundState {
    fn decode(word: u8) -> Self {
        match word {
            OPEN => RoundState::Open,
            EXHAUSTED => RoundState::Exhausted,
            decided => FlightStatus::from_slot(usize::from(decided - DECIDED_BASE))
                .map(RoundState::Decided)
                .unwrap_or(RoundState::Exhausted),
        }
    }
}

/// Final account of a round, kept for observers.
#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub round_id: Uuid,
    pub request: FlightRequest,
    pub outcome: RoundState,
    pub threshold: u32,
    pub tally: Vec<TallyEntry>,
    pub matching_oracles: u32,
    pub accepted: u32,
    pub rejected: u32,
    /// Accepted after the round was already decided.
    pub late_accepted: u32,
    pub timed_out: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RoundReport {
    pub fn accepted_code(&self) -> Option<FlightStatus> {
        match self.outcome {
            RoundState::Decided(status) => Some(status),
            _ => None,
        }
    }

    pub fn reached_threshold(&self) -> bool {
        self.accepted_code().is_some()
    }

    /// A verified airline delay is the one outcome that pays insurees.
    pub fn credits_insurees(&self) -> bool {
        self.accepted_code() == Some(FlightStatus::LateAirline)
    }

    pub fn result(&self) -> ConsensusResult {
        ConsensusResult {
            flight_key: self.request.key(),
            accepted_code: self.accepted_code(),
            reached_threshold: self.reached_threshold(),
        }
    }

    pub fn count(&self, status: FlightStatus) -> u32 {
        self.tally
            .iter()
            .find(|entry| entry.status == status)
            .map(|entry| entry.count)
            .unwrap_or_default()
    }
}

pub struct ConsensusRound {
    id: Uuid,
    request: FlightRequest,
    threshold: u32,
    tally: StatusTally,
    state: AtomicU8,
    matching: AtomicU32,
    accepted: AtomicU32,
    rejected: AtomicU32,
    late_accepted: AtomicU32,
    started_at: DateTime<Utc>,
}

impl ConsensusRound {
    pub fn new(request: FlightRequest, threshold: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            threshold: threshold.max(1),
            tally: StatusTally::new(),
            state: AtomicU8::new(OPEN),
            matching: AtomicU32::new(0),
            accepted: AtomicU32::new(0),
            rejected: AtomicU32::new(0),
            late_accepted: AtomicU32::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &FlightRequest {
        &self.request
    }

    pub fn state(&self) -> RoundState {
        RoundState::decode(self.state.load(Ordering::Acquire))
    }

    pub fn tally(&self) -> &StatusTally {
        &self.tally
    }

    /// Count an accepted response. Returns `true` if it decided the round.
    pub fn record_accepted(&self, status: FlightStatus) -> bool {
        let was_open = self.state.load(Ordering::Acquire) == OPEN;
        self.accepted.fetch_add(1, Ordering::AcqRel);

        let count = self.tally.record(status);
        if count >= self.threshold
            && self
                .state
                .compare_exchange(
                    OPEN,
                    DECIDED_BASE + status.slot() as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
        {
            return true;
        }

        if !was_open {
            self.late_accepted.fetch_add(1, Ordering::AcqRel);
        }
        false
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::AcqRel);
    }

    /// Close the round; an undecided round becomes exhausted.
    pub fn finish(&self) -> RoundState {
        let _ = self
            .state
            .compare_exchange(OPEN, EXHAUSTED, Ordering::AcqRel, Ordering::Acquire);
        self.state()
    }

    /// Submit a response for every oracle holding the request index and
    /// tally the verdicts as they complete, in whatever order that is.
    pub async fn run(
        &self,
        oracles: &[OracleRecord],
        submitter: &ResponseSubmitter,
        timeout: Duration,
    ) -> RoundReport {
        let index = self.request.request_index;

        let evaluate = async {
            let mut pending: FuturesUnordered<_> = oracles
                .iter()
                .filter(|oracle| {
                    let holds = oracle.holds(index);
                    if !holds {
                        trace!(
                            round = %self.id,
                            oracle = %oracle.identity,
                            indexes = ?oracle.indexes,
                            index,
                            "oracle does not hold the request index"
                        );
                    }
                    holds
                })
                .map(|oracle| async move {
                    let status = submitter.generate_status();
                    let outcome = submitter.submit(oracle, &self.request, status).await;
                    (oracle, status, outcome)
                })
                .collect();
            self.matching.store(pending.len() as u32, Ordering::Release);

            while let Some((oracle, status, outcome)) = pending.next().await {
                self.observe(oracle, status, outcome);
            }
        };

        let timed_out = tokio::time::timeout(timeout, evaluate).await.is_err();
        self.finish();
        self.snapshot(timed_out)
    }

    fn observe(&self, oracle: &OracleRecord, status: FlightStatus, outcome: SubmissionOutcome) {
        match outcome {
            SubmissionOutcome::Accepted => {
                let decided = self.record_accepted(status);
                debug!(
                    round = %self.id,
                    oracle = %oracle.identity,
                    status = %status,
                    count = self.tally.count(status),
                    "oracle response accepted"
                );
                if decided {
                    info!(
                        round = %self.id,
                        flight = %self.request.key(),
                        status = %status,
                        "status reached consensus threshold"
                    );
                }
            }
            SubmissionOutcome::Rejected(reason) => {
                self.record_rejected();
                debug!(
                    round = %self.id,
                    oracle = %oracle.identity,
                    reason = ?reason,
                    "oracle response rejected"
                );
            }
        }
    }

    /// Report of the round as it stands now.
    pub fn snapshot(&self, timed_out: bool) -> RoundReport {
        RoundReport {
            round_id: self.id,
            request: self.request.clone(),
            outcome: self.state(),
            threshold: self.threshold,
            tally: self.tally.snapshot(),
            matching_oracles: self.matching.load(Ordering::Acquire),
            accepted: self.accepted.load(Ordering::Acquire),
            rejected: self.rejected.load(Ordering::Acquire),
            late_accepted: self.late_accepted.load(Ordering::Acquire),
            timed_out,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::Identity;

    fn request() -> FlightRequest {
        FlightRequest {
            request_index: 4,
            airline: Identity::new("0xairline"),
            flight: "ND1309".to_string(),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn first_status_to_reach_threshold_wins() {
        let round = ConsensusRound::new(request(), 3);
        assert!(!round.record_accepted(FlightStatus::OnTime));
        assert!(!round.record_accepted(FlightStatus::OnTime));
        assert!(!round.record_accepted(FlightStatus::LateWeather));
        assert!(!round.record_accepted(FlightStatus::LateWeather));
        assert!(round.record_accepted(FlightStatus::LateWeather));
        assert_eq!(round.state(), RoundState::Decided(FlightStatus::LateWeather));

        // Later responses are counted but never move the outcome.
        assert!(!round.record_accepted(FlightStatus::OnTime));
        assert_eq!(round.tally().count(FlightStatus::OnTime), 3);
        assert_eq!(round.finish(), RoundState::Decided(FlightStatus::LateWeather));
        assert_eq!(round.late_accepted.load(Ordering::Acquire), 1);
        assert!(!round.snapshot(false).credits_insurees());
    }

    #[test]
    fn finishing_below_threshold_exhausts_the_round() {
        let round = ConsensusRound::new(request(), 3);
        round.record_accepted(FlightStatus::LateOther);
        round.record_rejected();
        assert_eq!(round.state(), RoundState::Open);
        assert_eq!(round.finish(), RoundState::Exhausted);

        // Terminal: a threshold crossing afterwards does not decide it.
        round.record_accepted(FlightStatus::LateOther);
        assert!(!round.record_accepted(FlightStatus::LateOther));
        assert_eq!(round.state(), RoundState::Exhausted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_completions_produce_a_single_winner() {
        let round = Arc::new(ConsensusRound::new(request(), 3));
        let statuses = [
            FlightStatus::OnTime,
            FlightStatus::LateAirline,
            FlightStatus::LateWeather,
            FlightStatus::LateTechnical,
        ];

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let round = Arc::clone(&round);
                let status = statuses[i % statuses.len()];
                tokio::spawn(async move { round.record_accepted(status) })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(round.tally().total(), 64);
        assert!(matches!(round.state(), RoundState::Decided(_)));
    }

    #[test]
    fn report_exposes_consensus_result() {
        let round = ConsensusRound::new(request(), 1);
        round.record_accepted(FlightStatus::LateAirline);
        round.finish();
        let report = round.snapshot(false);

        assert_eq!(report.accepted_code(), Some(FlightStatus::LateAirline));
        assert!(report.credits_insurees());
        assert_eq!(report.count(FlightStatus::LateAirline), 1);
        assert_eq!(
            report.result(),
            ConsensusResult {
                flight_key: request().key(),
                accepted_code: Some(FlightStatus::LateAirline),
                reached_threshold: true,
            }
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"]["state"], "decided");
        assert_eq!(json["outcome"]["status"], "LATE_AIRLINE");
    }
}
