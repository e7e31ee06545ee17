//! Recent round outcomes, kept for the status API and observers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;
use uuid::Uuid;

use super::round::RoundReport;

const BROADCAST_CAPACITY: usize = 64;

pub struct RoundHistory {
    capacity: usize,
    reports: RwLock<VecDeque<RoundReport>>,
    in_flight: AtomicUsize,
    events: broadcast::Sender<RoundReport>,
}

impl RoundHistory {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            capacity: capacity.max(1),
            reports: RwLock::new(VecDeque::new()),
            in_flight: AtomicUsize::new(0),
            events,
        }
    }

    pub fn round_started(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    /// Store a finished round, evicting the oldest beyond capacity.
    pub fn record(&self, report: RoundReport) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        {
            let mut reports = self.reports.write().unwrap_or_else(PoisonError::into_inner);
            reports.push_back(report.clone());
            while reports.len() > self.capacity {
                reports.pop_front();
            }
        }

        // No receivers is fine.
        let _ = self.events.send(report);
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<RoundReport> {
        self.reports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get(&self, round_id: Uuid) -> Option<RoundReport> {
        self.reports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|report| report.round_id == round_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.reports.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundReport> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::round::ConsensusRound;
    use crate::models::{FlightRequest, Identity};

    fn report(flight: &str) -> RoundReport {
        let round = ConsensusRound::new(
            FlightRequest {
                request_index: 1,
                airline: Identity::new("0xairline"),
                flight: flight.to_string(),
                timestamp: 1,
            },
            3,
        );
        round.finish();
        round.snapshot(false)
    }

    #[test]
    fn keeps_only_the_newest_reports() {
        let history = RoundHistory::new(2);
        history.record(report("A"));
        history.record(report("B"));
        history.record(report("C"));

        let flights: Vec<String> = history
            .recent(10)
            .into_iter()
            .map(|r| r.request.flight)
            .collect();
        assert_eq!(flights, vec!["C", "B"]);
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn tracks_in_flight_rounds_and_notifies_observers() {
        let history = RoundHistory::new(10);
        let mut events = history.subscribe();

        history.round_started();
        assert_eq!(history.in_flight(), 1);

        let finished = report("D");
        let id = finished.round_id;
        history.record(finished);
        assert_eq!(history.in_flight(), 0);
        assert_eq!(events.recv().await.unwrap().round_id, id);
        assert!(history.get(id).is_some());
        assert!(history.get(Uuid::new_v4()).is_none());
    }
}
