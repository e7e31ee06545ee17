use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

use crate::models::FlightStatus;

/// Accepted-response counters for one round, one per status code.
#[derive(Debug, Default)]
pub struct StatusTally {
    counters: [AtomicU32; FlightStatus::COUNT],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TallyEntry {
    pub status: FlightStatus,
    pub code: u8,
    pub count: u32,
}

impl StatusTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one accepted response and return the new total for `status`.
    pub fn record(&self, status: FlightStatus) -> u32 {
        self.counters[status.slot()].fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn count(&self, status: FlightStatus) -> u32 {
        self.counters[status.slot()].load(Ordering::Acquire)
    }

    pub fn total(&self) -> u32 {
        FlightStatus::ALL.iter().map(|status| self.count(*status)).sum()
    }

    pub fn snapshot(&self) -> Vec<TallyEntry> {
        FlightStatus::ALL
            .iter()
            .map(|status| TallyEntry {
                status: *status,
                code: status.code(),
                count: self.count(*status),
            })
            .collect()
    }
}
