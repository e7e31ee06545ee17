use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of indexes the ledger assigns to every oracle.
pub const INDEXES_PER_ORACLE: usize = 3;

/// Exclusive upper bound of oracle and request indexes.
pub const MAX_INDEX: u8 = 10;

pub type OracleIndexes = [u8; INDEXES_PER_ORACLE];

/// Opaque actor handle (a ledger address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

/// Flight status outcomes an oracle can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightStatus {
    Unknown,
    OnTime,
    LateAirline,
    LateWeather,
    LateTechnical,
    LateOther,
}

impl FlightStatus {
    pub const COUNT: usize = 6;

    pub const ALL: [FlightStatus; Self::COUNT] = [
        FlightStatus::Unknown,
        FlightStatus::OnTime,
        FlightStatus::LateAirline,
        FlightStatus::LateWeather,
        FlightStatus::LateTechnical,
        FlightStatus::LateOther,
    ];

    /// Wire value understood by the contract.
    pub fn code(self) -> u8 {
        self.slot() as u8 * 10
    }

    pub fn from_code(code: u8) -> Option<Self> {
        if code % 10 != 0 {
            return None;
        }
        Self::from_slot(usize::from(code / 10))
    }

    /// Position of the status in [`FlightStatus::ALL`].
    pub fn slot(self) -> usize {
        match self {
            FlightStatus::Unknown => 0,
            FlightStatus::OnTime => 1,
            FlightStatus::LateAirline => 2,
            FlightStatus::LateWeather => 3,
            FlightStatus::LateTechnical => 4,
            FlightStatus::LateOther => 5,
        }
    }

    pub fn from_slot(slot: usize) -> Option<Self> {
        Self::ALL.get(slot).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            FlightStatus::Unknown => "STATUS_CODE_UNKNOWN",
            FlightStatus::OnTime => "STATUS_CODE_ON_TIME",
            FlightStatus::LateAirline => "STATUS_CODE_LATE_AIRLINE",
            FlightStatus::LateWeather => "STATUS_CODE_LATE_WEATHER",
            FlightStatus::LateTechnical => "STATUS_CODE_LATE_TECHNICAL",
            FlightStatus::LateOther => "STATUS_CODE_LATE_OTHER",
        }
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// A registered oracle and the indexes the ledger assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRecord {
    pub identity: Identity,
    pub indexes: OracleIndexes,
    pub registered_at: DateTime<Utc>,
}

impl OracleRecord {
    pub fn new(identity: Identity, indexes: OracleIndexes) -> Self {
        Self {
            identity,
            indexes,
            registered_at: Utc::now(),
        }
    }

    /// Whether this oracle may answer requests carrying `index`.
    pub fn holds(&self, index: u8) -> bool {
        self.indexes.contains(&index)
    }
}

/// Logical key of the flight being evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlightKey {
    pub airline: Identity,
    pub flight: String,
    pub timestamp: u64,
}

impl fmt::Display for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.airline, self.flight, self.timestamp)
    }
}

/// Payload of an `OracleRequest` ledger event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightRequest {
    pub request_index: u8,
    pub airline: Identity,
    pub flight: String,
    pub timestamp: u64,
}

impl FlightRequest {
    pub fn key(&self) -> FlightKey {
        FlightKey {
            airline: self.airline.clone(),
            flight: self.flight.clone(),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub flight_key: FlightKey,
    pub accepted_code: Option<FlightStatus>,
    pub reached_threshold: bool,
}
