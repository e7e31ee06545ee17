//! Error types shared across the oracle components

use thiserror::Error;

use crate::models::Identity;

/// Failures reported by a ledger backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("registration fee not met: required {required}, paid {paid}")]
    InsufficientFee { required: u128, paid: u128 },

    #[error("oracle is already registered")]
    AlreadyRegistered,

    #[error("oracle is not registered")]
    NotRegistered,

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("ledger transport error: {0}")]
    Transport(String),

    #[error("malformed ledger response: {0}")]
    Malformed(String),

    #[error("ledger subscription closed")]
    SubscriptionClosed,
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::Transport(err.to_string())
    }
}

/// Why a single oracle could not be registered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("oracle {identity} paid {paid}, registration requires {required}")]
    InsufficientFee {
        identity: Identity,
        required: u128,
        paid: u128,
    },

    #[error("oracle {0} is already registered")]
    AlreadyRegistered(Identity),

    #[error("ledger rejected registration of {identity}: {source}")]
    LedgerRejected {
        identity: Identity,
        #[source]
        source: LedgerError,
    },
}

impl RegistrationError {
    pub fn identity(&self) -> &Identity {
        match self {
            RegistrationError::InsufficientFee { identity, .. } => identity,
            RegistrationError::AlreadyRegistered(identity) => identity,
            RegistrationError::LedgerRejected { identity, .. } => identity,
        }
    }

    pub(crate) fn from_ledger(identity: &Identity, err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFee { required, paid } => RegistrationError::InsufficientFee {
                identity: identity.clone(),
                required,
                paid,
            },
            LedgerError::AlreadyRegistered => RegistrationError::AlreadyRegistered(identity.clone()),
            other => RegistrationError::LedgerRejected {
                identity: identity.clone(),
                source: other,
            },
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountPoolError {
    #[error("ledger exposes {available} accounts, {required} needed ({reserved} reserved + {oracles} oracles)")]
    TooFewAccounts {
        available: usize,
        required: usize,
        reserved: usize,
        oracles: usize,
    },

    #[error("at least one reserved account is required for the contract owner")]
    NoReservedAccounts,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("failed to read secrets file {path}: {reason}")]
    SecretsFile { path: String, reason: String },
}

/// Failures while wiring the service together at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("ledger unavailable during startup: {0}")]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Accounts(#[from] AccountPoolError),
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to subscribe to oracle requests: {0}")]
    Subscribe(#[source] LedgerError),

    #[error("oracle request subscription ended")]
    StreamEnded,
}
