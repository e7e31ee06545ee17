//! Flight Oracle Server Library
//!
//! Registers a pool of flight-status oracles against the ledger, answers
//! every `OracleRequest` the ledger emits and tracks whether the answers
//! reach majority agreement.

pub mod accounts;
pub mod app_state;
pub mod bootstrap;
pub mod config;
pub mod consensus;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;
pub mod shutdown;
