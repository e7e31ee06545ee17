//! Oracle-side services: registration, response submission and the
//! `OracleRequest` listener.

pub mod oracle_registry;
pub mod request_listener;
pub mod response_submitter;

pub use oracle_registry::{OracleRegistry, RegistrationSummary};
pub use request_listener::{restart_backoff, supervise, RequestListener};
pub use response_submitter::{
    status_source, FixedStatusSource, RandomStatusSource, ResponseSubmitter, StatusSource,
};
