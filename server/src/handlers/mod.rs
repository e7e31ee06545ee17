//! API handlers for the flight oracle server

pub mod oracle;
pub mod rounds;

use axum::Json;
use serde_json::{json, Value};

pub use oracle::{get_oracle, list_oracles};
pub use rounds::{get_round, list_rounds, request_flight_status, service_status};

pub async fn root() -> &'static str {
    "Flight Oracle Server"
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn api_banner() -> Json<Value> {
    Json(json!({ "message": "An API for use with your Dapp!" }))
}
