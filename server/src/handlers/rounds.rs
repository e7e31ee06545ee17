use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::consensus::{RoundHistory, RoundReport};
use crate::models::{
    ApiResponse, FetchFlightStatusRequest, FetchFlightStatusResponse, Identity, ListRoundsQuery,
    ServiceStatus,
};

const DEFAULT_ROUND_LIMIT: usize = 20;

/// Most recent rounds first.
pub async fn list_rounds(
    State(history): State<Arc<RoundHistory>>,
    Query(query): Query<ListRoundsQuery>,
) -> Json<ApiResponse<Vec<RoundReport>>> {
    let limit = query.limit.unwrap_or(DEFAULT_ROUND_LIMIT);
    Json(ApiResponse::ok(history.recent(limit)))
}

pub async fn get_round(
    State(history): State<Arc<RoundHistory>>,
    Path(round_id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse<RoundReport>>) {
    match history.get(round_id) {
        Some(report) => (StatusCode::OK, Json(ApiResponse::ok(report))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err("Round not found")),
        ),
    }
}

pub async fn service_status(State(state): State<AppState>) -> Json<ApiResponse<ServiceStatus>> {
    let history = state.history();
    Json(ApiResponse::ok(ServiceStatus {
        registered_oracles: state.registry.len(),
        registration_fee: state.registry.fee().to_string(),
        status_source: state.status_source.clone(),
        consensus_threshold: state.engine.threshold(),
        rounds_recorded: history.len(),
        rounds_in_flight: history.in_flight(),
    }))
}

/// Ask the ledger to raise an `OracleRequest` for a flight.
///
/// The request is answered asynchronously: the listener picks up the event
/// and the resulting round shows up under `/api/rounds`.
pub async fn request_flight_status(
    State(state): State<AppState>,
    Json(payload): Json<FetchFlightStatusRequest>,
) -> (StatusCode, Json<ApiResponse<FetchFlightStatusResponse>>) {
    if let Err(e) = payload.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::err(format!("Validation error: {}", e))),
        );
    }

    let airline = match payload.airline.as_deref().map(str::trim) {
        Some(address) if !address.is_empty() => Identity::new(address),
        _ => state.accounts.first_airline().clone(),
    };
    let caller = state.accounts.owner();

    match state
        .ledger
        .fetch_flight_status(caller, &airline, &payload.flight, payload.timestamp)
        .await
    {
        Ok(request_index) => {
            info!(
                index = request_index,
                airline = %airline,
                flight = %payload.flight,
                timestamp = payload.timestamp,
                "flight status requested"
            );
            (
                StatusCode::ACCEPTED,
                Json(ApiResponse::ok(FetchFlightStatusResponse {
                    request_index,
                    airline,
                    flight: payload.flight,
                    timestamp: payload.timestamp,
                })),
            )
        }
        Err(e) => {
            warn!(flight = %payload.flight, error = %e, "flight status request failed");
            (StatusCode::BAD_GATEWAY, Json(ApiResponse::err(e.to_string())))
        }
    }
}
