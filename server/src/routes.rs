//! Route definitions for the flight oracle API

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::app_state::AppState;
use crate::handlers::*;

pub fn oracle_routes() -> Router<AppState> {
    Router::new()
        .route("/api/oracles", get(list_oracles))
        .route("/api/oracles/:identity", get(get_oracle))
}

pub fn round_routes() -> Router<AppState> {
    Router::new()
        .route("/api/rounds", get(list_rounds))
        .route("/api/rounds/:id", get(get_round))
        .route("/api/status", get(service_status))
        .route("/api/flights/status", post(request_flight_status))
}

/// Full application router with CORS and request tracing.
pub fn app(state: AppState, cors_allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api", get(api_banner))
        .merge(oracle_routes())
        .merge(round_routes())
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(cors_allowed_origins))
        .with_state(state)
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allowed_origins = allowed_origins
        .iter()
        .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(false)
}
