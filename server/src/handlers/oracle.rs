use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::models::{ApiResponse, Identity, OracleRecord};
use crate::services::OracleRegistry;

pub async fn list_oracles(
    State(registry): State<Arc<OracleRegistry>>,
) -> Json<ApiResponse<Vec<OracleRecord>>> {
    Json(ApiResponse::ok(registry.records()))
}

pub async fn get_oracle(
    State(registry): State<Arc<OracleRegistry>>,
    Path(identity): Path<String>,
) -> (StatusCode, Json<ApiResponse<OracleRecord>>) {
    match registry.get(&Identity::new(identity)) {
        Some(record) => (StatusCode::OK, Json(ApiResponse::ok(record))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err("Oracle not registered")),
        ),
    }
}
