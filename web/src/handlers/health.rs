//! Liveness endpoint.

use axum::Json;
use serde::Serialize;

/// Health payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,

    /// Crate version.
    pub version: &'static str,
}

/// GET `/health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
