//! Health check handler

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

use crate::http::state::AppState;
use crate::store::Store;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp_ms: i64,
}

/// GET /health
///
/// 200 when the store answers, 503 otherwise. Nothing about the failure
/// is exposed in the body.
pub async fn health_check<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let healthy = match &state.db {
        Some(db) => match db.ping().await {
            Ok(latency) => {
                debug!(latency_ms = latency.as_millis() as u64, "Health check: PostgreSQL ok");
                true
            }
            Err(e) => {
                error!(error = %e, "Health check: PostgreSQL ping failed");
                false
            }
        },
        None => true,
    };

    let (status, label) = if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };
    (
        status,
        Json(HealthResponse {
            status: label,
            version: env!("GIT_HASH"),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }),
    )
}
