use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;

use crate::AppState;

/// Reports whether a store handle is available. A handle that fails its own
/// readiness check is the only unhealthy case.
pub async fn health(State(state): State<AppState>) -> Response {
    let timestamp = Utc::now().to_rfc3339();

    let db_status = match state.store.as_deref() {
        None => Ok("disconnected"),
        Some(store) => store.check().map(|()| "connected"),
    };

    match db_status {
        Ok(db_status) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "cosmos_db": db_status,
                "timestamp": timestamp,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Health check failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                    "timestamp": timestamp,
                })),
            )
                .into_response()
        }
    }
}
