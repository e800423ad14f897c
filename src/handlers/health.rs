use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::database::Connector;
use crate::state::AppState;

pub async fn health<K: Connector>(State(state): State<AppState<K>>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let active_pools = state.pools.list_active().await.len();

    match state.pools.registry().health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "registry": "ok",
                    "active_pools": active_pools
                }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "registry unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "registry_error": e.to_string(),
                    "active_pools": active_pools
                }
            })),
        ),
    }
}
