use axum::{
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use crate::handlers::callback;
use crate::state::AppState;

// Daraja does not sign STK callbacks, so this route carries no auth; the
// status-guarded record update bounds what a forged delivery can change.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stkcallback", post(callback::stk_callback))
        .route("/health", get(mpesa_health))
}

async fn mpesa_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "mpesa",
        "timestamp": Utc::now().to_rfc3339(),
        "features": ["stk-push", "stk-callback"],
    }))
}
