use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::handlers::payments;
use crate::middleware::auth::require_auth;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/initiate", post(payments::initiate_payment))
        .route("/:id/status", get(payments::payment_status))
        .route("/history", get(payments::payment_history))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}
