// handlers/callback.rs
//
// Daraja STK result webhook. The provider expects a 200 acknowledgement
// within a short window and will retry on anything else, so the handler acks
// first and applies the result in a detached task. Processing failures are
// logged and swallowed; they must never surface to the provider.
use axum::{extract::State, response::Json};
use mongodb::bson::{self, doc};
use mongodb::Collection;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::models::callback::StkCallbackEnvelope;
use crate::models::payment::{PaymentRecord, PaymentStatus};
use crate::state::AppState;

pub async fn stk_callback(State(state): State<AppState>, body: String) -> Json<Value> {
    tokio::spawn(async move {
        apply_stk_result(state, body).await;
    });

    // Always acknowledge; the provider considers this delivery final.
    Json(json!({
        "ResultCode": 0,
        "ResultDesc": "Accepted",
    }))
}

async fn apply_stk_result(state: AppState, body: String) {
    let envelope: StkCallbackEnvelope = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Discarding malformed STK callback: {}", e);
            return;
        }
    };

    let stk = envelope.body.stk_callback;
    let outcome = stk.outcome();
    let now = bson::DateTime::now();

    let mut set = doc! {
        "status": outcome.as_str(),
        "result_desc": &stk.result_desc,
        "updated_at": now,
    };
    if outcome == PaymentStatus::Completed {
        set.insert("completed_at", now);
        match stk.receipt_number() {
            Some(receipt) => {
                set.insert("receipt_number", receipt);
            }
            None => warn!(
                "Successful callback {} carried no receipt number",
                stk.checkout_request_id
            ),
        }
    }

    let collection: Collection<PaymentRecord> = state.db.collection("payments");

    // Single atomic update guarded on a non-terminal status: duplicate
    // deliveries and late callbacks after expiry match nothing and no-op.
    let filter = doc! {
        "checkout_request_id": &stk.checkout_request_id,
        "status": { "$in": ["pending", "processing"] },
    };

    match collection
        .find_one_and_update(filter, doc! { "$set": set })
        .await
    {
        Ok(Some(previous)) => {
            info!(
                "Payment {} resolved {} -> {} (code {})",
                previous.reference, previous.status, outcome, stk.result_code
            );
            if outcome == PaymentStatus::Completed {
                debug!(
                    "Payment {} confirmed for KSh {:?} from {:?}",
                    previous.reference,
                    stk.confirmed_amount(),
                    stk.payer_phone()
                );
            }
        }
        Ok(None) => {
            match collection
                .find_one(doc! { "checkout_request_id": &stk.checkout_request_id })
                .await
            {
                Ok(Some(existing)) => debug!(
                    "Duplicate STK callback for {} ignored, payment already {} (receipt {:?})",
                    stk.checkout_request_id,
                    existing.status,
                    stk.receipt_number()
                ),
                Ok(None) => warn!(
                    "STK callback for unknown checkout request {}",
                    stk.checkout_request_id
                ),
                Err(e) => error!("Failed to look up STK callback target: {}", e),
            }
        }
        Err(e) => error!("Failed to apply STK callback: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let config = crate::config::AppConfig {
            database_url: "mongodb://127.0.0.1:27017".to_string(),
            database_name: "aquabeacon_test".to_string(),
            jwt_secret: "test-secret".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            payment_expiry_secs: 120,
            daraja: None,
        };
        let client = mongodb::Client::with_uri_str(&config.database_url)
            .await
            .unwrap();
        AppState::new(client.database(&config.database_name), config)
    }

    async fn post_callback(body: &str) -> (axum::http::StatusCode, Value) {
        let app = Router::new()
            .route("/api/mpesa/stkcallback", post(stk_callback))
            .with_state(test_state().await);

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/mpesa/stkcallback")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn acknowledges_malformed_body() {
        let (status, body) = post_callback("definitely not json").await;
        assert_eq!(status, axum::http::StatusCode::OK);
        assert_eq!(body["ResultCode"], 0);
        assert_eq!(body["ResultDesc"], "Accepted");
    }

    #[tokio::test]
    async fn acknowledges_unknown_checkout_request() {
        let payload = json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "m-1",
                    "CheckoutRequestID": "ws_CO_does_not_exist",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully."
                }
            }
        });

        let (status, body) = post_callback(&payload.to_string()).await;
        assert_eq!(status, axum::http::StatusCode::OK);
        assert_eq!(body["ResultCode"], 0);
    }
}
