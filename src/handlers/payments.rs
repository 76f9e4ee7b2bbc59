// handlers/payments.rs
use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use futures_util::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId};
use mongodb::Collection;
use serde_json::json;
use tracing::{error, info, warn};
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::payment::{
    HistoryQuery, InitiatePaymentRequest, InitiatedPayment, PaymentRecord, PaymentView,
};
use crate::models::user::Claims;
use crate::services::daraja;
use crate::state::AppState;

fn payments(state: &AppState) -> Collection<PaymentRecord> {
    state.db.collection("payments")
}

/// Creates a payment record and pushes the STK prompt to the payer's phone.
/// The record is persisted as `pending` before the gateway is contacted, so
/// every attempt leaves an audit trail whatever the gateway does.
pub async fn initiate_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<Json<serde_json::Value>> {
    payload.validate()?;

    let gateway = state
        .daraja
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("M-Pesa gateway is not configured".into()))?;

    let phone = daraja::normalize_phone(&payload.phone_number)?;
    let description = payload
        .description
        .clone()
        .unwrap_or_else(|| format!("AquaBeacon {}", payload.payment_type.as_str()));

    let record = PaymentRecord::new(
        claims.sub.clone(),
        payload.amount,
        payload.payment_type,
        phone.clone(),
        description.clone(),
    );
    let record_id = record.id.expect("new records carry an id");

    let collection = payments(&state);
    collection.insert_one(&record).await?;

    let account_reference = payload
        .account_reference
        .as_deref()
        .unwrap_or(&record.reference);

    match gateway
        .initiate_stk_push(payload.amount, &phone, account_reference, &description)
        .await
    {
        Ok(push) => {
            collection
                .update_one(
                    doc! { "_id": record_id, "status": "pending" },
                    doc! { "$set": {
                        "status": "processing",
                        "checkout_request_id": &push.checkout_request_id,
                        "merchant_request_id": &push.merchant_request_id,
                        "updated_at": bson::DateTime::now(),
                    }},
                )
                .await?;

            info!(
                "Payment {} processing, checkout request {}",
                record.reference, push.checkout_request_id
            );

            let initiated = InitiatedPayment {
                payment_id: record_id.to_hex(),
                checkout_request_id: push.checkout_request_id,
                customer_message: push.customer_message,
            };

            Ok(Json(json!({
                "success": true,
                "data": initiated,
            })))
        }
        Err(e) => {
            warn!("Payment {} failed at initiation: {}", record.reference, e);
            if let Err(db_err) = collection
                .update_one(
                    doc! { "_id": record_id, "status": "pending" },
                    doc! { "$set": {
                        "status": "failed",
                        "result_desc": e.to_string(),
                        "updated_at": bson::DateTime::now(),
                    }},
                )
                .await
            {
                error!(
                    "Failed to mark payment {} as failed: {}",
                    record.reference, db_err
                );
            }
            Err(e.into())
        }
    }
}

/// Read-only status projection the frontend polls until a terminal state.
pub async fn payment_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let object_id = ObjectId::parse_str(&id)?;

    let record = payments(&state)
        .find_one(doc! { "_id": object_id, "user_id": &claims.sub })
        .await?
        .ok_or(AppError::PaymentNotFound)?;

    Ok(Json(json!({
        "success": true,
        "data": PaymentView::from(&record),
    })))
}

pub async fn payment_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let mut filter = doc! { "user_id": &claims.sub };
    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }
    if let Some(purpose) = query.purpose {
        filter.insert("purpose", purpose.as_str());
    }

    let collection = payments(&state);
    let total = collection.count_documents(filter.clone()).await?;

    let records: Vec<PaymentRecord> = collection
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip((page - 1) * limit as u64)
        .limit(limit)
        .await?
        .try_collect()
        .await?;

    let views: Vec<PaymentView> = records.iter().map(PaymentView::from).collect();
    let total_pages = (total + limit as u64 - 1) / limit as u64;

    Ok(Json(json!({
        "success": true,
        "data": {
            "payments": views,
            "page": page,
            "limit": limit,
            "total": total,
            "totalPages": total_pages,
        },
    })))
}
