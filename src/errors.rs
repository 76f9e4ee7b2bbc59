// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::daraja::DarajaError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("M-Pesa authentication failed: {0}")]
    GatewayAuth(String),

    #[error("M-Pesa request failed: {0}")]
    GatewayRequest(String),

    #[error("Payment not found")]
    PaymentNotFound,

    #[error("Invalid ObjectId: {0}")]
    InvalidObjectId(String),

    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error")]
    AuthError,

    #[error("Unauthorized access")]
    Unauthorized,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::MongoDB(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
            AppError::GatewayAuth(_) => (StatusCode::BAD_GATEWAY, "M-Pesa error"),
            AppError::GatewayRequest(_) => (StatusCode::BAD_GATEWAY, "M-Pesa error"),
            AppError::PaymentNotFound => (StatusCode::NOT_FOUND, "Payment not found"),
            AppError::InvalidObjectId(_) => (StatusCode::BAD_REQUEST, "Invalid ID format"),
            AppError::InvalidPhoneNumber(_) => (StatusCode::BAD_REQUEST, "Invalid phone number"),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Validation failed"),
            AppError::AuthError => (StatusCode::UNAUTHORIZED, "Authentication failed"),
            AppError::Unauthorized => (StatusCode::FORBIDDEN, "Unauthorized access"),
            AppError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
            "success": false,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

impl From<DarajaError> for AppError {
    fn from(err: DarajaError) -> Self {
        match err {
            DarajaError::Auth(msg) => AppError::GatewayAuth(msg),
            DarajaError::Request(msg) => AppError::GatewayRequest(msg),
            DarajaError::InvalidPhone(phone) => AppError::InvalidPhoneNumber(phone),
            DarajaError::InvalidAmount(amount) => {
                AppError::ValidationError(format!("invalid amount: {}", amount))
            }
        }
    }
}

impl From<mongodb::bson::oid::Error> for AppError {
    fn from(err: mongodb::bson::oid::Error) -> Self {
        AppError::InvalidObjectId(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
