// client/mod.rs
//
// Client-side half of the payment flow: the API wrapper, the status poller
// and the checkout session that drives a payment attempt from phone entry to
// a terminal outcome. The web frontend embeds the same flow; this module is
// the reference implementation the mobile tooling links against.
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::models::payment::{InitiatePaymentRequest, InitiatedPayment, PaymentView};

pub mod checkout;
pub mod poller;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Api(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ApiEnvelope<T> {
    success: bool,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self) -> Result<T, ClientError> {
        if self.success {
            self.data
                .ok_or_else(|| ClientError::Decode("missing data field".to_string()))
        } else {
            Err(ClientError::Api(
                self.message.unwrap_or_else(|| "request failed".to_string()),
            ))
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentsApi {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl PaymentsApi {
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        PaymentsApi {
            http,
            base_url: base_url.into(),
            bearer_token: bearer_token.into(),
        }
    }

    pub async fn initiate(
        &self,
        request: &InitiatePaymentRequest,
    ) -> Result<InitiatedPayment, ClientError> {
        let envelope: ApiEnvelope<InitiatedPayment> = self
            .http
            .post(format!("{}/api/payments/initiate", self.base_url))
            .bearer_auth(&self.bearer_token)
            .json(request)
            .send()
            .await?
            .json()
            .await?;

        envelope.into_data()
    }

    pub async fn status(&self, payment_id: &str) -> Result<PaymentView, ClientError> {
        let envelope: ApiEnvelope<PaymentView> = self
            .http
            .get(format!(
                "{}/api/payments/{}/status",
                self.base_url, payment_id
            ))
            .bearer_auth(&self.bearer_token)
            .send()
            .await?
            .json()
            .await?;

        envelope.into_data()
    }
}
