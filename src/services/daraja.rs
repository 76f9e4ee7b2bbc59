// services/daraja.rs
//
// Safaricom Daraja client: OAuth client-credentials token exchange and STK
// push initiation. The provider confirms the push outcome asynchronously via
// the webhook handled in handlers/callback.rs; nothing here mutates local
// state.
use std::sync::{Arc, RwLock};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::Utc;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::config::DarajaConfig;

/// Daraja rejects STK pushes above this amount.
pub const MAX_STK_AMOUNT: f64 = 70_000.0;

#[derive(Debug, Error)]
pub enum DarajaError {
    /// Token exchange failed. Fatal to the current attempt; callers retry at
    /// their own level.
    #[error("auth failed: {0}")]
    Auth(String),

    /// The push request itself failed, either in transport or because the
    /// provider rejected it.
    #[error("stk push failed: {0}")]
    Request(String),

    #[error("unrecognized phone number format: {0}")]
    InvalidPhone(String),

    #[error("amount out of range: {0}")]
    InvalidAmount(f64),
}

/// Normalizes a Kenyan mobile number to the 254XXXXXXXXX form Daraja
/// requires.
///
/// Accepts `2547…`/`2541…` (optionally with a leading `+`), `07…`/`01…` and
/// the bare `7…`/`1…` subscriber form. Anything else is rejected rather than
/// guessed at; the caller prompts for a corrected number.
pub fn normalize_phone(input: &str) -> Result<String, DarajaError> {
    let trimmed = input.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DarajaError::InvalidPhone(input.to_string()));
    }

    let normalized = match digits.len() {
        12 if digits.starts_with("2547") || digits.starts_with("2541") => digits.to_string(),
        10 if digits.starts_with("07") || digits.starts_with("01") => {
            format!("254{}", &digits[1..])
        }
        9 if digits.starts_with('7') || digits.starts_with('1') => format!("254{}", digits),
        _ => return Err(DarajaError::InvalidPhone(input.to_string())),
    };

    Ok(normalized)
}

pub fn validate_amount(amount: f64) -> Result<(), DarajaError> {
    if amount > 0.0 && amount <= MAX_STK_AMOUNT {
        Ok(())
    } else {
        Err(DarajaError::InvalidAmount(amount))
    }
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: String,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "TransactionType")]
    transaction_type: String,
    #[serde(rename = "Amount")]
    amount: String,
    #[serde(rename = "PartyA")]
    party_a: String,
    #[serde(rename = "PartyB")]
    party_b: String,
    #[serde(rename = "PhoneNumber")]
    phone_number: String,
    #[serde(rename = "CallBackURL")]
    callback_url: String,
    #[serde(rename = "AccountReference")]
    account_reference: String,
    #[serde(rename = "TransactionDesc")]
    transaction_desc: String,
}

#[derive(Debug, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
    #[serde(rename = "CustomerMessage")]
    pub customer_message: String,
}

#[derive(Debug, Clone)]
pub struct DarajaGateway {
    config: DarajaConfig,
    client: Client,
    cached_token: Arc<RwLock<Option<(String, chrono::DateTime<Utc>)>>>,
}

impl DarajaGateway {
    pub fn new(config: DarajaConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        DarajaGateway {
            config,
            client,
            cached_token: Arc::new(RwLock::new(None)),
        }
    }

    fn generate_password(&self, timestamp: &str) -> String {
        let password_string = format!(
            "{}{}{}",
            self.config.short_code, self.config.passkey, timestamp
        );
        base64.encode(password_string)
    }

    pub async fn get_access_token(&self) -> Result<String, DarajaError> {
        {
            let cached = self.cached_token.read().unwrap();
            if let Some((token, expiry)) = cached.as_ref() {
                if *expiry > Utc::now() + chrono::Duration::minutes(5) {
                    return Ok(token.clone());
                }
            }
        }

        info!("Requesting new Daraja access token");
        let auth_string = format!(
            "{}:{}",
            self.config.consumer_key, self.config.consumer_secret
        );
        let encoded_auth = base64.encode(auth_string);

        let response = self
            .client
            .get(self.config.auth_url())
            .header(header::AUTHORIZATION, format!("Basic {}", encoded_auth))
            .send()
            .await
            .map_err(|e| DarajaError::Auth(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Daraja auth failed: {} - {}", status, body);
            return Err(DarajaError::Auth(format!("token endpoint returned {}", status)));
        }

        let auth_response: AuthResponse = response
            .json()
            .await
            .map_err(|e| DarajaError::Auth(format!("malformed token response: {}", e)))?;

        {
            let expiry_time = Utc::now() + chrono::Duration::hours(1);
            let mut cached = self.cached_token.write().unwrap();
            *cached = Some((auth_response.access_token.clone(), expiry_time));
        }

        Ok(auth_response.access_token)
    }

    /// Submits the push. On success the provider prompts the payer's handset
    /// out-of-band and reports the outcome to the registered callback URL.
    pub async fn initiate_stk_push(
        &self,
        amount: f64,
        phone_number: &str,
        account_reference: &str,
        description: &str,
    ) -> Result<StkPushResponse, DarajaError> {
        validate_amount(amount)?;
        let formatted_phone = normalize_phone(phone_number)?;

        let access_token = self.get_access_token().await?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let password = self.generate_password(&timestamp);

        info!(
            "STK push for {} - KSh {} ({})",
            formatted_phone, amount, account_reference
        );

        let stk_request = StkPushRequest {
            business_short_code: self.config.short_code.clone(),
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            // Daraja only accepts whole shillings
            amount: format!("{}", amount.round() as i64),
            party_a: formatted_phone.clone(),
            party_b: self.config.short_code.clone(),
            phone_number: formatted_phone,
            callback_url: self.config.stk_callback_url(),
            account_reference: account_reference.to_string(),
            transaction_desc: description.to_string(),
        };

        let response = self
            .client
            .post(self.config.stk_push_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&stk_request)
            .send()
            .await
            .map_err(|e| DarajaError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("STK push rejected: {} - {}", status, body);
            return Err(DarajaError::Request(format!(
                "push endpoint returned {}",
                status
            )));
        }

        let stk_response: StkPushResponse = response
            .json()
            .await
            .map_err(|e| DarajaError::Request(format!("malformed push response: {}", e)))?;

        info!("STK push accepted: {}", stk_response.checkout_request_id);
        Ok(stk_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DarajaConfig;

    #[test]
    fn normalizes_local_format() {
        assert_eq!(normalize_phone("0712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone("0110345678").unwrap(), "254110345678");
    }

    #[test]
    fn normalizes_international_format() {
        assert_eq!(normalize_phone("254712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone("+254712345678").unwrap(), "254712345678");
    }

    #[test]
    fn normalizes_bare_subscriber_format() {
        assert_eq!(normalize_phone("712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone("110345678").unwrap(), "254110345678");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(normalize_phone(" 0712345678 ").unwrap(), "254712345678");
    }

    #[test]
    fn rejects_ambiguous_input() {
        // not a known mobile prefix
        assert!(normalize_phone("0612345678").is_err());
        // wrong length
        assert!(normalize_phone("07123456").is_err());
        assert!(normalize_phone("25471234567890").is_err());
        // non-digits
        assert!(normalize_phone("07123A5678").is_err());
        assert!(normalize_phone("").is_err());
        // landline country-code form
        assert!(normalize_phone("254201234567").is_err());
    }

    #[test]
    fn amount_bounds() {
        assert!(validate_amount(1.0).is_ok());
        assert!(validate_amount(70_000.0).is_ok());
        assert!(validate_amount(0.0).is_err());
        assert!(validate_amount(-50.0).is_err());
        assert!(validate_amount(70_001.0).is_err());
    }

    #[test]
    fn password_is_base64_of_shortcode_passkey_timestamp() {
        let gateway = DarajaGateway::new(DarajaConfig {
            consumer_key: "key".to_string(),
            consumer_secret: "secret".to_string(),
            short_code: "174379".to_string(),
            passkey: "bfb279f9aa9bdbcf158e97dd71a467cd2e0c893059b10f78e6b72ada1ed2c919"
                .to_string(),
            callback_base_url: "https://api.aquabeacon.co.ke".to_string(),
            environment: "sandbox".to_string(),
        });

        assert_eq!(
            gateway.generate_password("20260807120000"),
            "MTc0Mzc5YmZiMjc5ZjlhYTliZGJjZjE1OGU5N2RkNzFhNDY3Y2QyZTBjODkzMDU5YjEwZjc4ZTZiNzJhZGExZWQyYzkxOTIwMjYwODA3MTIwMDAw"
        );
    }
}
