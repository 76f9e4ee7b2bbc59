// config.rs
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    /// Seconds a payment may sit in `processing` before the sweep expires it.
    pub payment_expiry_secs: u64,
    pub daraja: Option<DarajaConfig>,
}

#[derive(Debug, Clone)]
pub struct DarajaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub short_code: String,
    pub passkey: String,
    /// Public base URL of this deployment, used to build the webhook URL
    /// registered with each STK push.
    pub callback_base_url: String,
    pub environment: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        AppConfig {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "aquabeacon".to_string()),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .expect("PORT must be a number"),
            payment_expiry_secs: env::var("PAYMENT_EXPIRY_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .expect("PAYMENT_EXPIRY_SECS must be a number"),
            daraja: DarajaConfig::from_env(),
        }
    }
}

impl DarajaConfig {
    /// Returns `None` when any Daraja variable is missing so the server can
    /// boot with the payment gateway disabled instead of refusing to start.
    pub fn from_env() -> Option<Self> {
        let required = |key: &str| match env::var(key) {
            Ok(v) if !v.is_empty() => Some(v),
            _ => {
                tracing::warn!("{} not set, M-Pesa gateway will be disabled", key);
                None
            }
        };

        Some(DarajaConfig {
            consumer_key: required("MPESA_CONSUMER_KEY")?,
            consumer_secret: required("MPESA_CONSUMER_SECRET")?,
            short_code: required("MPESA_SHORT_CODE")?,
            passkey: required("MPESA_PASSKEY")?,
            callback_base_url: required("MPESA_CALLBACK_BASE_URL")?,
            environment: env::var("MPESA_ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string()),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn base_url(&self) -> &'static str {
        if self.is_production() {
            "https://api.safaricom.co.ke"
        } else {
            "https://sandbox.safaricom.co.ke"
        }
    }

    pub fn auth_url(&self) -> String {
        format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.base_url()
        )
    }

    pub fn stk_push_url(&self) -> String {
        format!("{}/mpesa/stkpush/v1/processrequest", self.base_url())
    }

    pub fn stk_callback_url(&self) -> String {
        format!(
            "{}/api/mpesa/stkcallback",
            self.callback_base_url.trim_end_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox_config() -> DarajaConfig {
        DarajaConfig {
            consumer_key: "key".to_string(),
            consumer_secret: "secret".to_string(),
            short_code: "174379".to_string(),
            passkey: "passkey".to_string(),
            callback_base_url: "https://api.aquabeacon.co.ke/".to_string(),
            environment: "sandbox".to_string(),
        }
    }

    #[test]
    fn sandbox_urls() {
        let config = sandbox_config();
        assert!(!config.is_production());
        assert_eq!(
            config.auth_url(),
            "https://sandbox.safaricom.co.ke/oauth/v1/generate?grant_type=client_credentials"
        );
        assert_eq!(
            config.stk_push_url(),
            "https://sandbox.safaricom.co.ke/mpesa/stkpush/v1/processrequest"
        );
    }

    #[test]
    fn production_base_url() {
        let mut config = sandbox_config();
        config.environment = "production".to_string();
        assert_eq!(config.base_url(), "https://api.safaricom.co.ke");
    }

    #[test]
    fn callback_url_strips_trailing_slash() {
        let config = sandbox_config();
        assert_eq!(
            config.stk_callback_url(),
            "https://api.aquabeacon.co.ke/api/mpesa/stkcallback"
        );
    }
}
