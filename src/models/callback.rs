// models/callback.rs
//
// Wire format of the Daraja STK result webhook. Field names follow the
// provider's PascalCase JSON exactly.
use serde::Deserialize;

use crate::models::payment::PaymentStatus;

/// Daraja result code for a prompt the payer dismissed on the handset.
pub const RESULT_CODE_CANCELLED_BY_USER: i64 = 1032;

#[derive(Debug, Deserialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: StkCallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,

    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,

    #[serde(rename = "ResultCode")]
    pub result_code: i64,

    #[serde(rename = "ResultDesc")]
    pub result_desc: String,

    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item")]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Value", default)]
    pub value: serde_json::Value,
}

impl StkCallback {
    /// Terminal status this result maps to. Code 0 is success; 1032 or a
    /// cancellation description means the payer declined, anything else
    /// failed.
    pub fn outcome(&self) -> PaymentStatus {
        if self.result_code == 0 {
            PaymentStatus::Completed
        } else if self.result_code == RESULT_CODE_CANCELLED_BY_USER
            || self.result_desc.to_lowercase().contains("cancel")
        {
            PaymentStatus::Cancelled
        } else {
            PaymentStatus::Failed
        }
    }

    /// Metadata values arrive as either strings or numbers.
    fn metadata_value(&self, name: &str) -> Option<&serde_json::Value> {
        self.callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)
            .map(|item| &item.value)
    }

    fn metadata_string(&self, name: &str) -> Option<String> {
        match self.metadata_value(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn receipt_number(&self) -> Option<String> {
        self.metadata_string("MpesaReceiptNumber")
    }

    pub fn confirmed_amount(&self) -> Option<f64> {
        self.metadata_value("Amount")?.as_f64()
    }

    pub fn payer_phone(&self) -> Option<String> {
        self.metadata_string("PhoneNumber")
    }
}
