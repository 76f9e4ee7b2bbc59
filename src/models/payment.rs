// models/payment.rs
use chrono::{DateTime, Utc};
use mongodb::bson;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Lifecycle of a payment attempt.
///
/// `pending` and `processing` are the only mutable states; everything else is
/// terminal. `expired` is reached when no gateway callback arrived within the
/// expiry window, never from the gateway itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed
                | PaymentStatus::Failed
                | PaymentStatus::Cancelled
                | PaymentStatus::Expired
        )
    }

    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Processing, Expired)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    MobileMoney,
    Card,
    BankTransfer,
    Other,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::MobileMoney => "mobile-money",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank-transfer",
            PaymentMethod::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentPurpose {
    Subscription,
    PermitFee,
    InspectionFee,
    LabTest,
    Other,
}

impl PaymentPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentPurpose::Subscription => "subscription",
            PaymentPurpose::PermitFee => "permit-fee",
            PaymentPurpose::InspectionFee => "inspection-fee",
            PaymentPurpose::LabTest => "lab-test",
            PaymentPurpose::Other => "other",
        }
    }
}

/// One payment attempt. Records are never deleted; terminal records form the
/// audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// Unique transaction reference, assigned at creation and immutable.
    pub reference: String,
    pub user_id: String,

    pub amount: f64,
    pub currency: String,
    pub method: PaymentMethod,
    pub purpose: PaymentPurpose,

    /// International format, e.g. 254712345678.
    pub phone_number: String,
    pub description: String,

    pub status: PaymentStatus,

    // Daraja correlators, null until the gateway accepts the push
    pub checkout_request_id: Option<String>,
    pub merchant_request_id: Option<String>,

    pub receipt_number: Option<String>,
    pub result_desc: Option<String>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "optional_chrono_as_bson"
    )]
    pub completed_at: Option<DateTime<Utc>>,
}

/// BSON-datetime (de)serialization for optional timestamps; the helper the
/// non-optional fields use has no `Option` flavor in this bson version.
mod optional_chrono_as_bson {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.map(bson::DateTime::from_chrono).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(Option::<bson::DateTime>::deserialize(deserializer)?.map(|dt| dt.to_chrono()))
    }
}

impl PaymentRecord {
    pub fn new(
        user_id: String,
        amount: f64,
        purpose: PaymentPurpose,
        phone_number: String,
        description: String,
    ) -> Self {
        let now = Utc::now();
        PaymentRecord {
            id: Some(ObjectId::new()),
            reference: format!("AQB-{}", Uuid::new_v4().simple()),
            user_id,
            amount,
            currency: "KES".to_string(),
            method: PaymentMethod::MobileMoney,
            purpose,
            phone_number,
            description,
            status: PaymentStatus::Pending,
            checkout_request_id: None,
            merchant_request_id: None,
            receipt_number: None,
            result_desc: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub phone_number: String,
    #[validate(range(
        min = 1.0,
        max = 70_000.0,
        message = "amount must be between 1 and 70,000 KES"
    ))]
    pub amount: f64,
    pub payment_type: PaymentPurpose,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub account_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatedPayment {
    #[serde(rename = "paymentId")]
    pub payment_id: String,
    #[serde(rename = "checkoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "customerMessage")]
    pub customer_message: String,
}

/// Read-only projection served to clients by the status and history
/// endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub payment_id: String,
    pub reference: String,
    pub status: PaymentStatus,
    pub amount: f64,
    pub currency: String,
    pub method: PaymentMethod,
    pub purpose: PaymentPurpose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_desc: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&PaymentRecord> for PaymentView {
    fn from(record: &PaymentRecord) -> Self {
        PaymentView {
            payment_id: record.id.map(|id| id.to_hex()).unwrap_or_default(),
            reference: record.reference.clone(),
            status: record.status,
            amount: record.amount,
            currency: record.currency.clone(),
            method: record.method,
            purpose: record.purpose,
            receipt_number: record.receipt_number.clone(),
            result_desc: record.result_desc.clone(),
            created_at: record.created_at,
            completed_at: record.completed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u64>,
    pub limit: Option<i64>,
    pub status: Option<PaymentStatus>,
    #[serde(rename = "type")]
    pub purpose: Option<PaymentPurpose>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_accept_no_transition() {
        use PaymentStatus::*;
        for terminal in [Completed, Failed, Cancelled, Expired] {
            assert!(terminal.is_terminal());
            for next in [Pending, Processing, Completed, Failed, Cancelled, Expired] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} -> {next} must be rejected"
                );
            }
        }
    }

    #[test]
    fn lifecycle_edges() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Expired));

        // completed is only reachable once the push was accepted
        assert!(!Pending.can_transition_to(Completed));
        // expiry is a give-up on an in-flight prompt, not an initiation failure
        assert!(!Pending.can_transition_to(Expired));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(
            serde_json::from_str::<PaymentStatus>("\"expired\"").unwrap(),
            PaymentStatus::Expired
        );
    }

    #[test]
    fn purpose_and_method_serialize_kebab_case() {
        assert_eq!(
            serde_json::to_string(&PaymentPurpose::PermitFee).unwrap(),
            "\"permit-fee\""
        );
        assert_eq!(
            serde_json::from_str::<PaymentPurpose>("\"lab-test\"").unwrap(),
            PaymentPurpose::LabTest
        );
        assert_eq!(
            serde_json::to_string(&PaymentMethod::MobileMoney).unwrap(),
            "\"mobile-money\""
        );
    }

    #[test]
    fn new_record_starts_pending_with_unique_reference() {
        let a = PaymentRecord::new(
            "user-1".to_string(),
            5000.0,
            PaymentPurpose::PermitFee,
            "254712345678".to_string(),
            "Permit renewal".to_string(),
        );
        let b = PaymentRecord::new(
            "user-1".to_string(),
            5000.0,
            PaymentPurpose::PermitFee,
            "254712345678".to_string(),
            "Permit renewal".to_string(),
        );

        assert_eq!(a.status, PaymentStatus::Pending);
        assert_eq!(a.currency, "KES");
        assert_eq!(a.method, PaymentMethod::MobileMoney);
        assert!(a.checkout_request_id.is_none());
        assert!(a.receipt_number.is_none());
        assert!(a.reference.starts_with("AQB-"));
        assert_ne!(a.reference, b.reference);
    }

    #[test]
    fn initiate_request_amount_bounds() {
        let mut request = InitiatePaymentRequest {
            phone_number: "0712345678".to_string(),
            amount: 5000.0,
            payment_type: PaymentPurpose::Subscription,
            description: None,
            account_reference: None,
        };
        assert!(request.validate().is_ok());

        request.amount = 0.0;
        assert!(request.validate().is_err());

        request.amount = 80_000.0;
        assert!(request.validate().is_err());
    }

    #[test]
    fn initiate_request_accepts_camel_case_wire_format() {
        let request: InitiatePaymentRequest = serde_json::from_value(serde_json::json!({
            "phoneNumber": "0712345678",
            "amount": 1500,
            "paymentType": "subscription",
        }))
        .unwrap();
        assert_eq!(request.payment_type, PaymentPurpose::Subscription);
        assert!(request.description.is_none());
    }
}
