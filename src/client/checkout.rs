// client/checkout.rs
//
// Checkout session: the state machine behind the payment dialog. Collects a
// phone number, pushes the prompt for the plan's fixed amount, then follows
// the poller to a terminal view state.
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::poller::{PollConfig, PollError, PollOutcome, StatusPoller};
use crate::client::PaymentsApi;
use crate::models::payment::{InitiatePaymentRequest, PaymentPurpose, PaymentStatus};
use crate::services::daraja::normalize_phone;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPlan {
    Starter,
    Business,
    Enterprise,
}

impl SubscriptionPlan {
    /// Plan price in KES. Fixed; the checkout form never lets the payer edit
    /// the amount.
    pub fn amount(self) -> f64 {
        match self {
            SubscriptionPlan::Starter => 1_500.0,
            SubscriptionPlan::Business => 4_500.0,
            SubscriptionPlan::Enterprise => 12_000.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SubscriptionPlan::Starter => "Starter",
            SubscriptionPlan::Business => "Business",
            SubscriptionPlan::Enterprise => "Enterprise",
        }
    }
}

/// View states of the checkout dialog.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutState {
    Idle,
    AwaitingPin { payment_id: String },
    Completed { receipt_number: Option<String> },
    Failed { message: String },
    Expired,
}

impl CheckoutState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckoutState::Completed { .. } | CheckoutState::Failed { .. } | CheckoutState::Expired
        )
    }

    pub fn can_retry(&self) -> bool {
        matches!(self, CheckoutState::Failed { .. } | CheckoutState::Expired)
    }

    /// Icon and message rendered under the dialog header.
    pub fn status_line(&self) -> (&'static str, String) {
        match self {
            CheckoutState::Idle => ("·", "Enter your M-Pesa number to pay".to_string()),
            CheckoutState::AwaitingPin { .. } => (
                "⏳",
                "Check your phone and enter your M-Pesa PIN".to_string(),
            ),
            CheckoutState::Completed { receipt_number } => (
                "✔",
                match receipt_number {
                    Some(receipt) => format!("Payment received. Receipt {}", receipt),
                    None => "Payment received".to_string(),
                },
            ),
            CheckoutState::Failed { message } => ("✖", format!("Payment failed: {}", message)),
            CheckoutState::Expired => (
                "✖",
                "Payment timed out. No charge was made.".to_string(),
            ),
        }
    }
}

/// Converts a normalized 254XXXXXXXXX number back to the local form shown in
/// the phone field.
pub fn display_phone(msisdn: &str) -> String {
    match msisdn.strip_prefix("254") {
        Some(rest) if rest.len() == 9 => format!("0{}", rest),
        _ => msisdn.to_string(),
    }
}

pub struct CheckoutSession {
    api: PaymentsApi,
    poller: StatusPoller,
    plan: SubscriptionPlan,
    phone: Option<String>,
    state: CheckoutState,
    cancel: Option<CancellationToken>,
}

impl CheckoutSession {
    /// `profile_phone` pre-fills the phone field when the user's profile has
    /// one.
    pub fn new(
        api: PaymentsApi,
        poll_config: PollConfig,
        plan: SubscriptionPlan,
        profile_phone: Option<String>,
    ) -> Self {
        CheckoutSession {
            poller: StatusPoller::new(api.clone(), poll_config),
            api,
            plan,
            phone: profile_phone,
            state: CheckoutState::Idle,
            cancel: None,
        }
    }

    pub fn state(&self) -> &CheckoutState {
        &self.state
    }

    pub fn plan(&self) -> SubscriptionPlan {
        self.plan
    }

    pub fn amount(&self) -> f64 {
        self.plan.amount()
    }

    pub fn set_phone(&mut self, phone: impl Into<String>) {
        self.phone = Some(phone.into());
    }

    pub fn display_phone(&self) -> Option<String> {
        self.phone.as_deref().map(display_phone)
    }

    /// Runs one payment attempt to a terminal state. Any poll loop left over
    /// from a previous attempt is cancelled first.
    pub async fn submit(&mut self) -> &CheckoutState {
        self.cancel_in_flight();

        let phone = match &self.phone {
            Some(phone) => phone.clone(),
            None => {
                self.state = CheckoutState::Failed {
                    message: "Phone number is required".to_string(),
                };
                return &self.state;
            }
        };

        // reject ambiguous numbers here so the form can prompt for a fix
        let msisdn = match normalize_phone(&phone) {
            Ok(msisdn) => msisdn,
            Err(e) => {
                self.state = CheckoutState::Failed {
                    message: e.to_string(),
                };
                return &self.state;
            }
        };

        let request = InitiatePaymentRequest {
            phone_number: msisdn,
            amount: self.plan.amount(),
            payment_type: PaymentPurpose::Subscription,
            description: Some(format!("AquaBeacon {} plan", self.plan.name())),
            account_reference: None,
        };

        let initiated = match self.api.initiate(&request).await {
            Ok(initiated) => initiated,
            Err(e) => {
                self.state = CheckoutState::Failed {
                    message: e.to_string(),
                };
                return &self.state;
            }
        };

        info!(
            "Checkout initiated payment {} ({})",
            initiated.payment_id, initiated.checkout_request_id
        );

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        self.state = CheckoutState::AwaitingPin {
            payment_id: initiated.payment_id.clone(),
        };

        match self
            .poller
            .wait_for_outcome(&initiated.payment_id, &cancel)
            .await
        {
            Ok(PollOutcome::Resolved(view)) => {
                self.state = match view.status {
                    PaymentStatus::Completed => CheckoutState::Completed {
                        receipt_number: view.receipt_number,
                    },
                    // a prompt declined on the handset reads as a failure
                    // with a retry affordance
                    PaymentStatus::Cancelled | PaymentStatus::Failed => CheckoutState::Failed {
                        message: view
                            .result_desc
                            .unwrap_or_else(|| "The payment was not completed".to_string()),
                    },
                    PaymentStatus::Expired => CheckoutState::Expired,
                    PaymentStatus::Pending | PaymentStatus::Processing => {
                        unreachable!("poller only resolves terminal statuses")
                    }
                };
            }
            Ok(PollOutcome::TimedOut) => {
                self.state = CheckoutState::Expired;
            }
            Err(PollError::Cancelled) => {
                // dismissed mid-flight; leave the state as the dialog showed it
            }
        }

        self.cancel = None;
        &self.state
    }

    /// Resets a failed or expired attempt back to the form. The plan and
    /// amount survive the reset.
    pub fn retry(&mut self) -> bool {
        if self.state.can_retry() {
            self.state = CheckoutState::Idle;
            true
        } else {
            false
        }
    }

    /// Closes the dialog; any in-flight poll is cancelled so a late outcome
    /// cannot re-animate it.
    pub fn dismiss(&mut self) {
        self.cancel_in_flight();
    }

    /// Token for the current attempt, if one is in flight. The dialog's
    /// close button holds this so dismissal works while `submit` is pending.
    pub fn cancellation_handle(&self) -> Option<CancellationToken> {
        self.cancel.clone()
    }

    fn cancel_in_flight(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}
