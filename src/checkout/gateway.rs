use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::Cents;

#[derive(Debug)]
pub enum PaymentError {
    /// Transport failure talking to the processor.
    Http(String),
    /// The processor answered with an error status.
    Api { status: u16, message: String },
    /// The processor's answer could not be decoded.
    Decode(String),
    SessionNotFound(String),
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentError::Http(e) => write!(f, "payment processor unreachable: {e}"),
            PaymentError::Api { status, message } => {
                write!(f, "payment processor error ({status}): {message}")
            }
            PaymentError::Decode(e) => write!(f, "unexpected payment processor response: {e}"),
            PaymentError::SessionNotFound(id) => write!(f, "checkout session not found: {id}"),
        }
    }
}

impl std::error::Error for PaymentError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Complete,
    Expired,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    #[serde(other)]
    Unknown,
}

/// One hosted payment page with a single line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub amount: Cents,
    pub currency: String,
    pub product_name: String,
    pub success_url: String,
    pub cancel_url: String,
    pub client_reference_id: String,
    pub metadata: BTreeMap<String, String>,
}

/// A checkout session as the processor reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    pub status: Option<SessionStatus>,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub amount_total: Option<Cents>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}

/// The external payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: SessionRequest) -> Result<CheckoutSession, PaymentError>;

    /// Fetch the session server-side. Never trust what the client echoes.
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, PaymentError>;

    /// Refund a captured payment in full. Returns the refund id.
    async fn refund(&self, payment_intent: &str) -> Result<String, PaymentError>;
}
