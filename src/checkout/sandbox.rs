use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;
use ulid::Ulid;

use super::gateway::{
    CheckoutSession, PaymentError, PaymentGateway, PaymentStatus, SessionRequest, SessionStatus,
};

/// In-memory payment processor for local runs and tests.
///
/// Sessions start unpaid unless `auto_complete` is set; `complete` marks one
/// paid the way a customer finishing the hosted page would.
pub struct SandboxGateway {
    sessions: DashMap<String, CheckoutSession>,
    /// payment intent → refund id
    refunds: DashMap<String, String>,
    public_url: String,
    auto_complete: bool,
}

impl SandboxGateway {
    pub fn new(public_url: impl Into<String>, auto_complete: bool) -> Self {
        Self {
            sessions: DashMap::new(),
            refunds: DashMap::new(),
            public_url: public_url.into(),
            auto_complete,
        }
    }

    /// Mark a session paid. Returns false for unknown ids.
    pub fn complete(&self, session_id: &str) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut session) => {
                session.status = Some(SessionStatus::Complete);
                session.payment_status = PaymentStatus::Paid;
                true
            }
            None => false,
        }
    }

    /// Overwrite the amount a session reports as paid.
    pub fn set_amount_total(&self, session_id: &str, amount: i64) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.amount_total = Some(amount);
        }
    }

    pub fn was_refunded(&self, payment_intent: &str) -> bool {
        self.refunds.contains_key(payment_intent)
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.len()
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_session(&self, request: SessionRequest) -> Result<CheckoutSession, PaymentError> {
        let id = format!("cs_sandbox_{}", Ulid::new());
        let (status, payment_status) = if self.auto_complete {
            (SessionStatus::Complete, PaymentStatus::Paid)
        } else {
            (SessionStatus::Open, PaymentStatus::Unpaid)
        };
        let session = CheckoutSession {
            url: Some(format!("{}/sandbox/checkout/{id}", self.public_url)),
            status: Some(status),
            payment_status,
            amount_total: Some(request.amount),
            currency: Some(request.currency),
            metadata: request.metadata,
            payment_intent: Some(format!("pi_sandbox_{}", Ulid::new())),
            id: id.clone(),
        };
        self.sessions.insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, PaymentError> {
        self.sessions
            .get(session_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.to_string()))
    }

    async fn refund(&self, payment_intent: &str) -> Result<String, PaymentError> {
        let refund_id = format!("re_sandbox_{}", Ulid::new());
        self.refunds
            .insert(payment_intent.to_string(), refund_id.clone());
        info!(payment_intent, refund = %refund_id, "sandbox refund issued");
        Ok(refund_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn request() -> SessionRequest {
        SessionRequest {
            amount: 4500,
            currency: "eur".into(),
            product_name: "Single hour".into(),
            success_url: "http://localhost/ok".into(),
            cancel_url: "http://localhost/cancel".into(),
            client_reference_id: "user-1".into(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn sessions_start_unpaid_until_completed() {
        let gateway = SandboxGateway::new("http://localhost:8080", false);
        let session = gateway.create_session(request()).await.unwrap();
        assert!(!gateway.retrieve_session(&session.id).await.unwrap().is_paid());

        assert!(gateway.complete(&session.id));
        assert!(gateway.retrieve_session(&session.id).await.unwrap().is_paid());
        assert!(!gateway.complete("cs_missing"));
    }

    #[tokio::test]
    async fn auto_complete_pays_immediately() {
        let gateway = SandboxGateway::new("http://localhost:8080", true);
        let session = gateway.create_session(request()).await.unwrap();
        assert!(session.is_paid());
        assert_eq!(session.amount_total, Some(4500));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let gateway = SandboxGateway::new("http://localhost:8080", false);
        assert!(matches!(
            gateway.retrieve_session("cs_nope").await,
            Err(PaymentError::SessionNotFound(_))
        ));
    }
}
