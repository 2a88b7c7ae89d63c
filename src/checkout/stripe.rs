use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::gateway::{CheckoutSession, PaymentError, PaymentGateway, SessionRequest};
use crate::config::StripeConfig;

/// Stripe Checkout Sessions over its form-encoded REST API.
pub struct StripeGateway {
    client: Client,
    secret_key: String,
    api_base: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct Refund {
    id: String,
}

impl StripeGateway {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn post_form(&self, path: &str, body: String) -> Result<Response, PaymentError> {
        self.client
            .post(format!("{}{path}", self.api_base))
            .bearer_auth(&self.secret_key)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| PaymentError::Http(e.to_string()))
    }
}

/// Flatten a session request into Stripe's bracketed form keys.
pub(crate) fn session_form(request: &SessionRequest) -> String {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    form.append_pair("mode", "payment")
        .append_pair("success_url", &request.success_url)
        .append_pair("cancel_url", &request.cancel_url)
        .append_pair("client_reference_id", &request.client_reference_id)
        .append_pair("line_items[0][quantity]", "1")
        .append_pair("line_items[0][price_data][currency]", &request.currency)
        .append_pair("line_items[0][price_data][unit_amount]", &request.amount.to_string())
        .append_pair("line_items[0][price_data][product_data][name]", &request.product_name);
    for (key, value) in &request.metadata {
        form.append_pair(&format!("metadata[{key}]"), value);
    }
    form.finish()
}

async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, PaymentError> {
    let status = response.status();
    if !status.is_success() {
        return Err(api_error(response, status).await);
    }
    response
        .json()
        .await
        .map_err(|e| PaymentError::Decode(e.to_string()))
}

async fn api_error(response: Response, status: StatusCode) -> PaymentError {
    let message = match response.json::<ErrorEnvelope>().await {
        Ok(envelope) => envelope.error.message,
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
    };
    PaymentError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_session(&self, request: SessionRequest) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .post_form("/v1/checkout/sessions", session_form(&request))
            .await?;
        let session: CheckoutSession = decode(response).await?;
        debug!(session = %session.id, amount = request.amount, "created stripe checkout session");
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, PaymentError> {
        let encoded: String = url::form_urlencoded::byte_serialize(session_id.as_bytes()).collect();
        let response = self
            .client
            .get(format!("{}/v1/checkout/sessions/{encoded}", self.api_base))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| PaymentError::Http(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(PaymentError::SessionNotFound(session_id.to_string()));
        }
        decode(response).await
    }

    async fn refund(&self, payment_intent: &str) -> Result<String, PaymentError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("payment_intent", payment_intent)
            .finish();
        let refund: Refund = decode(self.post_form("/v1/refunds", body).await?).await?;
        Ok(refund.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn session_form_uses_bracketed_keys() {
        let mut metadata = BTreeMap::new();
        metadata.insert("user_id".to_string(), "user-1".to_string());
        metadata.insert("booking_draft".to_string(), r#"{"date":"2025-03-01"}"#.to_string());
        let form = session_form(&SessionRequest {
            amount: 6500,
            currency: "eur".into(),
            product_name: "Single hour".into(),
            success_url: "https://book.example.com/ok?session_id={CHECKOUT_SESSION_ID}".into(),
            cancel_url: "https://book.example.com/cancel".into(),
            client_reference_id: "user-1".into(),
            metadata,
        });

        let pairs: BTreeMap<String, String> = url::form_urlencoded::parse(form.as_bytes())
            .into_owned()
            .collect();
        assert_eq!(pairs["mode"], "payment");
        assert_eq!(pairs["line_items[0][price_data][unit_amount]"], "6500");
        assert_eq!(pairs["metadata[user_id]"], "user-1");
        assert_eq!(pairs["metadata[booking_draft]"], r#"{"date":"2025-03-01"}"#);
        assert!(pairs["success_url"].ends_with("{CHECKOUT_SESSION_ID}"));
    }

    #[test]
    fn decodes_stripe_session_json() {
        let raw = r#"{
            "id": "cs_test_a1",
            "object": "checkout.session",
            "url": null,
            "status": "complete",
            "payment_status": "paid",
            "amount_total": 6500,
            "currency": "eur",
            "metadata": {"user_id": "user-1"},
            "payment_intent": "pi_123",
            "livemode": false
        }"#;
        let session: CheckoutSession = serde_json::from_str(raw).unwrap();
        assert!(session.is_paid());
        assert_eq!(session.amount_total, Some(6500));
        assert_eq!(session.payment_intent.as_deref(), Some("pi_123"));
    }
}
