mod gateway;
mod sandbox;
mod stripe;

pub use gateway::{
    CheckoutSession, PaymentError, PaymentGateway, PaymentStatus, SessionRequest, SessionStatus,
};
pub use sandbox::SandboxGateway;
pub use stripe::StripeGateway;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::catalog::{Catalog, Pricing, PricingError, ServiceOffering};
use crate::engine::{CommitOutcome, CommitRequest, Engine, EngineError};
use crate::limits::{MAX_DRAFT_METADATA_LEN, MAX_USER_ID_LEN};
use crate::model::*;

// Payment metadata keys, round-tripped through the processor.
pub const META_USER_ID: &str = "user_id";
pub const META_SERVICE_TYPE: &str = "service_type";
pub const META_SERVICE_ID: &str = "service_id";
pub const META_BOOKING_DRAFT: &str = "booking_draft";

#[derive(Debug)]
pub enum CheckoutError {
    Engine(EngineError),
    Payment(PaymentError),
    Pricing(PricingError),
    UnknownService(String),
    /// The request itself is malformed.
    Validation(String),
    /// The session exists but has not been paid.
    NotPaid { session_id: String },
    /// The processor reports less than the recomputed price.
    AmountMismatch { expected: Cents, paid: Cents },
    /// Metadata echoed back by the processor does not decode.
    InvalidMetadata(String),
    /// The session was paid but turned down earlier; it never books.
    SessionRejected { session_id: String, reason: String },
}

impl std::fmt::Display for CheckoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckoutError::Engine(e) => write!(f, "{e}"),
            CheckoutError::Payment(e) => write!(f, "{e}"),
            CheckoutError::Pricing(e) => write!(f, "pricing failed: {e}"),
            CheckoutError::UnknownService(s) => write!(f, "unknown service: {s}"),
            CheckoutError::Validation(msg) => write!(f, "validation failed: {msg}"),
            CheckoutError::NotPaid { session_id } => {
                write!(f, "checkout session {session_id} is not paid")
            }
            CheckoutError::AmountMismatch { expected, paid } => {
                write!(f, "paid {paid} but {expected} is due")
            }
            CheckoutError::InvalidMetadata(msg) => write!(f, "invalid payment metadata: {msg}"),
            CheckoutError::SessionRejected { session_id, reason } => {
                write!(f, "checkout session {session_id} was rejected: {reason}")
            }
        }
    }
}

impl std::error::Error for CheckoutError {}

impl From<EngineError> for CheckoutError {
    fn from(e: EngineError) -> Self {
        CheckoutError::Engine(e)
    }
}

impl From<PaymentError> for CheckoutError {
    fn from(e: PaymentError) -> Self {
        CheckoutError::Payment(e)
    }
}

impl From<PricingError> for CheckoutError {
    fn from(e: PricingError) -> Self {
        CheckoutError::Pricing(e)
    }
}

#[derive(Debug, Clone)]
pub struct CreateSession {
    pub user_id: String,
    pub service: ServiceRef,
    pub booking_draft: Option<BookingDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSession {
    pub session_id: String,
    pub url: Option<String>,
    pub amount: Cents,
}

/// What a verified payment produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Completion {
    pub booking: Option<Booking>,
    pub subscription: Option<Subscription>,
    /// True when this session had already been processed.
    pub already_processed: bool,
}

/// Decoded payment metadata. Everything in it is untrusted.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PurchaseMetadata {
    user_id: String,
    service: ServiceRef,
    draft: Option<BookingDraft>,
}

impl PurchaseMetadata {
    fn encode(&self) -> Result<BTreeMap<String, String>, CheckoutError> {
        let mut metadata = BTreeMap::new();
        metadata.insert(META_USER_ID.to_string(), self.user_id.clone());
        metadata.insert(META_SERVICE_TYPE.to_string(), self.service.kind.as_str().to_string());
        metadata.insert(META_SERVICE_ID.to_string(), self.service.id.clone());
        if let Some(draft) = &self.draft {
            let json = serde_json::to_string(draft)
                .map_err(|e| CheckoutError::Validation(e.to_string()))?;
            if json.len() > MAX_DRAFT_METADATA_LEN {
                return Err(CheckoutError::Validation("booking draft too large".into()));
            }
            metadata.insert(META_BOOKING_DRAFT.to_string(), json);
        }
        Ok(metadata)
    }

    fn decode(metadata: &BTreeMap<String, String>) -> Result<Self, CheckoutError> {
        let field = |key: &str| {
            metadata
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| CheckoutError::InvalidMetadata(format!("missing {key}")))
        };
        let user_id = field(META_USER_ID)?;
        let kind_raw = field(META_SERVICE_TYPE)?;
        let kind = ServiceKind::parse(&kind_raw)
            .ok_or_else(|| CheckoutError::InvalidMetadata(format!("service type {kind_raw}")))?;
        let id = field(META_SERVICE_ID)?;
        let draft = match metadata.get(META_BOOKING_DRAFT).filter(|v| !v.is_empty()) {
            None => None,
            Some(raw) => Some(
                serde_json::from_str::<BookingDraft>(raw)
                    .map_err(|e| CheckoutError::InvalidMetadata(format!("booking draft: {e}")))?,
            ),
        };
        Ok(Self {
            user_id,
            service: ServiceRef { kind, id },
            draft,
        })
    }
}

/// Bridges the catalog, the payment processor and the commit routine.
pub struct Checkout {
    engine: Arc<Engine>,
    catalog: Arc<Catalog>,
    gateway: Arc<dyn PaymentGateway>,
    public_url: String,
    currency: String,
}

impl Checkout {
    pub fn new(
        engine: Arc<Engine>,
        catalog: Arc<Catalog>,
        gateway: Arc<dyn PaymentGateway>,
        public_url: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            catalog,
            gateway,
            public_url: public_url.into(),
            currency: currency.into(),
        }
    }

    fn resolve(&self, service: &ServiceRef) -> Result<ServiceOffering, CheckoutError> {
        self.catalog
            .offering(service.kind, &service.id)
            .ok_or_else(|| CheckoutError::UnknownService(format!("{} {}", service.kind.as_str(), service.id)))
    }

    /// Re-validate a draft against live state and return the studio it books.
    /// Advisory: nothing is marked.
    async fn check_draft(&self, draft: &BookingDraft, today: NaiveDate) -> Result<Studio, CheckoutError> {
        let (studio, end_time) = self
            .engine
            .check_window(
                draft.studio_id,
                draft.date,
                draft.start_time,
                draft.duration,
                draft.number_of_guests,
                today,
            )
            .await?;
        if end_time != draft.end_time {
            return Err(CheckoutError::Validation(format!(
                "end time {} does not match {}h from {}",
                draft.end_time, draft.duration, draft.start_time
            )));
        }
        Ok(studio)
    }

    /// Create a hosted payment session for a plan or an hour package.
    ///
    /// Hour packages need a booking draft; subscriptions may carry one.
    /// The draft is checked against current availability before any money
    /// moves, but no slot is held: the commit after payment decides.
    pub async fn create_session(
        &self,
        request: CreateSession,
        today: NaiveDate,
    ) -> Result<CreatedSession, CheckoutError> {
        if request.user_id.is_empty() || request.user_id.len() > MAX_USER_ID_LEN {
            return Err(CheckoutError::Validation("user id missing or too long".into()));
        }
        let offering = self.resolve(&request.service)?;
        if matches!(offering, ServiceOffering::HourPackage(_)) && request.booking_draft.is_none() {
            return Err(CheckoutError::Pricing(PricingError::DraftRequired));
        }

        let studio = match &request.booking_draft {
            Some(draft) => Some(self.check_draft(draft, today).await?),
            None => None,
        };
        let session = studio
            .as_ref()
            .zip(request.booking_draft.as_ref())
            .map(|(studio, draft)| (studio, draft.duration));
        let pricing = self.catalog.price_for(&offering, session)?;

        let metadata = PurchaseMetadata {
            user_id: request.user_id.clone(),
            service: request.service.clone(),
            draft: request.booking_draft.clone(),
        }
        .encode()?;
        let product_name = match &studio {
            Some(studio) => format!("{} · {}", offering.name(), studio.name),
            None => offering.name().to_string(),
        };

        let created = self
            .gateway
            .create_session(SessionRequest {
                amount: pricing.amount_due,
                currency: self.currency.clone(),
                product_name,
                success_url: format!("{}/booking/success?session_id={{CHECKOUT_SESSION_ID}}", self.public_url),
                cancel_url: format!("{}/booking/cancelled", self.public_url),
                client_reference_id: request.user_id.clone(),
                metadata,
            })
            .await?;

        metrics::counter!(
            crate::observability::CHECKOUT_SESSIONS_TOTAL,
            "service_type" => request.service.kind.as_str()
        )
        .increment(1);
        info!(
            session = %created.id,
            user = %request.user_id,
            service = %request.service.id,
            amount = pricing.amount_due,
            "created checkout session"
        );
        Ok(CreatedSession {
            session_id: created.id,
            url: created.url,
            amount: pricing.amount_due,
        })
    }

    /// Verify a payment server-side and commit what it paid for.
    ///
    /// Safe to call repeatedly for the same session. The echoed draft is
    /// re-validated and re-priced. A paid session that cannot be honoured is
    /// recorded as rejected and refunded once; later calls return the
    /// rejection without asking the processor again.
    pub async fn complete(&self, session_id: &str, today: NaiveDate) -> Result<Completion, CheckoutError> {
        if let Some(booking) = self.engine.booking_for_session(session_id).await {
            self.record_verification("already_processed");
            return Ok(Completion {
                booking: Some(booking),
                subscription: self.engine.subscription_for_session(session_id),
                already_processed: true,
            });
        }
        if let Some(reason) = self.engine.rejected_session(session_id) {
            self.record_verification("already_rejected");
            return Err(CheckoutError::SessionRejected {
                session_id: session_id.to_string(),
                reason,
            });
        }

        let session = self.gateway.retrieve_session(session_id).await?;
        if !session.is_paid() {
            self.record_verification("not_paid");
            return Err(CheckoutError::NotPaid {
                session_id: session_id.to_string(),
            });
        }
        let (purchase, offering, pricing) = match self.price_paid_session(&session).await {
            Ok(priced) => priced,
            // Nothing was delivered yet, so the whole payment goes back.
            Err(e) => return Err(self.reject(&session, e, true).await),
        };

        let mut completion = Completion::default();
        if let ServiceOffering::Subscription(plan) = &offering {
            let before = self.engine.subscription_for_session(session_id).is_some();
            let subscription = self
                .engine
                .activate_subscription(purchase.user_id.clone(), plan.id.clone(), today, Some(session_id.to_string()))
                .await?;
            completion.already_processed = before;
            completion.subscription = Some(subscription);
        }

        if let Some(draft) = &purchase.draft {
            let request = CommitRequest {
                user_id: purchase.user_id.clone(),
                studio_id: draft.studio_id,
                date: draft.date,
                start_time: draft.start_time,
                duration: draft.duration,
                number_of_guests: draft.number_of_guests,
                total_price: pricing.booking_price,
                service: offering.service_ref(),
                payment_session_id: Some(session_id.to_string()),
            };
            match self.engine.commit_booking(request, today).await {
                Ok(CommitOutcome::Created(booking)) => {
                    completion.already_processed = false;
                    completion.booking = Some(booking);
                }
                Ok(CommitOutcome::AlreadyCommitted(booking)) => {
                    completion.already_processed = true;
                    completion.booking = Some(booking);
                }
                Err(e @ EngineError::WalError(_)) => {
                    self.record_verification("error");
                    return Err(e.into());
                }
                Err(e) => {
                    // A subscription stays valid without the session it was bought with
                    let refund = matches!(offering, ServiceOffering::HourPackage(_));
                    return Err(self.reject(&session, e.into(), refund).await);
                }
            }
        }

        self.record_verification("completed");
        Ok(completion)
    }

    /// Decode and re-price a paid session. Any error here means the
    /// payment cannot be honoured as it stands.
    async fn price_paid_session(
        &self,
        session: &CheckoutSession,
    ) -> Result<(PurchaseMetadata, ServiceOffering, Pricing), CheckoutError> {
        let purchase = PurchaseMetadata::decode(&session.metadata)?;
        let offering = self.resolve(&purchase.service)?;
        let studio = match &purchase.draft {
            Some(draft) => Some(self.engine.get_studio(draft.studio_id).await?),
            None => None,
        };
        let priced_session = studio
            .as_ref()
            .zip(purchase.draft.as_ref())
            .map(|(studio, draft)| (studio, draft.duration));
        let pricing = self.catalog.price_for(&offering, priced_session)?;
        let paid = session.amount_total.unwrap_or(0);
        if paid < pricing.amount_due {
            warn!(session = %session.id, paid, due = pricing.amount_due, "payment below price");
            return Err(CheckoutError::AmountMismatch {
                expected: pricing.amount_due,
                paid,
            });
        }
        Ok((purchase, offering, pricing))
    }

    /// Record a paid session as rejected so no retry can book it, then
    /// refund it. Only the first caller to record the rejection refunds.
    async fn reject(&self, session: &CheckoutSession, err: CheckoutError, refund: bool) -> CheckoutError {
        self.record_verification("rejected");
        let first = match self
            .engine
            .reject_session(session.id.clone(), err.to_string())
            .await
        {
            Ok(first) => first,
            Err(e) => {
                error!(session = %session.id, "could not record rejected session: {e}");
                true
            }
        };
        if !first {
            return err;
        }
        if refund {
            self.refund(session).await;
        } else {
            error!(session = %session.id, "paid session could not be honoured, no refund issued: {err}");
        }
        err
    }

    /// Best effort: the refund outcome is logged, never returned.
    async fn refund(&self, session: &CheckoutSession) {
        let Some(intent) = session.payment_intent.as_deref() else {
            error!(session = %session.id, "paid session has no payment intent, refund manually");
            metrics::counter!(crate::observability::REFUNDS_TOTAL, "status" => "skipped").increment(1);
            return;
        };
        match self.gateway.refund(intent).await {
            Ok(refund_id) => {
                metrics::counter!(crate::observability::REFUNDS_TOTAL, "status" => "issued").increment(1);
                warn!(session = %session.id, refund = %refund_id, "booking rejected after payment, refunded");
            }
            Err(e) => {
                metrics::counter!(crate::observability::REFUNDS_TOTAL, "status" => "failed").increment(1);
                error!(session = %session.id, "booking rejected after payment and refund failed: {e}");
            }
        }
    }

    fn record_verification(&self, outcome: &'static str) {
        metrics::counter!(crate::observability::PAYMENT_VERIFICATIONS_TOTAL, "outcome" => outcome).increment(1);
    }
}
