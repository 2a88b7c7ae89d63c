//! HTTP error mapping.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::calendar::CalendarError;
use crate::catalog::PricingError;
use crate::checkout::{CheckoutError, PaymentError};
use crate::engine::EngineError;

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    /// The requested window is taken. `details` names the blocking slot.
    Conflict {
        message: String,
        details: Option<serde_json::Value>,
    },
    PaymentRequired(String),
    Unauthorized(String),
    /// A payment or calendar service failed.
    Upstream(String),
    /// A collaborator is not configured.
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", msg)),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", msg)),
            AppError::Conflict { message, details } => {
                let mut error = ApiError::new("SLOT_UNAVAILABLE", message);
                error.details = details;
                (StatusCode::CONFLICT, error)
            }
            AppError::PaymentRequired(msg) => {
                (StatusCode::PAYMENT_REQUIRED, ApiError::new("PAYMENT_REQUIRED", msg))
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, ApiError::new("UNAUTHORIZED", msg)),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, ApiError::new("UPSTREAM_ERROR", msg)),
            AppError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::new("NOT_CONFIGURED", msg),
            ),
            AppError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("INTERNAL_ERROR", "internal error"),
                )
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(_) => AppError::NotFound(err.to_string()),
            EngineError::Validation(_)
            | EngineError::OutsideHorizon(_)
            | EngineError::LimitExceeded(_) => AppError::BadRequest(err.to_string()),
            EngineError::AvailabilityConflict {
                studio_id,
                date,
                start_time,
            } => AppError::Conflict {
                message: "slot no longer available".into(),
                details: Some(serde_json::json!({
                    "studioId": studio_id.to_string(),
                    "date": date.to_string(),
                    "startTime": start_time.to_string(),
                })),
            },
            EngineError::InvalidTransition { .. } => AppError::Conflict {
                message: err.to_string(),
                details: None,
            },
            EngineError::WalError(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::SessionNotFound(_) => AppError::NotFound(err.to_string()),
            _ => AppError::Upstream(err.to_string()),
        }
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Engine(e) => e.into(),
            CheckoutError::Payment(e) => e.into(),
            CheckoutError::Pricing(e) => e.into(),
            CheckoutError::UnknownService(_) => AppError::NotFound(err.to_string()),
            CheckoutError::Validation(_) | CheckoutError::InvalidMetadata(_) => {
                AppError::BadRequest(err.to_string())
            }
            CheckoutError::NotPaid { .. } | CheckoutError::AmountMismatch { .. } => {
                AppError::PaymentRequired(err.to_string())
            }
            CheckoutError::SessionRejected { ref session_id, .. } => AppError::Conflict {
                details: Some(serde_json::json!({ "sessionId": session_id })),
                message: err.to_string(),
            },
        }
    }
}

impl From<CalendarError> for AppError {
    fn from(err: CalendarError) -> Self {
        match err {
            CalendarError::NotConfigured => AppError::Unavailable(err.to_string()),
            CalendarError::Validation(_) => AppError::BadRequest(err.to_string()),
            CalendarError::Http(_) | CalendarError::Api { .. } => AppError::Upstream(err.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Disabled => AppError::Unavailable(err.to_string()),
            _ => AppError::Unauthorized(err.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}
