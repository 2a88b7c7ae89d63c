use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use crate::http::error::AppError;
use crate::http::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No admin token configured; admin routes are off.
    Disabled,
    Missing,
    Malformed,
    Invalid,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Disabled => write!(f, "admin access is not configured"),
            AuthError::Missing => write!(f, "missing authorization"),
            AuthError::Malformed => write!(f, "authorization must be Bearer"),
            AuthError::Invalid => write!(f, "invalid admin token"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Shared secret guarding the admin routes.
#[derive(Clone)]
pub struct AdminToken(Option<String>);

impl AdminToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.is_empty()))
    }

    /// Check an `Authorization` header value.
    pub fn verify(&self, header: Option<&str>) -> Result<(), AuthError> {
        let Some(expected) = &self.0 else {
            return Err(AuthError::Disabled);
        };
        let header = header.ok_or(AuthError::Missing)?;
        let mut parts = header.split_ascii_whitespace();
        if parts.next() != Some("Bearer") {
            return Err(AuthError::Malformed);
        }
        let presented = parts.next().ok_or(AuthError::Malformed)?;
        if parts.next().is_some() {
            return Err(AuthError::Malformed);
        }
        if constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(AuthError::Invalid)
        }
    }
}

impl std::fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.0.is_some() { "AdminToken(set)" } else { "AdminToken(unset)" })
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Extractor that admits only requests carrying the admin bearer token.
pub struct Admin;

impl FromRequestParts<AppState> for Admin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        match state.admin_token.verify(header) {
            Ok(()) => Ok(Admin),
            Err(e) => {
                metrics::counter!(crate::observability::AUTH_FAILURES_TOTAL).increment(1);
                tracing::warn!(path = %parts.uri.path(), "admin request rejected: {e}");
                Err(e.into())
            }
        }
    }
}
