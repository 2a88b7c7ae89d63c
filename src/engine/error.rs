use chrono::NaiveDate;
use ulid::Ulid;

use crate::slot::{SlotError, SlotTime};

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    /// Bad duration, guest count, window or date; rejected before any write.
    Validation(String),
    /// A slot in the requested window is no longer available.
    AvailabilityConflict {
        studio_id: Ulid,
        date: NaiveDate,
        start_time: SlotTime,
    },
    /// Date outside the maintained availability horizon.
    OutsideHorizon(NaiveDate),
    InvalidTransition {
        id: Ulid,
        reason: &'static str,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::AvailabilityConflict {
                studio_id,
                date,
                start_time,
            } => write!(
                f,
                "slot no longer available: studio {studio_id} on {date} at {start_time}"
            ),
            EngineError::OutsideHorizon(date) => {
                write!(f, "date {date} is outside the bookable horizon")
            }
            EngineError::InvalidTransition { id, reason } => {
                write!(f, "booking {id}: {reason}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<SlotError> for EngineError {
    fn from(e: SlotError) -> Self {
        EngineError::Validation(e.to_string())
    }
}
