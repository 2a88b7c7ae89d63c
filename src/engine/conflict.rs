use chrono::{Days, NaiveDate, Utc};

use crate::limits::*;
use crate::model::*;
use crate::slot::{BusinessHours, SlotTime};

use super::availability::{day_view, first_blocking_slot};
use super::EngineError;

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Last date (inclusive) of the maintained horizon starting at `today`.
pub fn horizon_last_day(today: NaiveDate, horizon_days: u32) -> NaiveDate {
    today
        .checked_add_days(Days::new(horizon_days.saturating_sub(1) as u64))
        .unwrap_or(NaiveDate::MAX)
}

/// Dates outside `[today, today + horizon)` are not bookable and not queried.
pub(crate) fn check_in_horizon(date: NaiveDate, today: NaiveDate, horizon_days: u32) -> Result<(), EngineError> {
    if date < today || date > horizon_last_day(today, horizon_days) {
        return Err(EngineError::OutsideHorizon(date));
    }
    Ok(())
}

pub(crate) fn validate_studio(studio: &Studio) -> Result<(), EngineError> {
    if studio.name.is_empty() || studio.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("studio name length"));
    }
    if studio.location.len() > MAX_NAME_LEN || studio.description.len() > MAX_DESCRIPTION_LEN {
        return Err(EngineError::LimitExceeded("studio text too long"));
    }
    if studio.max_booking_duration == 0 || studio.max_booking_duration > MAX_BOOKING_HOURS {
        return Err(EngineError::Validation(format!(
            "max_booking_duration must be within 1..={MAX_BOOKING_HOURS}"
        )));
    }
    if studio.max_guests == 0 || studio.max_guests > MAX_GUESTS {
        return Err(EngineError::Validation(format!("max_guests must be within 1..={MAX_GUESTS}")));
    }
    if studio.price_per_hour < 0 {
        return Err(EngineError::Validation("price_per_hour must not be negative".into()));
    }
    Ok(())
}

/// Duration in `[1, max_booking_duration]`, guests in `[1, max_guests]`.
pub(crate) fn validate_session(studio: &Studio, duration_hours: u8, guests: u32) -> Result<(), EngineError> {
    if duration_hours == 0 || duration_hours > studio.max_booking_duration {
        return Err(EngineError::Validation(format!(
            "duration must be within 1..={} hours",
            studio.max_booking_duration
        )));
    }
    if guests == 0 || guests > studio.max_guests {
        return Err(EngineError::Validation(format!(
            "number of guests must be within 1..={}",
            studio.max_guests
        )));
    }
    Ok(())
}

/// Window must be whole hours matching `duration_hours` and inside opening hours.
pub(crate) fn validate_window(
    hours: &BusinessHours,
    start: SlotTime,
    end: SlotTime,
    duration_hours: u8,
) -> Result<(), EngineError> {
    match start.hours_until(end) {
        Some(h) if h == duration_hours => {}
        _ => {
            return Err(EngineError::Validation(format!(
                "window {start}-{end} does not match a {duration_hours}h session"
            )));
        }
    }
    if !hours.contains_window(start, end) {
        return Err(EngineError::Validation(format!(
            "window {start}-{end} is outside opening hours {}-{}",
            hours.open, hours.close
        )));
    }
    Ok(())
}

/// Compare half of the compare-and-set: every slot in `[start, end)` must be
/// available and contiguous in the caller's locked snapshot.
pub(crate) fn check_window_free(
    rs: &StudioState,
    date: NaiveDate,
    start: SlotTime,
    end: SlotTime,
) -> Result<(), EngineError> {
    let view = day_view(rs.day(date));
    match first_blocking_slot(&view, start, end) {
        None => Ok(()),
        Some(slot) => Err(EngineError::AvailabilityConflict {
            studio_id: rs.studio.id,
            date,
            start_time: slot,
        }),
    }
}
