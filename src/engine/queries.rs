use chrono::NaiveDate;
use futures::future::join_all;
use ulid::Ulid;

use crate::model::*;
use crate::slot::SlotTime;

use super::availability::{business_day, day_view, eligible_starts, SlotCell};
use super::conflict::{check_in_horizon, check_window_free, validate_session, validate_window};
use super::{Engine, EngineError};

impl Engine {
    pub async fn list_studios(&self) -> Vec<Studio> {
        let states: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut studios = join_all(
            states
                .iter()
                .map(|rs| async move { rs.read().await.studio.clone() }),
        )
        .await;
        studios.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        studios
    }

    pub async fn get_studio(&self, id: Ulid) -> Result<Studio, EngineError> {
        let rs = self.get_studio_state(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        Ok(guard.studio.clone())
    }

    /// Opening-hours cells for one day, explicit rows and implied open ones.
    pub async fn day_slots(
        &self,
        studio_id: Ulid,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Vec<SlotCell>, EngineError> {
        check_in_horizon(date, today, self.policy.horizon_days)?;
        let rs = self
            .get_studio_state(&studio_id)
            .ok_or(EngineError::NotFound(studio_id))?;
        let guard = rs.read().await;
        let view = day_view(guard.day(date));
        Ok(business_day(&view, &self.policy.hours))
    }

    /// Start times at which a `duration_hours` session for `guests` people fits.
    pub async fn available_start_times(
        &self,
        studio_id: Ulid,
        date: NaiveDate,
        duration_hours: u8,
        guests: u32,
        today: NaiveDate,
    ) -> Result<Vec<SlotTime>, EngineError> {
        check_in_horizon(date, today, self.policy.horizon_days)?;
        let rs = self
            .get_studio_state(&studio_id)
            .ok_or(EngineError::NotFound(studio_id))?;
        let guard = rs.read().await;
        validate_session(&guard.studio, duration_hours, guests)?;
        let view = day_view(guard.day(date));
        Ok(eligible_starts(&view, duration_hours, &self.policy.hours))
    }

    /// Advisory check used before taking payment: the same validation and
    /// slot check as the commit routine, against a read snapshot. Marks
    /// nothing. Returns the studio and the session's end time.
    pub async fn check_window(
        &self,
        studio_id: Ulid,
        date: NaiveDate,
        start_time: SlotTime,
        duration_hours: u8,
        guests: u32,
        today: NaiveDate,
    ) -> Result<(Studio, SlotTime), EngineError> {
        check_in_horizon(date, today, self.policy.horizon_days)?;
        let rs = self
            .get_studio_state(&studio_id)
            .ok_or(EngineError::NotFound(studio_id))?;
        let guard = rs.read().await;
        validate_session(&guard.studio, duration_hours, guests)?;
        let end_time = start_time.plus_hours(duration_hours).ok_or_else(|| {
            EngineError::Validation(format!("{duration_hours}h from {start_time} runs past midnight"))
        })?;
        validate_window(&self.policy.hours, start_time, end_time, duration_hours)?;
        check_window_free(&guard, date, start_time, end_time)?;
        Ok((guard.studio.clone(), end_time))
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let studio_id = self.studio_for_booking(&id).ok_or(EngineError::NotFound(id))?;
        let rs = self
            .get_studio_state(&studio_id)
            .ok_or(EngineError::NotFound(studio_id))?;
        let guard = rs.read().await;
        guard.bookings.get(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    pub async fn booking_for_session(&self, session_id: &str) -> Option<Booking> {
        let id = self.index.by_session.get(session_id).map(|e| *e.value())?;
        self.get_booking(id).await.ok()
    }

    /// A user's bookings across all studios, newest date first.
    pub async fn bookings_for_user(&self, user_id: &str) -> Vec<Booking> {
        let states: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut bookings = Vec::new();
        for rs in states {
            let guard = rs.read().await;
            bookings.extend(
                guard
                    .bookings
                    .values()
                    .filter(|b| b.user_id == user_id)
                    .cloned(),
            );
        }
        bookings.sort_by(|a, b| b.date.cmp(&a.date).then(b.start_time.cmp(&a.start_time)));
        bookings
    }

    /// A studio's bookings, optionally for one date, in calendar order.
    pub async fn bookings_for_studio(
        &self,
        studio_id: Ulid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Booking>, EngineError> {
        let rs = self
            .get_studio_state(&studio_id)
            .ok_or(EngineError::NotFound(studio_id))?;
        let guard = rs.read().await;
        let mut bookings: Vec<Booking> = guard
            .bookings
            .values()
            .filter(|b| date.is_none_or(|d| b.date == d))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| a.date.cmp(&b.date).then(a.start_time.cmp(&b.start_time)));
        Ok(bookings)
    }

    /// Latest date with any explicit row for the studio.
    pub async fn max_slot_date(&self, studio_id: Ulid) -> Result<Option<NaiveDate>, EngineError> {
        let rs = self
            .get_studio_state(&studio_id)
            .ok_or(EngineError::NotFound(studio_id))?;
        let guard = rs.read().await;
        Ok(guard.max_date())
    }

    /// Explicit rows for one day, in start order.
    pub async fn slot_rows(&self, studio_id: Ulid, date: NaiveDate) -> Result<Vec<AvailabilitySlot>, EngineError> {
        let rs = self
            .get_studio_state(&studio_id)
            .ok_or(EngineError::NotFound(studio_id))?;
        let guard = rs.read().await;
        Ok(guard.day(date).copied().collect())
    }

    pub fn subscription_for_session(&self, session_id: &str) -> Option<Subscription> {
        let id = self.subscription_sessions.get(session_id).map(|e| *e.value())?;
        self.subscriptions.get(&id).map(|e| e.value().clone())
    }

    /// Why a paid session was turned down, if it was.
    pub fn rejected_session(&self, session_id: &str) -> Option<String> {
        self.rejected_sessions.get(session_id).map(|e| e.value().clone())
    }

    pub fn subscriptions_for_user(&self, user_id: &str) -> Vec<Subscription> {
        let mut subs: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|e| e.value().user_id == user_id)
            .map(|e| e.value().clone())
            .collect();
        subs.sort_by(|a, b| b.started_on.cmp(&a.started_on));
        subs
    }

    pub fn studio_ids(&self) -> Vec<Ulid> {
        self.state.iter().map(|e| *e.key()).collect()
    }
}
