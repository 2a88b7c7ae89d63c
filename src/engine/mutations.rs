use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::{oneshot, RwLock};
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::slot::SlotTime;

use super::conflict::{check_in_horizon, check_window_free, validate_session, validate_studio, validate_window};
use super::{Engine, EngineError, WalCommand};

/// Everything the commit routine needs, already priced by the caller.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub user_id: String,
    pub studio_id: Ulid,
    pub date: NaiveDate,
    pub start_time: SlotTime,
    /// Whole hours.
    pub duration: u8,
    pub number_of_guests: u32,
    pub total_price: Cents,
    pub service: ServiceRef,
    pub payment_session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Created(Booking),
    /// The payment session was already committed; nothing was written.
    AlreadyCommitted(Booking),
}

impl CommitOutcome {
    pub fn booking(&self) -> &Booking {
        match self {
            CommitOutcome::Created(b) | CommitOutcome::AlreadyCommitted(b) => b,
        }
    }

    pub fn into_booking(self) -> Booking {
        match self {
            CommitOutcome::Created(b) | CommitOutcome::AlreadyCommitted(b) => b,
        }
    }
}

impl Engine {
    /// Insert or replace a studio's reference data. Slot rows and bookings
    /// of an existing studio are untouched.
    pub async fn register_studio(&self, studio: Studio) -> Result<(), EngineError> {
        validate_studio(&studio)?;
        let _log = self.log_gate.read().await;
        let event = Event::StudioRegistered { studio: studio.clone() };

        if let Some(rs) = self.get_studio_state(&studio.id) {
            let mut guard = rs.write().await;
            if guard.studio == studio {
                return Ok(());
            }
            return self.persist_and_apply(&mut guard, &event).await;
        }

        if self.state.len() >= MAX_STUDIOS {
            return Err(EngineError::LimitExceeded("too many studios"));
        }
        self.wal_append(&event).await?;
        self.state
            .insert(studio.id, Arc::new(RwLock::new(StudioState::new(studio))));
        Ok(())
    }

    /// The booking commit routine: the only path that creates a booking.
    ///
    /// Runs strictly after payment has been verified. Re-validates the
    /// request, then under the studio's write lock checks that every spanned
    /// slot is still available and writes one log record that both flips the
    /// slots and inserts the booking. A concurrent commit for an overlapping
    /// window sees the flipped slots and fails with `AvailabilityConflict`.
    pub async fn commit_booking(
        &self,
        req: CommitRequest,
        today: NaiveDate,
    ) -> Result<CommitOutcome, EngineError> {
        if req.user_id.is_empty() || req.user_id.len() > MAX_USER_ID_LEN {
            return Err(EngineError::Validation("user id missing or too long".into()));
        }
        if req.total_price < 0 {
            return Err(EngineError::Validation("total price must not be negative".into()));
        }
        let _log = self.log_gate.read().await;
        let rs = self
            .get_studio_state(&req.studio_id)
            .ok_or(EngineError::NotFound(req.studio_id))?;
        let mut guard = rs.write().await;

        if let Some(session) = &req.payment_session_id
            && let Some(booking_id) = self.index.by_session.get(session).map(|e| *e.value()) {
                return match guard.bookings.get(&booking_id) {
                    Some(existing) => Ok(CommitOutcome::AlreadyCommitted(existing.clone())),
                    None => Err(EngineError::Validation(format!(
                        "payment session {session} was already used for another studio"
                    ))),
                };
            }

        if let Some(session) = &req.payment_session_id
            && self.rejected_sessions.contains_key(session) {
                return Err(EngineError::Validation(format!("payment session {session} was rejected")));
            }

        validate_session(&guard.studio, req.duration, req.number_of_guests)?;
        check_in_horizon(req.date, today, self.policy.horizon_days)?;
        let end_time = req.start_time.plus_hours(req.duration).ok_or_else(|| {
            EngineError::Validation(format!("{}h from {} runs past midnight", req.duration, req.start_time))
        })?;
        validate_window(&self.policy.hours, req.start_time, end_time, req.duration)?;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_STUDIO {
            return Err(EngineError::LimitExceeded("too many bookings on studio"));
        }

        if let Err(e) = check_window_free(&guard, req.date, req.start_time, end_time) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            warn!(studio = %req.studio_id, date = %req.date, start = %req.start_time, "commit rejected: {e}");
            return Err(e);
        }

        let booking = Booking {
            id: Ulid::new(),
            user_id: req.user_id,
            studio_id: req.studio_id,
            date: req.date,
            start_time: req.start_time,
            end_time,
            number_of_guests: req.number_of_guests,
            total_price: req.total_price,
            status: BookingStatus::Upcoming,
            service: req.service,
            payment_session_id: req.payment_session_id,
            created_at: Utc::now(),
        };
        let event = Event::BookingCommitted { booking: booking.clone() };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(crate::observability::BOOKINGS_COMMITTED_TOTAL).increment(1);
        info!(
            booking = %booking.id,
            studio = %booking.studio_id,
            date = %booking.date,
            "committed booking {}-{}",
            booking.start_time,
            booking.end_time
        );
        Ok(CommitOutcome::Created(booking))
    }

    /// Cancel an upcoming booking and reopen its slots.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let _log = self.log_gate.read().await;
        let (studio_id, mut guard) = self.resolve_booking_write(&id).await?;
        match guard.bookings.get(&id).map(|b| b.status) {
            Some(BookingStatus::Upcoming) => {}
            Some(_) => {
                return Err(EngineError::InvalidTransition {
                    id,
                    reason: "only upcoming bookings can be cancelled",
                });
            }
            None => return Err(EngineError::NotFound(id)),
        }
        let event = Event::BookingCancelled { id, studio_id };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(booking = %id, studio = %studio_id, "cancelled booking");
        guard.bookings.get(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Close a window without a booking. Already-taken slots stay taken.
    /// Returns the number of slots covered.
    pub async fn block_slots(
        &self,
        studio_id: Ulid,
        date: NaiveDate,
        start_time: SlotTime,
        end_time: SlotTime,
        today: NaiveDate,
    ) -> Result<usize, EngineError> {
        if !self.policy.hours.contains_window(start_time, end_time) {
            return Err(EngineError::Validation(format!(
                "window {start_time}-{end_time} is outside opening hours"
            )));
        }
        check_in_horizon(date, today, self.policy.horizon_days)?;
        let _log = self.log_gate.read().await;
        let rs = self
            .get_studio_state(&studio_id)
            .ok_or(EngineError::NotFound(studio_id))?;
        let mut guard = rs.write().await;
        let event = Event::SlotsBlocked {
            studio_id,
            date,
            start_time,
            end_time,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(crate::slot::spanned_slots(start_time, end_time).len())
    }

    /// Bulk delete of rows dated before `before`. No log record when nothing matches.
    pub async fn prune_slots(&self, studio_id: Ulid, before: NaiveDate) -> Result<usize, EngineError> {
        let _log = self.log_gate.read().await;
        let rs = self
            .get_studio_state(&studio_id)
            .ok_or(EngineError::NotFound(studio_id))?;
        let mut guard = rs.write().await;
        let stale = guard
            .slots
            .range(..(before, SlotTime::MIDNIGHT))
            .count();
        if stale == 0 {
            return Ok(0);
        }
        let event = Event::SlotsPruned { studio_id, before };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(stale)
    }

    /// Insert rows that do not exist yet. Returns how many were new.
    pub async fn materialize_slots(
        &self,
        studio_id: Ulid,
        rows: Vec<AvailabilitySlot>,
    ) -> Result<usize, EngineError> {
        if rows.len() > MAINTENANCE_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("slot batch too large"));
        }
        if rows.iter().any(|r| r.studio_id != studio_id) {
            return Err(EngineError::Validation("slot row belongs to another studio".into()));
        }
        let _log = self.log_gate.read().await;
        let rs = self
            .get_studio_state(&studio_id)
            .ok_or(EngineError::NotFound(studio_id))?;
        let mut guard = rs.write().await;
        let fresh: Vec<AvailabilitySlot> = rows
            .into_iter()
            .filter(|r| !guard.slots.contains_key(&(r.date, r.start_time)))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }
        let count = fresh.len();
        let event = Event::SlotsMaterialized { studio_id, rows: fresh };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(count)
    }

    /// Mark upcoming bookings dated before `today` as completed.
    pub async fn complete_past_bookings(&self, studio_id: Ulid, today: NaiveDate) -> Result<usize, EngineError> {
        let _log = self.log_gate.read().await;
        let rs = self
            .get_studio_state(&studio_id)
            .ok_or(EngineError::NotFound(studio_id))?;
        let mut guard = rs.write().await;
        let ids: Vec<Ulid> = guard
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Upcoming && b.date < today)
            .map(|b| b.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let count = ids.len();
        let event = Event::BookingsCompleted { studio_id, ids };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(count)
    }

    /// Record a paid subscription. Idempotent per payment session.
    pub async fn activate_subscription(
        &self,
        user_id: String,
        plan_id: String,
        started_on: NaiveDate,
        payment_session_id: Option<String>,
    ) -> Result<Subscription, EngineError> {
        if user_id.is_empty() || user_id.len() > MAX_USER_ID_LEN {
            return Err(EngineError::Validation("user id missing or too long".into()));
        }
        let _log = self.log_gate.read().await;
        let _serial = self.session_gate.lock().await;
        if let Some(session) = &payment_session_id
            && let Some(existing) = self.subscription_for_session(session) {
                return Ok(existing);
            }
        let renews_on = started_on
            .checked_add_months(chrono::Months::new(1))
            .ok_or_else(|| EngineError::Validation("subscription start out of range".into()))?;
        let subscription = Subscription {
            id: Ulid::new(),
            user_id,
            plan_id,
            started_on,
            renews_on,
            payment_session_id,
        };
        self.wal_append(&Event::SubscriptionActivated {
            subscription: subscription.clone(),
        })
        .await?;
        self.record_subscription(&subscription);
        info!(subscription = %subscription.id, plan = %subscription.plan_id, "activated subscription");
        Ok(subscription)
    }

    /// Record that a paid session was turned down. Returns false when it was
    /// already recorded, so only the first caller acts on the rejection.
    pub async fn reject_session(&self, session_id: String, reason: String) -> Result<bool, EngineError> {
        if session_id.is_empty() || session_id.len() > MAX_NAME_LEN {
            return Err(EngineError::Validation("payment session id missing or too long".into()));
        }
        let _log = self.log_gate.read().await;
        let _serial = self.session_gate.lock().await;
        if self.rejected_sessions.contains_key(&session_id) {
            return Ok(false);
        }
        self.wal_append(&Event::SessionRejected {
            session_id: session_id.clone(),
            reason: reason.clone(),
        })
        .await?;
        warn!(session = %session_id, "payment session rejected: {reason}");
        self.rejected_sessions.insert(session_id, reason);
        Ok(true)
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Every mutation holds the gate for reading before it touches a studio
        // lock, so with the write side held nothing can append and no studio
        // is mid-write.
        let _log = self.log_gate.write().await;
        let mut events = Vec::new();

        let studio_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        for id in studio_ids {
            let Some(rs) = self.get_studio_state(&id) else { continue };
            let guard = rs.read().await;
            events.push(Event::StudioRegistered {
                studio: guard.studio.clone(),
            });
            let rows: Vec<AvailabilitySlot> = guard.slots.values().copied().collect();
            for chunk in rows.chunks(MAINTENANCE_BATCH_SIZE) {
                events.push(Event::SlotsRestored {
                    studio_id: id,
                    rows: chunk.to_vec(),
                });
            }
            for &(date, start_time) in &guard.blocked {
                events.push(Event::SlotsBlocked {
                    studio_id: id,
                    date,
                    start_time,
                    end_time: start_time.next(),
                });
            }
            for booking in guard.bookings.values() {
                events.push(Event::BookingRestored {
                    booking: booking.clone(),
                });
            }
        }
        for entry in self.subscriptions.iter() {
            events.push(Event::SubscriptionActivated {
                subscription: entry.value().clone(),
            });
        }
        for entry in self.rejected_sessions.iter() {
            events.push(Event::SessionRejected {
                session_id: entry.key().clone(),
                reason: entry.value().clone(),
            });
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
