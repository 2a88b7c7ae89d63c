mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::{business_day, day_view, eligible_starts, first_blocking_slot, SlotCell};
pub use conflict::{horizon_last_day, today};
pub use error::EngineError;
pub use mutations::{CommitRequest, CommitOutcome};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use ulid::Ulid;

use crate::limits::DAYS_TO_MAINTAIN;
use crate::model::*;
use crate::slot::BusinessHours;
use crate::wal::Wal;

pub type SharedStudioState = Arc<RwLock<StudioState>>;

/// Opening hours and the rolling window of bookable dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPolicy {
    pub hours: BusinessHours,
    pub horizon_days: u32,
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self {
            hours: BusinessHours::default(),
            horizon_days: DAYS_TO_MAINTAIN,
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                flush_and_respond(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so partially buffered bytes don't leak into
    // the next batch; callers of this batch are told it failed.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Reverse lookups kept alongside studio state.
#[derive(Default)]
pub(super) struct BookingIndex {
    /// booking id → studio id
    by_id: DashMap<Ulid, Ulid>,
    /// payment session id → booking id
    by_session: DashMap<String, Ulid>,
}

pub struct Engine {
    pub state: DashMap<Ulid, SharedStudioState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) index: BookingIndex,
    pub(super) subscriptions: DashMap<Ulid, Subscription>,
    /// payment session id → subscription id
    pub(super) subscription_sessions: DashMap<String, Ulid>,
    /// payment session id → rejection reason
    pub(super) rejected_sessions: DashMap<String, String>,
    /// Serializes per-session records so a session activates or is
    /// rejected once.
    pub(super) session_gate: Mutex<()>,
    /// Read by every mutation, written by compaction.
    pub(super) log_gate: RwLock<()>,
    pub policy: SlotPolicy,
}

/// Apply an event directly to a StudioState (caller holds the lock).
fn apply_to_studio(rs: &mut StudioState, event: &Event, index: &BookingIndex) {
    match event {
        Event::SlotsMaterialized { rows, .. } => {
            for row in rows {
                rs.insert_slot_if_absent(*row);
            }
        }
        Event::SlotsRestored { rows, .. } => {
            for row in rows {
                rs.slots.insert((row.date, row.start_time), *row);
            }
        }
        Event::SlotsPruned { before, .. } => {
            rs.prune_before(*before);
        }
        Event::SlotsBlocked {
            date,
            start_time,
            end_time,
            ..
        } => {
            for slot in crate::slot::spanned_slots(*start_time, *end_time) {
                rs.set_availability(*date, slot, false);
                rs.blocked.insert((*date, slot));
            }
        }
        Event::BookingCommitted { booking } => {
            for slot in booking.spanned_slots() {
                rs.set_availability(booking.date, slot, false);
            }
            record_booking(rs, booking, index);
        }
        Event::BookingRestored { booking } => {
            record_booking(rs, booking, index);
        }
        Event::BookingCancelled { id, .. } => {
            if let Some(booking) = rs.bookings.get_mut(id) {
                booking.status = BookingStatus::Cancelled;
                let (date, slots) = (booking.date, booking.spanned_slots());
                // Only reopen rows that still exist and nothing else holds;
                // pruned days stay gone.
                for slot in slots {
                    if rs.is_slot_held(date, slot, *id) {
                        continue;
                    }
                    if let Some(row) = rs.slots.get_mut(&(date, slot)) {
                        row.is_available = true;
                    }
                }
            }
        }
        Event::BookingsCompleted { ids, .. } => {
            for id in ids {
                if let Some(booking) = rs.bookings.get_mut(id) {
                    booking.status = BookingStatus::Completed;
                }
            }
        }
        Event::StudioRegistered { studio } => {
            rs.studio = studio.clone();
        }
        // Engine-wide, not per studio
        Event::SubscriptionActivated { .. } | Event::SessionRejected { .. } => {}
    }
}

fn record_booking(rs: &mut StudioState, booking: &Booking, index: &BookingIndex) {
    index.by_id.insert(booking.id, booking.studio_id);
    if let Some(session) = &booking.payment_session_id {
        index.by_session.insert(session.clone(), booking.id);
    }
    rs.bookings.insert(booking.id, booking.clone());
}

impl Engine {
    pub fn new(wal_path: PathBuf, policy: SlotPolicy) -> std::io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        let events = replay.events;
        let wal = Wal::open(&wal_path, replay.valid_len)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            index: BookingIndex::default(),
            subscriptions: DashMap::new(),
            subscription_sessions: DashMap::new(),
            rejected_sessions: DashMap::new(),
            session_gate: Mutex::new(()),
            log_gate: RwLock::new(()),
            policy,
        };

        // Replay: we're the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never use blocking_write here because this runs
        // inside an async context.
        for event in &events {
            match event {
                Event::StudioRegistered { studio } if !engine.state.contains_key(&studio.id) => {
                    let rs = StudioState::new(studio.clone());
                    engine.state.insert(studio.id, Arc::new(RwLock::new(rs)));
                }
                Event::SubscriptionActivated { subscription } => {
                    engine.record_subscription(subscription);
                }
                Event::SessionRejected { session_id, reason } => {
                    engine
                        .rejected_sessions
                        .insert(session_id.clone(), reason.clone());
                }
                other => {
                    if let Some(studio_id) = event_studio_id(other)
                        && let Some(entry) = engine.state.get(&studio_id) {
                            let rs_arc = entry.clone();
                            let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                            apply_to_studio(&mut guard, other, &engine.index);
                        }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_studio_state(&self, id: &Ulid) -> Option<SharedStudioState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn studio_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.index.by_id.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply in one call. The event is durable before it is visible.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut StudioState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_studio(rs, event, &self.index);
        Ok(())
    }

    /// Lookup booking → studio, get studio, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<StudioState>), EngineError> {
        let studio_id = self
            .studio_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let rs = self
            .get_studio_state(&studio_id)
            .ok_or(EngineError::NotFound(studio_id))?;
        let guard = rs.write_owned().await;
        Ok((studio_id, guard))
    }

    pub(super) fn record_subscription(&self, subscription: &Subscription) {
        if let Some(session) = &subscription.payment_session_id {
            self.subscription_sessions
                .insert(session.clone(), subscription.id);
        }
        self.subscriptions
            .insert(subscription.id, subscription.clone());
    }
}

/// Extract the studio id from an event (for everything but registration and
/// subscriptions).
fn event_studio_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::SlotsMaterialized { studio_id, .. }
        | Event::SlotsRestored { studio_id, .. }
        | Event::SlotsPruned { studio_id, .. }
        | Event::SlotsBlocked { studio_id, .. }
        | Event::BookingCancelled { studio_id, .. }
        | Event::BookingsCompleted { studio_id, .. } => Some(*studio_id),
        Event::BookingCommitted { booking } | Event::BookingRestored { booking } => {
            Some(booking.studio_id)
        }
        Event::StudioRegistered { studio } => Some(studio.id),
        Event::SubscriptionActivated { .. } | Event::SessionRejected { .. } => None,
    }
}
