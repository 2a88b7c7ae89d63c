use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::slot::{spanned_slots, SlotTime};

/// Money in minor currency units (cents).
pub type Cents = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Studio {
    pub id: Ulid,
    pub name: String,
    pub location: String,
    pub price_per_hour: Cents,
    pub max_guests: u32,
    /// Longest bookable session in whole hours.
    pub max_booking_duration: u8,
    #[serde(default)]
    pub description: String,
}

/// One half-hour row of a studio's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySlot {
    pub studio_id: Ulid,
    pub date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub is_available: bool,
}

impl AvailabilitySlot {
    pub fn open(studio_id: Ulid, date: NaiveDate, start_time: SlotTime) -> Self {
        Self {
            studio_id,
            date,
            start_time,
            end_time: start_time.next(),
            is_available: true,
        }
    }

    pub fn taken(studio_id: Ulid, date: NaiveDate, start_time: SlotTime) -> Self {
        Self {
            is_available: false,
            ..Self::open(studio_id, date, start_time)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Upcoming,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Subscription,
    HourPackage,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Subscription => "subscription",
            ServiceKind::HourPackage => "hour_package",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "subscription" => Some(ServiceKind::Subscription),
            "hour_package" => Some(ServiceKind::HourPackage),
            _ => None,
        }
    }
}

/// Which catalog entry paid for a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRef {
    pub kind: ServiceKind,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Ulid,
    pub user_id: String,
    pub studio_id: Ulid,
    pub date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub number_of_guests: u32,
    pub total_price: Cents,
    pub status: BookingStatus,
    pub service: ServiceRef,
    pub payment_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn spanned_slots(&self) -> Vec<SlotTime> {
        spanned_slots(self.start_time, self.end_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Ulid,
    pub user_id: String,
    pub plan_id: String,
    pub started_on: NaiveDate,
    pub renews_on: NaiveDate,
    pub payment_session_id: Option<String>,
}

/// The client's in-progress selection, echoed back through payment metadata.
/// Never authoritative: everything in it is re-validated before commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDraft {
    pub studio_id: Ulid,
    pub date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub duration: u8,
    pub number_of_guests: u32,
}

/// In-memory state of one studio: reference data, slot rows and bookings.
#[derive(Debug, Clone)]
pub struct StudioState {
    pub studio: Studio,
    /// Explicit rows keyed by (date, start). Absence means implicitly open.
    pub slots: BTreeMap<(NaiveDate, SlotTime), AvailabilitySlot>,
    pub bookings: BTreeMap<Ulid, Booking>,
    /// Slots an admin closed. A cancellation never reopens these.
    pub blocked: BTreeSet<(NaiveDate, SlotTime)>,
}

impl StudioState {
    pub fn new(studio: Studio) -> Self {
        Self {
            studio,
            slots: BTreeMap::new(),
            bookings: BTreeMap::new(),
            blocked: BTreeSet::new(),
        }
    }

    pub fn day(&self, date: NaiveDate) -> impl Iterator<Item = &AvailabilitySlot> {
        self.slots
            .range((date, SlotTime::MIDNIGHT)..=(date, SlotTime::END_OF_DAY))
            .map(|(_, row)| row)
    }

    pub fn max_date(&self) -> Option<NaiveDate> {
        self.slots.keys().next_back().map(|(d, _)| *d)
    }

    /// True when the slot is blocked or spanned by an upcoming booking
    /// other than `except`.
    pub fn is_slot_held(&self, date: NaiveDate, start: SlotTime, except: Ulid) -> bool {
        self.blocked.contains(&(date, start))
            || self.bookings.values().any(|b| {
                b.id != except
                    && b.status == BookingStatus::Upcoming
                    && b.date == date
                    && b.start_time <= start
                    && start < b.end_time
            })
    }

    /// Insert a row unless one exists for the same (date, start).
    pub fn insert_slot_if_absent(&mut self, row: AvailabilitySlot) -> bool {
        let key = (row.date, row.start_time);
        if self.slots.contains_key(&key) {
            return false;
        }
        self.slots.insert(key, row);
        true
    }

    /// Set availability for a slot, inserting a row if none exists.
    pub fn set_availability(&mut self, date: NaiveDate, start: SlotTime, is_available: bool) {
        let studio_id = self.studio.id;
        self.slots
            .entry((date, start))
            .or_insert_with(|| AvailabilitySlot::open(studio_id, date, start))
            .is_available = is_available;
    }

    /// Drop every row dated before `before`. Returns how many went.
    pub fn prune_before(&mut self, before: NaiveDate) -> usize {
        let kept = self.slots.split_off(&(before, SlotTime::MIDNIGHT));
        let removed = self.slots.len();
        self.slots = kept;
        self.blocked = self.blocked.split_off(&(before, SlotTime::MIDNIGHT));
        removed
    }
}

/// Log record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Insert or replace studio reference data.
    StudioRegistered { studio: Studio },
    /// Insert rows that do not exist yet.
    SlotsMaterialized {
        studio_id: Ulid,
        rows: Vec<AvailabilitySlot>,
    },
    /// Delete every row dated before `before`.
    SlotsPruned { studio_id: Ulid, before: NaiveDate },
    /// Admin closes a window without a booking. The slots stay closed
    /// through later cancellations.
    SlotsBlocked {
        studio_id: Ulid,
        date: NaiveDate,
        start_time: SlotTime,
        end_time: SlotTime,
    },
    /// Mark the spanned slots taken and insert the booking.
    BookingCommitted { booking: Booking },
    /// Cancel a booking and reopen its slots.
    BookingCancelled { id: Ulid, studio_id: Ulid },
    BookingsCompleted { studio_id: Ulid, ids: Vec<Ulid> },
    SubscriptionActivated { subscription: Subscription },
    /// Compaction snapshot: overwrite rows as-is.
    SlotsRestored {
        studio_id: Ulid,
        rows: Vec<AvailabilitySlot>,
    },
    /// Compaction snapshot: insert a booking without touching slots.
    BookingRestored { booking: Booking },
    /// A paid session was turned down after payment. It never books.
    SessionRejected { session_id: String, reason: String },
}
