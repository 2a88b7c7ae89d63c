use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of half-hour slots in a day.
pub const SLOTS_PER_DAY: u8 = 48;

/// Half-hour slots per booked hour.
pub const SLOTS_PER_HOUR: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    InvalidTimeFormat(String),
}

impl fmt::Display for SlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotError::InvalidTimeFormat(s) => {
                write!(f, "invalid time format: {s:?} (expected HH:MM on a half hour)")
            }
        }
    }
}

impl std::error::Error for SlotError {}

/// Parse `"HH:MM"` into a slot index in `[0, 48)`.
pub fn time_to_index(time: &str) -> Result<u8, SlotError> {
    let invalid = || SlotError::InvalidTimeFormat(time.to_string());
    let (h, m) = time.split_once(':').ok_or_else(invalid)?;
    if h.len() != 2 || m.len() != 2 {
        return Err(invalid());
    }
    let hours: u8 = h.parse().map_err(|_| invalid())?;
    let minutes: u8 = m.parse().map_err(|_| invalid())?;
    if hours >= 24 {
        return Err(invalid());
    }
    let half = match minutes {
        0 => 0,
        30 => 1,
        _ => return Err(invalid()),
    };
    Ok(hours * SLOTS_PER_HOUR + half)
}

/// Render a slot boundary as `"HH:MM"`. Index 48 is the end of the day, `"24:00"`.
pub fn index_to_time(index: u8) -> String {
    let hours = index / SLOTS_PER_HOUR;
    let minutes = if index % SLOTS_PER_HOUR == 0 { 0 } else { 30 };
    format!("{hours:02}:{minutes:02}")
}

/// A half-hour boundary within a day: 0 is 00:00, 48 is 24:00.
///
/// Serialized as `"HH:MM"` both on the wire and in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotTime(u8);

impl SlotTime {
    pub const MIDNIGHT: SlotTime = SlotTime(0);
    pub const END_OF_DAY: SlotTime = SlotTime(SLOTS_PER_DAY);

    pub fn from_index(index: u8) -> Option<Self> {
        (index <= SLOTS_PER_DAY).then_some(Self(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Boundary 30 minutes later, saturating at 24:00.
    pub fn next(self) -> Self {
        Self((self.0 + 1).min(SLOTS_PER_DAY))
    }

    /// `None` if the result would run past midnight.
    pub fn plus_hours(self, hours: u8) -> Option<Self> {
        let idx = self.0 as u16 + hours as u16 * SLOTS_PER_HOUR as u16;
        (idx <= SLOTS_PER_DAY as u16).then(|| Self(idx as u8))
    }

    /// Whole hours between `self` and a later boundary, if the gap is whole.
    pub fn hours_until(self, end: SlotTime) -> Option<u8> {
        if end.0 <= self.0 {
            return None;
        }
        let gap = end.0 - self.0;
        (gap % SLOTS_PER_HOUR == 0).then_some(gap / SLOTS_PER_HOUR)
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&index_to_time(self.0))
    }
}

impl FromStr for SlotTime {
    type Err = SlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "24:00" {
            return Ok(Self::END_OF_DAY);
        }
        time_to_index(s).map(Self)
    }
}

impl TryFrom<String> for SlotTime {
    type Error = SlotError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SlotTime> for String {
    fn from(t: SlotTime) -> Self {
        t.to_string()
    }
}

/// Half-hour starts covering `[start, end)`. Empty when `end <= start`.
pub fn spanned_slots(start: SlotTime, end: SlotTime) -> Vec<SlotTime> {
    (start.0..end.0.min(SLOTS_PER_DAY)).map(SlotTime).collect()
}

/// Opening window in which slots are materialized and sessions may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    pub open: SlotTime,
    pub close: SlotTime,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            open: SlotTime(16),  // 08:00
            close: SlotTime(39), // 19:30
        }
    }
}

impl BusinessHours {
    pub fn new(open: SlotTime, close: SlotTime) -> Result<Self, SlotError> {
        if open >= close {
            return Err(SlotError::InvalidTimeFormat(format!("{open}-{close}")));
        }
        Ok(Self { open, close })
    }

    /// Every slot start inside opening hours, ascending.
    pub fn slot_starts(&self) -> Vec<SlotTime> {
        spanned_slots(self.open, self.close)
    }

    pub fn slot_count(&self) -> usize {
        (self.close.0 - self.open.0) as usize
    }

    pub fn contains_window(&self, start: SlotTime, end: SlotTime) -> bool {
        self.open <= start && start < end && end <= self.close
    }
}
