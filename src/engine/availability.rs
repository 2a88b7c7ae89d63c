use crate::model::*;
use crate::slot::{BusinessHours, SlotTime, SLOTS_PER_DAY, SLOTS_PER_HOUR};

// ── Contiguity Algorithm ──────────────────────────────────────────

/// One half-hour cell of a day, explicit row or implied by absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCell {
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub is_available: bool,
    /// False when no row exists and the cell is open by default.
    pub explicit: bool,
}

/// Build the full 48-cell view of a day from whatever rows exist.
/// Missing rows are treated as open.
pub fn day_view<'a>(rows: impl IntoIterator<Item = &'a AvailabilitySlot>) -> Vec<SlotCell> {
    let mut cells: Vec<SlotCell> = (0..SLOTS_PER_DAY)
        .filter_map(SlotTime::from_index)
        .map(|start| SlotCell {
            start_time: start,
            end_time: start.next(),
            is_available: true,
            explicit: false,
        })
        .collect();
    for row in rows {
        let idx = row.start_time.index() as usize;
        if idx < cells.len() {
            cells[idx] = SlotCell {
                start_time: row.start_time,
                end_time: row.end_time,
                is_available: row.is_available,
                explicit: true,
            };
        }
    }
    cells
}

/// First slot in `[start, end)` that is taken or breaks contiguity, if any.
pub fn first_blocking_slot(view: &[SlotCell], start: SlotTime, end: SlotTime) -> Option<SlotTime> {
    let (s, e) = (start.index() as usize, end.index() as usize);
    if e > view.len() || s >= e {
        return Some(start);
    }
    for k in s..e {
        if !view[k].is_available {
            return Some(view[k].start_time);
        }
        if k + 1 < e && view[k].end_time != view[k + 1].start_time {
            return Some(view[k + 1].start_time);
        }
    }
    None
}

/// Start times at which a session of `duration_hours` fits entirely inside
/// opening hours on available, gap-free slots. Ascending; empty if none.
pub fn eligible_starts(view: &[SlotCell], duration_hours: u8, hours: &BusinessHours) -> Vec<SlotTime> {
    if duration_hours == 0 {
        return Vec::new();
    }
    let need = duration_hours as usize * SLOTS_PER_HOUR as usize;
    let open = hours.open.index() as usize;
    let close = hours.close.index() as usize;

    let mut starts = Vec::new();
    let mut i = open;
    while i + need <= close {
        let start = view[i].start_time;
        match start.plus_hours(duration_hours) {
            Some(end) if first_blocking_slot(view, start, end).is_none() => starts.push(start),
            _ => {}
        }
        i += 1;
    }
    starts
}

/// Cells within opening hours, for the public day listing.
pub fn business_day(view: &[SlotCell], hours: &BusinessHours) -> Vec<SlotCell> {
    let open = hours.open.index() as usize;
    let close = (hours.close.index() as usize).min(view.len());
    view[open..close].to_vec()
}
