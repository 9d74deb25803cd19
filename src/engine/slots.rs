use crate::model::*;

use super::conflict::validate_interval;
use super::EngineError;

// ── Slot Algorithm ────────────────────────────────────────────────

fn validate_window(window: &OperatingWindow) -> Result<(), EngineError> {
    if window.day_start >= window.day_end {
        return Err(EngineError::InvalidWindow(format!(
            "day start {} is not before day end {}",
            format_clock(window.day_start),
            format_clock(window.day_end)
        )));
    }
    if window.day_start < 0 || window.day_end > MINUTES_PER_DAY {
        return Err(EngineError::InvalidWindow(
            "operating hours must lie within one day".into(),
        ));
    }
    if window.slot_granularity <= 0 {
        return Err(EngineError::InvalidWindow(format!(
            "slot granularity must be positive, got {}",
            window.slot_granularity
        )));
    }
    if window.slot_width <= 0 {
        return Err(EngineError::InvalidWindow(format!(
            "slot width must be positive, got {}",
            window.slot_width
        )));
    }
    if window.slot_granularity > MINUTES_PER_DAY || window.slot_width > MINUTES_PER_DAY {
        return Err(EngineError::InvalidWindow(format!(
            "slot granularity {} and width {} must not exceed {MINUTES_PER_DAY} minutes",
            window.slot_granularity, window.slot_width
        )));
    }
    Ok(())
}

/// Non-cancelled bookings as occupied intervals, sorted by start.
/// The sort is stable so equal starts keep their storage order.
pub fn occupied_slots(existing: &[Booking]) -> Result<Vec<OccupiedSlot>, EngineError> {
    let mut occupied = Vec::with_capacity(existing.len());
    for booking in existing.iter().filter(|b| b.is_active()) {
        validate_interval(&booking.interval)?;
        occupied.push(OccupiedSlot {
            booking_id: booking.id,
            interval: booking.interval,
            is_emergency: booking.is_emergency,
            needs_manual_resolution: booking.needs_manual_resolution,
        });
    }
    occupied.sort_by_key(|o| o.interval.start);
    Ok(occupied)
}

/// Occupied intervals plus fixed-width free slots for one theater-day.
///
/// Candidate slots start at `day_start` and advance by `slot_granularity` for
/// as long as a full `slot_width` still fits before `day_end`. A candidate is
/// free iff it overlaps no occupied interval. Candidates may overlap each
/// other and free slots are never merged.
pub fn compute_slots(window: &OperatingWindow, existing: &[Booking]) -> Result<SlotReport, EngineError> {
    validate_window(window)?;
    let occupied = occupied_slots(existing)?;

    let mut free = Vec::new();
    let mut slot_start = window.day_start;
    while slot_start + window.slot_width <= window.day_end {
        let candidate = TimeInterval::new(slot_start, slot_start + window.slot_width);
        if !occupied.iter().any(|o| o.interval.overlaps(&candidate)) {
            free.push(candidate);
        }
        slot_start += window.slot_granularity;
    }

    Ok(SlotReport { occupied, free })
}
