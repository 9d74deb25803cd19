use crate::model::*;

use super::EngineError;

pub(crate) fn validate_interval(interval: &TimeInterval) -> Result<(), EngineError> {
    if !interval.is_well_formed() {
        return Err(EngineError::InvalidInterval(format!(
            "end {} is not after start {}",
            interval.end, interval.start
        )));
    }
    Ok(())
}

/// Return the first non-cancelled booking whose interval overlaps `candidate`.
///
/// `existing` must already be narrowed to the candidate's theater and date.
/// The booking with id `exclude` (the one being rescheduled) is skipped; an id
/// that matches nothing simply excludes nothing. Stops at the first hit.
pub fn find_conflict(
    candidate: &TimeInterval,
    existing: &[Booking],
    exclude: Option<BookingId>,
) -> Result<Option<BookingId>, EngineError> {
    validate_interval(candidate)?;
    for booking in existing {
        if !booking.is_active() || exclude == Some(booking.id) {
            continue;
        }
        // A corrupt stored interval must not read as "free".
        validate_interval(&booking.interval)?;
        if booking.interval.overlaps(candidate) {
            return Ok(Some(booking.id));
        }
    }
    Ok(None)
}

/// Does `candidate` overlap any non-cancelled booking in `existing`?
pub fn has_conflict(
    candidate: &TimeInterval,
    existing: &[Booking],
    exclude: Option<BookingId>,
) -> Result<bool, EngineError> {
    Ok(find_conflict(candidate, existing, exclude)?.is_some())
}
