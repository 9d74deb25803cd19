use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::limits::MAX_DURATION_MINUTES;

/// Minutes from midnight of the booking date. The only time type inside the engine.
pub type Minutes = i64;

pub type BookingId = Ulid;

/// Opaque theater identifier as supplied by the caller ("1", "OT-3", ...).
pub type ResourceId = String;

pub const MINUTES_PER_DAY: Minutes = 24 * 60;

/// Half-open interval `[start, end)` on a booking date.
///
/// A booking that runs past midnight keeps counting (`end > 1440`); it is only
/// ever compared against bookings of the same date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: Minutes,
    pub end: Minutes,
}

impl TimeInterval {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        debug_assert!(start < end, "TimeInterval start must be before end");
        Self { start, end }
    }

    /// Checked constructor for values that did not originate in the engine.
    pub fn try_new(start: Minutes, end: Minutes) -> Result<Self, EngineError> {
        if end <= start {
            return Err(EngineError::InvalidInterval(format!(
                "end {} is not after start {}",
                format_clock(end),
                format_clock(start)
            )));
        }
        Ok(Self { start, end })
    }

    /// Build an interval from a `HH:MM` start and a duration in minutes.
    pub fn from_clock(start: &str, duration_minutes: Minutes) -> Result<Self, EngineError> {
        Self::from_start(parse_clock(start)?, duration_minutes)
    }

    pub fn from_start(start: Minutes, duration_minutes: Minutes) -> Result<Self, EngineError> {
        if duration_minutes <= 0 {
            return Err(EngineError::InvalidInterval(format!(
                "duration must be a positive number of minutes, got {duration_minutes}"
            )));
        }
        if duration_minutes > MAX_DURATION_MINUTES {
            return Err(EngineError::InvalidInterval(format!(
                "duration {duration_minutes} exceeds {MAX_DURATION_MINUTES} minutes"
            )));
        }
        Self::try_new(start, start + duration_minutes)
    }

    pub fn duration_minutes(&self) -> Minutes {
        self.end - self.start
    }

    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }

    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", format_clock(self.start), format_clock(self.end))
    }
}

/// Parse a calendar date in `YYYY-MM-DD` form.
pub fn parse_date(s: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| EngineError::InvalidInterval(format!("unparseable date {s:?}: {e}")))
}

/// Parse a 24-hour clock time `HH:MM` into minutes from midnight.
pub fn parse_clock(s: &str) -> Result<Minutes, EngineError> {
    let t = NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| EngineError::InvalidInterval(format!("unparseable time {s:?}: {e}")))?;
    Ok(Minutes::from(t.hour()) * 60 + Minutes::from(t.minute()))
}

/// Render minutes as `HH:MM`, wrapped onto the 24-hour clock.
pub fn format_clock(minutes: Minutes) -> String {
    let m = minutes.rem_euclid(MINUTES_PER_DAY);
    format!("{:02}:{:02}", m / 60, m % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled bookings never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Scheduled, InProgress) | (InProgress, Completed) | (Scheduled, Cancelled) | (InProgress, Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub resource_id: ResourceId,
    pub date: NaiveDate,
    pub interval: TimeInterval,
    pub status: BookingStatus,
    pub is_emergency: bool,
    pub needs_manual_resolution: bool,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Cancelled bookings stay on record but never occupy time.
    pub fn is_active(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }

    pub fn day_key(&self) -> DayKey {
        DayKey::new(self.resource_id.clone(), self.date)
    }
}

/// The unit of serialization: one theater on one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayKey {
    pub resource_id: ResourceId,
    pub date: NaiveDate,
}

impl DayKey {
    pub fn new(resource_id: impl Into<ResourceId>, date: NaiveDate) -> Self {
        Self {
            resource_id: resource_id.into(),
            date,
        }
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.resource_id, self.date)
    }
}

/// Operating hours and slot geometry shared by every theater unless overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub day_start: Minutes,
    pub day_end: Minutes,
    /// Step between successive candidate slot starts.
    pub slot_granularity: Minutes,
    /// Width of each candidate slot.
    pub slot_width: Minutes,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            day_start: 8 * 60,
            day_end: 20 * 60,
            slot_granularity: 60,
            slot_width: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatingWindow {
    pub resource_id: ResourceId,
    pub date: NaiveDate,
    pub day_start: Minutes,
    pub day_end: Minutes,
    pub slot_granularity: Minutes,
    pub slot_width: Minutes,
}

impl OperatingWindow {
    pub fn new(resource_id: impl Into<ResourceId>, date: NaiveDate, config: &WindowConfig) -> Self {
        Self {
            resource_id: resource_id.into(),
            date,
            day_start: config.day_start,
            day_end: config.day_end,
            slot_granularity: config.slot_granularity,
            slot_width: config.slot_width,
        }
    }
}

/// A booked interval as reported by the slot allocator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccupiedSlot {
    pub booking_id: BookingId,
    pub interval: TimeInterval,
    pub is_emergency: bool,
    pub needs_manual_resolution: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotReport {
    pub occupied: Vec<OccupiedSlot>,
    pub free: Vec<TimeInterval>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionDecision {
    Accepted,
    /// Persisted despite a conflict; a human has to sort out the overlap.
    AcceptedFlaggedForReview,
    Rejected,
}

impl AdmissionDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionDecision::Accepted => "accepted",
            AdmissionDecision::AcceptedFlaggedForReview => "accepted_flagged_for_review",
            AdmissionDecision::Rejected => "rejected",
        }
    }

    pub fn is_accepted(&self) -> bool {
        !matches!(self, AdmissionDecision::Rejected)
    }

    pub fn needs_manual_resolution(&self) -> bool {
        matches!(self, AdmissionDecision::AcceptedFlaggedForReview)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    BookingCreated,
    EmergencyBookingCreated,
    BookingRescheduled,
    StatusChanged,
    BookingCancelled,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::BookingCreated => "booking_created",
            AuditAction::EmergencyBookingCreated => "emergency_booking_created",
            AuditAction::BookingRescheduled => "booking_rescheduled",
            AuditAction::StatusChanged => "status_changed",
            AuditAction::BookingCancelled => "booking_cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub booking_id: BookingId,
    pub actor: String,
    pub at: DateTime<Utc>,
    pub details: String,
}

/// One WAL record. Replaying them in order rebuilds the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Insert or replace a booking record.
    BookingSaved { booking: Booking },
    AuditAppended { entry: AuditEntry },
}
