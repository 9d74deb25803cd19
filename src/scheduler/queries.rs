use tracing::debug;

use crate::engine::{compute_slots, has_conflict};
use crate::limits::MAX_AUDIT_LIMIT;
use crate::model::*;
use crate::observability;

use super::{validate_resource_id, ConflictQuery, Scheduler, SchedulerError};

impl Scheduler {
    /// Read-only conflict check. Takes no lock; the answer can be stale by the
    /// time the caller acts on it.
    pub async fn check_conflict(&self, query: &ConflictQuery) -> Result<bool, SchedulerError> {
        validate_resource_id(&query.resource_id)?;
        let date = parse_date(&query.date)?;
        let interval = TimeInterval::from_clock(&query.start_time, query.duration_minutes)?;
        let existing = self.store.list_bookings(&query.resource_id, date).await?;
        let conflict = has_conflict(&interval, &existing, query.exclude)?;
        if conflict {
            observability::record_conflict();
        }
        debug!(
            "check {}@{date} {interval}: conflict={conflict}",
            query.resource_id
        );
        Ok(conflict)
    }

    /// Free and occupied slots for one theater on one date, using the
    /// configured operating window.
    pub async fn available_slots(
        &self,
        resource_id: &str,
        date: &str,
    ) -> Result<SlotReport, SchedulerError> {
        validate_resource_id(resource_id)?;
        let window = OperatingWindow::new(resource_id, parse_date(date)?, &self.window);
        self.available_slots_in(&window).await
    }

    pub async fn available_slots_in(
        &self,
        window: &OperatingWindow,
    ) -> Result<SlotReport, SchedulerError> {
        let existing = self
            .store
            .list_bookings(&window.resource_id, window.date)
            .await?;
        Ok(compute_slots(window, &existing)?)
    }

    /// Every booking for the day, cancelled ones included, ordered by start.
    pub async fn list_bookings(
        &self,
        resource_id: &str,
        date: &str,
    ) -> Result<Vec<Booking>, SchedulerError> {
        validate_resource_id(resource_id)?;
        let date = parse_date(date)?;
        Ok(self.store.list_bookings(resource_id, date).await?)
    }

    pub async fn get_booking(&self, id: BookingId) -> Result<Booking, SchedulerError> {
        self.load(id).await
    }

    /// Newest entries first.
    pub async fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>, SchedulerError> {
        if limit > MAX_AUDIT_LIMIT {
            return Err(SchedulerError::LimitExceeded("audit limit too large"));
        }
        Ok(self.store.recent_audit(limit).await?)
    }
}
