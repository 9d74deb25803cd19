use chrono::Utc;
use tracing::{info, warn};
use ulid::Ulid;

use crate::engine::{admit, find_conflict};
use crate::model::*;
use crate::observability;

use super::{
    validate_actor, validate_label, validate_resource_id, Admission, BookingRequest,
    RescheduleRequest, Scheduler, SchedulerError,
};

impl Scheduler {
    pub async fn schedule(
        &self,
        req: BookingRequest,
        actor: &str,
    ) -> Result<Admission, SchedulerError> {
        validate_resource_id(&req.resource_id)?;
        validate_label(req.label.as_deref())?;
        validate_actor(actor)?;
        let date = parse_date(&req.date)?;
        let interval = TimeInterval::from_clock(&req.start_time, req.duration_minutes)?;

        let key = DayKey::new(req.resource_id, date);
        let _guards = self.lock_days(vec![key.clone()]).await;

        let existing = self.store.list_bookings(&key.resource_id, date).await?;
        let conflict = find_conflict(&interval, &existing, None)?;

        let now = Utc::now();
        let mut booking = Booking {
            id: Ulid::new(),
            resource_id: key.resource_id.clone(),
            date,
            interval,
            status: BookingStatus::Scheduled,
            is_emergency: req.is_emergency,
            needs_manual_resolution: false,
            label: req.label,
            created_at: now,
            updated_at: None,
            cancelled_at: None,
        };
        let decision = admit(&booking, conflict.is_some());
        observability::record_admission(decision, booking.is_emergency);
        if conflict.is_some() {
            observability::record_conflict();
        }
        if let (AdmissionDecision::Rejected, Some(with)) = (decision, conflict) {
            info!("rejected {interval} on {key}: overlaps {with}");
            return Err(SchedulerError::Conflict(with));
        }

        booking.needs_manual_resolution = decision.needs_manual_resolution();
        self.store.save_booking(&booking).await?;

        let action = if booking.is_emergency {
            AuditAction::EmergencyBookingCreated
        } else {
            AuditAction::BookingCreated
        };
        let mut details = format!("{key} {interval}");
        if let Some(with) = conflict {
            details.push_str(&format!(", overlaps {with}, needs manual resolution"));
            warn!("emergency booking {} on {key} {interval} overlaps {with}", booking.id);
        } else {
            info!("booked {} on {key} {interval}", booking.id);
        }
        self.audit(action, booking.id, actor, details).await;

        Ok(Admission { booking, decision })
    }

    pub async fn schedule_emergency(
        &self,
        mut req: BookingRequest,
        actor: &str,
    ) -> Result<Admission, SchedulerError> {
        req.is_emergency = true;
        self.schedule(req, actor).await
    }

    /// Move or resize a booking. The policy runs again with the booking's own
    /// emergency flag, so a flagged emergency moved into free time comes out
    /// unflagged.
    pub async fn reschedule(
        &self,
        id: BookingId,
        req: RescheduleRequest,
        actor: &str,
    ) -> Result<Admission, SchedulerError> {
        if let Some(r) = &req.resource_id {
            validate_resource_id(r)?;
        }
        validate_actor(actor)?;
        let new_date = req.date.as_deref().map(parse_date).transpose()?;
        let new_start = req.start_time.as_deref().map(parse_clock).transpose()?;

        let target = |b: &Booking| {
            DayKey::new(
                req.resource_id.clone().unwrap_or_else(|| b.resource_id.clone()),
                new_date.unwrap_or(b.date),
            )
        };
        let (current, _guards) = self.lock_booking(id, &target).await?;
        if current.status.is_terminal() {
            return Err(SchedulerError::NotEditable {
                id,
                status: current.status,
            });
        }

        let interval = TimeInterval::from_start(
            new_start.unwrap_or(current.interval.start),
            req.duration_minutes
                .unwrap_or(current.interval.duration_minutes()),
        )?;
        let key = target(&current);
        let existing = self.store.list_bookings(&key.resource_id, key.date).await?;
        let conflict = find_conflict(&interval, &existing, Some(id))?;
        let decision = admit(&current, conflict.is_some());
        observability::record_admission(decision, current.is_emergency);
        if conflict.is_some() {
            observability::record_conflict();
        }
        if let (AdmissionDecision::Rejected, Some(with)) = (decision, conflict) {
            info!("rejected move of {id} to {key} {interval}: overlaps {with}");
            return Err(SchedulerError::Conflict(with));
        }

        let from = format!("{} {}", current.day_key(), current.interval);
        let mut updated = current;
        updated.resource_id = key.resource_id.clone();
        updated.date = key.date;
        updated.interval = interval;
        updated.needs_manual_resolution = decision.needs_manual_resolution();
        updated.updated_at = Some(Utc::now());
        self.store.save_booking(&updated).await?;

        let mut details = format!("{from} -> {key} {interval}");
        if updated.needs_manual_resolution {
            details.push_str(", needs manual resolution");
        }
        info!("moved {id}: {details}");
        self.audit(AuditAction::BookingRescheduled, id, actor, details)
            .await;

        Ok(Admission {
            booking: updated,
            decision,
        })
    }

    pub async fn transition(
        &self,
        id: BookingId,
        to: BookingStatus,
        actor: &str,
    ) -> Result<Booking, SchedulerError> {
        validate_actor(actor)?;
        let (current, _guards) = self.lock_booking(id, Booking::day_key).await?;
        let from = current.status;
        if !from.can_transition_to(to) {
            return Err(SchedulerError::InvalidTransition { id, from, to });
        }

        let now = Utc::now();
        let mut updated = current;
        updated.status = to;
        updated.updated_at = Some(now);
        if to == BookingStatus::Cancelled {
            updated.cancelled_at = Some(now);
        }
        self.store.save_booking(&updated).await?;
        observability::record_transition(to);

        let action = match to {
            BookingStatus::Cancelled => AuditAction::BookingCancelled,
            _ => AuditAction::StatusChanged,
        };
        info!("booking {id}: {from} -> {to}");
        self.audit(action, id, actor, format!("{from} -> {to}"))
            .await;
        Ok(updated)
    }

    pub async fn start(&self, id: BookingId, actor: &str) -> Result<Booking, SchedulerError> {
        self.transition(id, BookingStatus::InProgress, actor).await
    }

    pub async fn complete(&self, id: BookingId, actor: &str) -> Result<Booking, SchedulerError> {
        self.transition(id, BookingStatus::Completed, actor).await
    }

    /// Cancelled bookings stay on record and stop occupying time.
    pub async fn cancel(&self, id: BookingId, actor: &str) -> Result<Booking, SchedulerError> {
        self.transition(id, BookingStatus::Cancelled, actor).await
    }
}
