//! Booking service: runs the conflict engine against stored bookings and
//! persists the outcome.
//!
//! Every check-then-write happens under an async mutex keyed by
//! `(theater, date)`, so two requests racing for the same slot are decided
//! one after the other. Keys are always locked in sorted order.

mod error;
mod mutations;
mod queries;


use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::limits::*;
use crate::model::*;
use crate::store::BookingStore;

pub use error::SchedulerError;

/// A request for a new booking, in the units callers speak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub resource_id: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub start_time: String,
    pub duration_minutes: Minutes,
    pub is_emergency: bool,
    pub label: Option<String>,
}

/// Fields left as `None` keep the booking's current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescheduleRequest {
    pub resource_id: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub duration_minutes: Option<Minutes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictQuery {
    pub resource_id: String,
    pub date: String,
    pub start_time: String,
    pub duration_minutes: Minutes,
    /// Ignore this booking, typically the one being moved.
    pub exclude: Option<BookingId>,
}

/// A persisted booking together with the policy decision that let it in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub booking: Booking,
    pub decision: AdmissionDecision,
}

pub struct Scheduler {
    store: Arc<dyn BookingStore>,
    window: WindowConfig,
    day_locks: DashMap<DayKey, Arc<Mutex<()>>>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn BookingStore>, window: WindowConfig) -> Self {
        Self {
            store,
            window,
            day_locks: DashMap::new(),
        }
    }

    pub fn window(&self) -> &WindowConfig {
        &self.window
    }

    /// Acquire the locks for `keys` in sorted order, skipping duplicates.
    async fn lock_days(&self, mut keys: Vec<DayKey>) -> Vec<OwnedMutexGuard<()>> {
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let lock = self.day_locks.entry(key).or_default().clone();
            guards.push(lock.lock_owned().await);
        }
        guards
    }

    /// Lock the day `id` currently lives on together with `target(&booking)`,
    /// then return the booking as read under those locks. Retries if the
    /// booking moved to another day while we waited.
    async fn lock_booking<F>(
        &self,
        id: BookingId,
        target: F,
    ) -> Result<(Booking, Vec<OwnedMutexGuard<()>>), SchedulerError>
    where
        F: Fn(&Booking) -> DayKey,
    {
        loop {
            let seen = self.load(id).await?;
            let home = seen.day_key();
            let guards = self.lock_days(vec![home.clone(), target(&seen)]).await;
            let current = self.load(id).await?;
            if current.day_key() == home {
                return Ok((current, guards));
            }
            debug!("booking {id} moved from {home} while locking, retrying");
        }
    }

    async fn load(&self, id: BookingId) -> Result<Booking, SchedulerError> {
        self.store
            .get_booking(id)
            .await?
            .ok_or(SchedulerError::NotFound(id))
    }

    /// Record an audit entry for a change that is already persisted. Failures
    /// are logged, not returned.
    async fn audit(&self, action: AuditAction, booking_id: BookingId, actor: &str, details: String) {
        let entry = AuditEntry {
            action,
            booking_id,
            actor: actor.to_string(),
            at: Utc::now(),
            details,
        };
        if let Err(e) = self.store.append_audit(&entry).await {
            warn!("audit entry {} for {booking_id} lost: {e}", action.as_str());
        }
    }
}

fn validate_resource_id(resource_id: &str) -> Result<(), SchedulerError> {
    if resource_id.trim().is_empty() {
        return Err(SchedulerError::LimitExceeded("theater id must not be empty"));
    }
    if resource_id.len() > MAX_RESOURCE_ID_LEN {
        return Err(SchedulerError::LimitExceeded("theater id too long"));
    }
    Ok(())
}

fn validate_label(label: Option<&str>) -> Result<(), SchedulerError> {
    if let Some(l) = label
        && l.len() > MAX_LABEL_LEN
    {
        return Err(SchedulerError::LimitExceeded("label too long"));
    }
    Ok(())
}

fn validate_actor(actor: &str) -> Result<(), SchedulerError> {
    if actor.len() > MAX_ACTOR_LEN {
        return Err(SchedulerError::LimitExceeded("actor too long"));
    }
    Ok(())
}
