use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;

use crate::limits::MAX_BOOKINGS_PER_DAY;
use crate::model::*;

use super::{BookingStore, StoreError};

pub struct InMemoryStore {
    bookings: DashMap<BookingId, Booking>,
    /// (theater, date) → booking ids, in insertion order.
    days: DashMap<DayKey, Vec<BookingId>>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
            days: DashMap::new(),
            audit: Mutex::new(Vec::new()),
        }
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn booking(&self, id: &BookingId) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    pub fn bookings_for(&self, key: &DayKey) -> Vec<Booking> {
        let ids = self
            .days
            .get(key)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut out: Vec<Booking> = ids.iter().filter_map(|id| self.booking(id)).collect();
        out.sort_by_key(|b| b.interval.start);
        out
    }

    pub fn audit_tail(&self, limit: usize) -> Vec<AuditEntry> {
        let audit = self.audit.lock().unwrap_or_else(PoisonError::into_inner);
        audit.iter().rev().take(limit).cloned().collect()
    }

    /// Reject an active record landing on a day that already holds the
    /// maximum number of active bookings. Applies to moves as well as new
    /// records; cancelled bookings take no capacity.
    pub fn check_day_capacity(&self, booking: &Booking) -> Result<(), StoreError> {
        if !booking.is_active() {
            return Ok(());
        }
        let others = self
            .days
            .get(&booking.day_key())
            .map(|ids| {
                ids.iter()
                    .filter(|id| **id != booking.id)
                    .filter(|id| self.bookings.get(*id).is_some_and(|b| b.is_active()))
                    .count()
            })
            .unwrap_or(0);
        if others >= MAX_BOOKINGS_PER_DAY {
            return Err(StoreError::LimitExceeded("too many bookings for theater on date"));
        }
        Ok(())
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::BookingSaved { booking } => {
                let key = booking.day_key();
                if let Some(prev) = self.bookings.insert(booking.id, booking.clone()) {
                    let prev_key = prev.day_key();
                    if prev_key == key {
                        return;
                    }
                    if let Some(mut ids) = self.days.get_mut(&prev_key) {
                        ids.retain(|id| *id != booking.id);
                    }
                }
                self.days.entry(key).or_default().push(booking.id);
            }
            Event::AuditAppended { entry } => {
                self.audit
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(entry.clone());
            }
        }
    }

    /// The minimal event sequence that rebuilds this store: one save per
    /// booking, then the audit trail in order.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut bookings: Vec<Booking> = self.bookings.iter().map(|e| e.value().clone()).collect();
        bookings.sort_by_key(|b| b.id);
        let mut events: Vec<Event> = bookings
            .into_iter()
            .map(|booking| Event::BookingSaved { booking })
            .collect();
        let audit = self.audit.lock().unwrap_or_else(PoisonError::into_inner);
        events.extend(audit.iter().cloned().map(|entry| Event::AuditAppended { entry }));
        events
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn list_bookings(&self, resource_id: &str, date: NaiveDate) -> Result<Vec<Booking>, StoreError> {
        Ok(self.bookings_for(&DayKey::new(resource_id, date)))
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.booking(&id))
    }

    async fn save_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        self.check_day_capacity(booking)?;
        self.apply_event(&Event::BookingSaved {
            booking: booking.clone(),
        });
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.apply_event(&Event::AuditAppended { entry: entry.clone() });
        Ok(())
    }

    async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.audit_tail(limit))
    }
}
