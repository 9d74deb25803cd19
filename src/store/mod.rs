//! Storage collaborator for the scheduler: booking records, the day index the
//! engine reads from, and the append-only audit trail.

mod durable;
mod memory;

pub use durable::DurableStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::*;

#[derive(Debug)]
pub enum StoreError {
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Every booking recorded for the theater on `date`, cancelled ones
    /// included, ordered by start time.
    async fn list_bookings(&self, resource_id: &str, date: NaiveDate) -> Result<Vec<Booking>, StoreError>;

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    /// Insert or replace by id. A changed theater or date moves the record
    /// to its new day.
    async fn save_booking(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError>;

    /// Newest first.
    async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError>;
}
