use crate::engine::EngineError;
use crate::model::{BookingId, BookingStatus};
use crate::store::StoreError;

#[derive(Debug)]
pub enum SchedulerError {
    Engine(EngineError),
    NotFound(BookingId),
    /// A routine booking overlaps this existing booking.
    Conflict(BookingId),
    InvalidTransition {
        id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
    },
    /// Completed and cancelled bookings cannot be moved.
    NotEditable {
        id: BookingId,
        status: BookingStatus,
    },
    LimitExceeded(&'static str),
    Storage(StoreError),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::Engine(e) => write!(f, "{e}"),
            SchedulerError::NotFound(id) => write!(f, "booking not found: {id}"),
            SchedulerError::Conflict(id) => {
                write!(f, "time conflicts with existing booking: {id}")
            }
            SchedulerError::InvalidTransition { id, from, to } => {
                write!(f, "booking {id} cannot go from {from} to {to}")
            }
            SchedulerError::NotEditable { id, status } => {
                write!(f, "booking {id} is {status} and can no longer be changed")
            }
            SchedulerError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            SchedulerError::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::Engine(e) => Some(e),
            SchedulerError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineError> for SchedulerError {
    fn from(e: EngineError) -> Self {
        SchedulerError::Engine(e)
    }
}

impl From<StoreError> for SchedulerError {
    fn from(e: StoreError) -> Self {
        SchedulerError::Storage(e)
    }
}
