//! Pure booking engine: conflict detection, slot computation and the
//! emergency admission policy. No I/O and no shared state; callers supply the
//! bookings of one theater-day and decide what to persist.

mod conflict;
mod error;
mod policy;
mod slots;

pub use conflict::{find_conflict, has_conflict};
pub use error::EngineError;
pub use policy::{admit, decide};
pub use slots::{compute_slots, occupied_slots};
