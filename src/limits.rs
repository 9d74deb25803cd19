//! Hard limits on caller-supplied input.

use crate::model::Minutes;

/// A single booking may not run longer than a full day.
pub const MAX_DURATION_MINUTES: Minutes = 24 * 60;

pub const MAX_RESOURCE_ID_LEN: usize = 64;

pub const MAX_LABEL_LEN: usize = 1024;

pub const MAX_ACTOR_LEN: usize = 256;

/// Active (non-cancelled) bookings for one theater on one date.
pub const MAX_BOOKINGS_PER_DAY: usize = 512;

pub const MAX_AUDIT_LIMIT: usize = 1000;
