//! Metric names. The binary installs no exporter; an embedding service
//! registers its own `metrics` recorder to collect them.

use crate::model::{AdmissionDecision, BookingStatus};

// ── Decisions ───────────────────────────────────────────────────

/// Counter: admission decisions. Labels: decision, emergency.
pub const ADMISSIONS_TOTAL: &str = "otbook_admissions_total";

/// Counter: conflict checks that found an overlap (including read-only checks).
pub const CONFLICTS_TOTAL: &str = "otbook_conflicts_total";

/// Counter: status transitions. Labels: to.
pub const STATUS_TRANSITIONS_TOTAL: &str = "otbook_status_transitions_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "otbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "otbook_wal_flush_batch_size";

pub fn record_admission(decision: AdmissionDecision, is_emergency: bool) {
    let emergency = if is_emergency { "true" } else { "false" };
    metrics::counter!(ADMISSIONS_TOTAL, "decision" => decision.as_str(), "emergency" => emergency)
        .increment(1);
}

pub fn record_conflict() {
    metrics::counter!(CONFLICTS_TOTAL).increment(1);
}

pub fn record_transition(to: BookingStatus) {
    metrics::counter!(STATUS_TRANSITIONS_TOTAL, "to" => to.as_str()).increment(1);
}
