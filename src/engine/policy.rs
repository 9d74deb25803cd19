use crate::model::{AdmissionDecision, Booking};

/// Emergency override policy.
///
/// Routine bookings are rejected on conflict. Emergencies are never rejected;
/// a conflicting emergency is accepted and flagged for manual resolution.
pub fn decide(is_emergency: bool, has_conflict: bool) -> AdmissionDecision {
    match (is_emergency, has_conflict) {
        (_, false) => AdmissionDecision::Accepted,
        (false, true) => AdmissionDecision::Rejected,
        (true, true) => AdmissionDecision::AcceptedFlaggedForReview,
    }
}

/// Decide whether `candidate` may be persisted given the conflict detector's answer.
pub fn admit(candidate: &Booking, has_conflict: bool) -> AdmissionDecision {
    decide(candidate.is_emergency, has_conflict)
}
