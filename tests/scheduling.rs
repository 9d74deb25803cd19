use std::path::PathBuf;
use std::sync::Arc;

use ulid::Ulid;

use otbook::model::{AdmissionDecision, AuditAction, BookingStatus, WindowConfig};
use otbook::scheduler::{BookingRequest, ConflictQuery, Scheduler, SchedulerError};
use otbook::store::{BookingStore, DurableStore};

// ── Test infrastructure ──────────────────────────────────────

fn wal_path() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("otbook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("bookings.wal")
}

fn open(path: &PathBuf) -> (Arc<DurableStore>, Scheduler) {
    let store = Arc::new(DurableStore::open(path.clone()).unwrap());
    let scheduler = Scheduler::new(store.clone() as Arc<dyn BookingStore>, WindowConfig::default());
    (store, scheduler)
}

fn request(start: &str, duration: i64, is_emergency: bool) -> BookingRequest {
    BookingRequest {
        resource_id: "OT-1".into(),
        date: "2025-03-10".into(),
        start_time: start.into(),
        duration_minutes: duration,
        is_emergency,
        label: Some("hip replacement".into()),
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn flagged_emergency_survives_restart() {
    let path = wal_path();
    let (routine_id, er_id) = {
        let (_, s) = open(&path);
        let routine = s.schedule(request("09:00", 120, false), "desk").await.unwrap();
        let er = s.schedule(request("10:00", 60, true), "er").await.unwrap();
        assert_eq!(er.decision, AdmissionDecision::AcceptedFlaggedForReview);
        (routine.booking.id, er.booking.id)
    };

    let (_, s) = open(&path);
    let er = s.get_booking(er_id).await.unwrap();
    assert!(er.is_emergency);
    assert!(er.needs_manual_resolution);
    assert_eq!(er.label.as_deref(), Some("hip replacement"));
    assert!(!s.get_booking(routine_id).await.unwrap().needs_manual_resolution);

    let report = s.available_slots("OT-1", "2025-03-10").await.unwrap();
    assert_eq!(report.occupied.len(), 2);
    assert!(report.occupied.iter().any(|o| o.booking_id == er_id && o.needs_manual_resolution));

    let audit = s.audit_log(10).await.unwrap();
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[0].action, AuditAction::EmergencyBookingCreated);
    assert_eq!(audit[1].action, AuditAction::BookingCreated);
}

#[tokio::test]
async fn cancellation_survives_restart_and_frees_time() {
    let path = wal_path();
    let id = {
        let (_, s) = open(&path);
        let b = s.schedule(request("13:00", 90, false), "desk").await.unwrap();
        s.cancel(b.booking.id, "desk").await.unwrap();
        b.booking.id
    };

    let (_, s) = open(&path);
    let b = s.get_booking(id).await.unwrap();
    assert_eq!(b.status, BookingStatus::Cancelled);
    let query = ConflictQuery {
        resource_id: "OT-1".into(),
        date: "2025-03-10".into(),
        start_time: "13:30".into(),
        duration_minutes: 30,
        exclude: None,
    };
    assert!(!s.check_conflict(&query).await.unwrap());
    assert_eq!(s.available_slots("OT-1", "2025-03-10").await.unwrap().free.len(), 11);
}

#[tokio::test]
async fn compaction_keeps_bookings_and_audit() {
    let path = wal_path();
    {
        let (store, s) = open(&path);
        for h in 8..14 {
            let start = format!("{h:02}:00");
            let b = s.schedule(request(&start, 60, false), "desk").await.unwrap();
            s.start(b.booking.id, "surgeon").await.unwrap();
        }
        assert!(store.compact_if_needed(10).await.unwrap());
    }

    let (store, s) = open(&path);
    assert_eq!(store.booking_count(), 6);
    let listed = s.list_bookings("OT-1", "2025-03-10").await.unwrap();
    assert!(listed.iter().all(|b| b.status == BookingStatus::InProgress));
    assert_eq!(s.audit_log(100).await.unwrap().len(), 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_requests_persist_a_single_booking() {
    let path = wal_path();
    {
        let (_, s) = open(&path);
        let s = Arc::new(s);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let s = s.clone();
            handles.push(tokio::spawn(async move {
                s.schedule(request("15:00", 45, false), "desk").await
            }));
        }
        let mut wins = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => wins += 1,
                Err(SchedulerError::Conflict(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(wins, 1);
    }

    let (_, s) = open(&path);
    assert_eq!(s.list_bookings("OT-1", "2025-03-10").await.unwrap().len(), 1);
}
