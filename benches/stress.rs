use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use ulid::Ulid;

use otbook::model::WindowConfig;
use otbook::scheduler::{BookingRequest, Scheduler, SchedulerError};
use otbook::store::{BookingStore, DurableStore};

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn day(offset: u64) -> String {
    let base = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    (base + Days::new(offset)).format("%Y-%m-%d").to_string()
}

fn request(theater: &str, date: String, start: &str, duration: i64) -> BookingRequest {
    BookingRequest {
        resource_id: theater.into(),
        date,
        start_time: start.into(),
        duration_minutes: duration,
        is_emergency: false,
        label: None,
    }
}

fn open_scheduler(name: &str) -> Arc<Scheduler> {
    let dir = std::env::temp_dir().join(format!("otbook_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let store = Arc::new(DurableStore::open(dir.join(name)).unwrap());
    Arc::new(Scheduler::new(store as Arc<dyn BookingStore>, WindowConfig::default()))
}

async fn phase1_sequential(s: &Scheduler) {
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let theater = format!("{}", i % 10);
        let t = Instant::now();
        s.schedule(request(&theater, day((i / 10) as u64), "08:00", 90), "bench")
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

/// Many tasks race for the same slot on the same day; exactly one may win
/// each round.
async fn phase2_contention(s: Arc<Scheduler>) {
    let rounds = 100;
    let racers = 16;
    let accepted = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    for round in 0..rounds {
        let mut handles = Vec::with_capacity(racers);
        for _ in 0..racers {
            let s = s.clone();
            let accepted = accepted.clone();
            let rejected = rejected.clone();
            handles.push(tokio::spawn(async move {
                match s
                    .schedule(request("race", day(round), "10:00", 60), "bench")
                    .await
                {
                    Ok(_) => accepted.fetch_add(1, Ordering::Relaxed),
                    Err(SchedulerError::Conflict(_)) => rejected.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("unexpected error: {e}"),
                };
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }

    let elapsed = start.elapsed();
    let ok = accepted.load(Ordering::Relaxed);
    let lost = rejected.load(Ordering::Relaxed);
    println!(
        "  {rounds} rounds x {racers} racers in {:.2}s: {ok} accepted, {lost} rejected",
        elapsed.as_secs_f64()
    );
    assert_eq!(ok, rounds as usize, "each round must admit exactly one booking");
}

async fn phase3_slots_under_load(s: Arc<Scheduler>) {
    for h in 0..6 {
        let start = format!("{:02}:00", 8 + h * 2);
        s.schedule(request("read", day(0), &start, 60), "bench")
            .await
            .unwrap();
    }

    // Writers keep booking other days in the background
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let s = s.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let theater = format!("writer-{w}");
            let mut i = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let _ = s
                    .schedule(request(&theater, day(1 + i), "09:00", 120), "bench")
                    .await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for _ in 0..n_readers {
        let s = s.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                let report = s.available_slots("read", &day(0)).await.unwrap();
                assert_eq!(report.occupied.len(), 6);
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("slot query", &mut all_latencies);
}

#[tokio::main]
async fn main() {
    println!("=== otbook stress benchmark ===\n");

    println!("[phase 1] sequential booking throughput");
    phase1_sequential(&open_scheduler("sequential.wal")).await;

    println!("\n[phase 2] same-slot contention");
    phase2_contention(open_scheduler("contention.wal")).await;

    println!("\n[phase 3] slot query latency under write load");
    phase3_slots_under_load(open_scheduler("slots.wal")).await;

    println!("\n=== done ===");
}
