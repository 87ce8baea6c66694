use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Datelike, Days, NaiveDate, NaiveTime, Weekday};
use ulid::Ulid;

use slotkeeper::clock::Clock;
use slotkeeper::config::Rules;
use slotkeeper::engine::{AvailabilityQuery, Engine, RecomputeOptions, ReservationRequest};
use slotkeeper::model::*;
use slotkeeper::notify::NotifyHub;
use slotkeeper::policy::Policy;

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

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, 2).expect("valid date")
}

/// Open days (Monday-Saturday under the default calendar) after today.
fn open_days(n: usize) -> Vec<NaiveDate> {
    (1..)
        .filter_map(|i| today().checked_add_days(Days::new(i)))
        .filter(|d| d.weekday() != Weekday::Sun)
        .take(n)
        .collect()
}

fn slot(i: usize) -> NaiveTime {
    // 09:00 .. 19:00 on the half hour.
    time_of(540 + (i as u32 % 21) * 30).expect("within the day")
}

struct Salon {
    engine: Arc<Engine>,
    rules: Arc<Rules>,
    therapists: Vec<Ulid>,
    service: Ulid,
}

async fn open_salon(name: &str, therapists: usize) -> Salon {
    let dir = std::env::temp_dir().join(format!("slotkeeper_bench_{name}_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).expect("create bench dir");
    let clock = Clock::Fixed(today().and_time(NaiveTime::from_hms_opt(8, 0, 0).expect("valid time")));
    let engine = Engine::new(dir.join("slotkeeper.wal"), Arc::new(NotifyHub::new()), clock).expect("open engine");

    let mut ids = Vec::with_capacity(therapists);
    for i in 0..therapists {
        let id = Ulid::new();
        engine
            .register_resource(id, Some(format!("therapist {i}")), true)
            .await
            .expect("register therapist");
        ids.push(id);
    }
    let service = Ulid::new();
    engine
        .register_service(service, Some("facial".into()), 30, true)
        .await
        .expect("register service");

    let rules = Rules {
        policy: Policy {
            buffer_minutes: 0,
            daily_booking_limit: None,
            allow_concurrent_same_time: true,
            ..Policy::default()
        },
        ..Rules::default()
    };
    Salon {
        engine: Arc::new(engine),
        rules: Arc::new(rules),
        therapists: ids,
        service,
    }
}

fn request(salon: &Salon, therapist: Ulid, date: NaiveDate, time: NaiveTime, n: usize) -> ReservationRequest {
    ReservationRequest {
        customer: CustomerRef::new(format!("guest{n}@example.com"), None),
        service_id: salon.service,
        resource: ResourceSelector::Specific(therapist),
        date,
        time,
        notes: None,
    }
}

async fn phase1_sequential() {
    let salon = open_salon("sequential", 1).await;
    let therapist = salon.therapists[0];
    let days = open_days(60);

    let n = days.len() * 21;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();
    for i in 0..n {
        let req = request(&salon, therapist, days[i / 21], slot(i), i);
        let t = Instant::now();
        salon.engine.reserve(&salon.rules, req).await.expect("free slot");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} reservations in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("reserve latency", &mut latencies);
}

async fn phase2_contention() {
    let salon = Arc::new(open_salon("contention", 4).await);
    let days = open_days(5);
    let n_tasks = 32;

    let start = Instant::now();
    let mut handles = Vec::new();
    for task in 0..n_tasks {
        let salon = salon.clone();
        let days = days.clone();
        handles.push(tokio::spawn(async move {
            let mut won = 0usize;
            for (i, &date) in days.iter().enumerate() {
                for s in 0..21 {
                    let therapist = salon.therapists[(task + i) % salon.therapists.len()];
                    let req = request(&salon, therapist, date, slot(s), task * 1000 + s);
                    if salon.engine.reserve(&salon.rules, req).await.is_ok() {
                        won += 1;
                    }
                }
            }
            won
        }));
    }

    let mut booked = 0;
    for result in futures::future::join_all(handles).await {
        booked += result.expect("task panicked");
    }
    let elapsed = start.elapsed();
    let attempts = n_tasks * days.len() * 21;
    let capacity = salon.therapists.len() * days.len() * 21;
    println!(
        "  {n_tasks} tasks, {attempts} attempts: {booked} booked (capacity {capacity}) in {:.2}s",
        elapsed.as_secs_f64()
    );
    assert_eq!(booked, capacity, "every slot filled exactly once");
}

async fn phase3_read_under_load() {
    let salon = Arc::new(open_salon("read_load", 8).await);
    let days = open_days(20);
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let mut writers = Vec::new();
    for w in 0..4 {
        let salon = salon.clone();
        let days = days.clone();
        let stop = stop.clone();
        writers.push(tokio::spawn(async move {
            let mut i = 0usize;
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                let therapist = salon.therapists[(w + i) % salon.therapists.len()];
                let date = days[i % days.len()];
                let _ = salon
                    .engine
                    .reserve(&salon.rules, request(&salon, therapist, date, slot(i / days.len()), i))
                    .await;
                i += 1;
            }
        }));
    }

    let n_readers = 8;
    let reads_per_reader = 500;
    let mut readers = Vec::new();
    for r in 0..n_readers {
        let salon = salon.clone();
        let days = days.clone();
        readers.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let therapist = salon.therapists[(r + i) % salon.therapists.len()];
                let query = AvailabilityQuery::new(days[i % days.len()], ResourceSelector::Specific(therapist))
                    .with_duration(30);
                let t = Instant::now();
                salon
                    .engine
                    .get_availability(&salon.rules, query)
                    .await
                    .expect("query inside horizon");
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in readers {
        all_latencies.extend(h.await.expect("reader panicked"));
    }
    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }

    print_latency("availability query", &mut all_latencies);
}

async fn phase4_horizon_recompute() {
    let salon = open_salon("horizon", 6).await;
    for (d, date) in open_days(60).into_iter().enumerate() {
        for (i, &therapist) in salon.therapists.iter().enumerate() {
            // Two bookings with an idle hour between them.
            for s in [i % 4, i % 4 + 4] {
                let req = request(&salon, therapist, date, slot(s), d * 100 + i * 10 + s);
                let _ = salon.engine.reserve(&salon.rules, req).await;
            }
        }
    }

    let start = Instant::now();
    let report = salon
        .engine
        .recompute_horizon(&salon.rules, RecomputeOptions::default())
        .await
        .expect("recompute");
    println!(
        "  no-op recompute over {} dates in {:.2}ms ({} buckets changed)",
        report.dates_processed,
        start.elapsed().as_secs_f64() * 1000.0,
        report.buckets_changed
    );

    let mut rules = (*salon.rules).clone();
    rules.policy.gap_blocks.min_gap_minutes = 45;
    let start = Instant::now();
    let report = salon
        .engine
        .recompute_horizon(&rules, RecomputeOptions::default())
        .await
        .expect("recompute");
    println!(
        "  policy-change recompute: {} buckets changed, {} written, {} removed in {:.2}ms",
        report.buckets_changed,
        report.blocks_written,
        report.blocks_removed,
        start.elapsed().as_secs_f64() * 1000.0
    );
}

#[tokio::main]
async fn main() {
    println!("=== slotkeeper stress benchmark ===\n");

    println!("[phase 1] sequential reservations");
    phase1_sequential().await;

    println!("\n[phase 2] contended reservations");
    phase2_contention().await;

    println!("\n[phase 3] availability latency under write load");
    phase3_read_under_load().await;

    println!("\n[phase 4] horizon gap-block recompute");
    phase4_horizon_recompute().await;

    println!("\n=== benchmark complete ===");
}
