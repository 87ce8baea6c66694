use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use slotkeeper::clock::Clock;
use slotkeeper::config::parse_rules;
use slotkeeper::engine::{AvailabilityQuery, Engine, EngineError, RecomputeOptions, Rejection, ReservationRequest};
use slotkeeper::model::*;
use slotkeeper::notify::NotifyHub;

// ── Test infrastructure ──────────────────────────────────────

const RULES: &str = r#"{
    "calendar": [
        {"weekday": 0, "is_open": true, "open_time": "10:00:00", "close_time": "19:00:00", "last_booking_time": "18:00:00"},
        {"weekday": 1, "is_open": true, "open_time": "10:00:00", "close_time": "19:00:00", "last_booking_time": "18:00:00"},
        {"weekday": 2, "is_open": false, "open_time": "00:00:00", "close_time": "00:00:00", "last_booking_time": "00:00:00"}
    ],
    "policy": {
        "slot_interval_minutes": 30,
        "buffer_minutes": 10,
        "advance_booking_days": 30,
        "requires_approval": true,
        "daily_booking_limit": 3,
        "gap_blocks": {"min_gap_minutes": 60}
    }
}"#;

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn data_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("slotkeeper_int_test_{name}_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Saturday 2026-11-07, 09:00 local.
fn clock() -> Clock {
    Clock::Fixed(NaiveDate::from_ymd_opt(2026, 11, 7).unwrap().and_time(t(9, 0)))
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, 9).unwrap()
}

fn request(service: Ulid, resource: ResourceSelector, time: NaiveTime, email: &str) -> ReservationRequest {
    ReservationRequest {
        customer: CustomerRef::new(email, None),
        service_id: service,
        resource,
        date: monday(),
        time,
        notes: Some("first visit".into()),
    }
}

// ── Flow ─────────────────────────────────────────────────────

#[tokio::test]
async fn customer_books_therapist_confirms_and_completes() {
    let rules = parse_rules(RULES).unwrap();
    let dir = data_dir("flow");
    let wal = dir.join("slotkeeper.wal");
    let notify = Arc::new(NotifyHub::new());
    let engine = Engine::new(wal.clone(), notify.clone(), clock()).unwrap();

    let rin = Ulid::new();
    engine.register_resource(rin, Some("Rin".into()), true).await.unwrap();
    let head_spa = Ulid::new();
    engine
        .register_service(head_spa, Some("Head spa".into()), 50, true)
        .await
        .unwrap();
    let r = ResourceSelector::Specific(rin);
    let mut feed = notify.subscribe(r);

    // Browse.
    let query = AvailabilityQuery::new(monday(), r).with_duration(50);
    let slots = engine.get_availability(&rules, query).await.unwrap();
    assert_eq!(slots.first().map(|s| s.time), Some(t(10, 0)));
    assert_eq!(slots.last().map(|s| s.time), Some(t(18, 0)));
    assert!(slots.iter().all(|s| s.available));

    // Slots serialize for API callers.
    let json = serde_json::to_value(&slots[0]).unwrap();
    assert_eq!(json["time"], "10:00:00");
    assert_eq!(json["available"], true);

    // Book 11:00; the 10:00-11:00 idle hour becomes a gap block.
    let appt = engine
        .reserve(&rules, request(head_spa, r, t(11, 0), "yuki@example.com"))
        .await
        .unwrap();
    assert_eq!(appt.status, AppointmentStatus::Pending);
    assert!(matches!(feed.recv().await.unwrap(), Event::AppointmentBooked { .. }));
    assert!(matches!(feed.recv().await.unwrap(), Event::AutoBlocksReplaced { .. }));

    let slots = engine.get_availability(&rules, query).await.unwrap();
    let reason = |time| slots.iter().find(|s| s.time == time).and_then(|s| s.reason);
    assert_eq!(reason(t(10, 0)), Some(Rejection::BlackoutConflict));
    assert_eq!(reason(t(11, 30)), Some(Rejection::ResourceConflict));
    // 11:00 + 50 + 10 buffer = 12:00.
    assert_eq!(reason(t(12, 0)), None);

    // Someone else tries the same slot.
    let err = engine
        .reserve(&rules, request(head_spa, r, t(11, 0), "kai@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rejected(Rejection::ResourceConflict)));

    // Therapist confirms, the visit happens.
    engine
        .change_status(&rules, appt.id, AppointmentStatus::Confirmed)
        .await
        .unwrap();
    let done = engine
        .change_status(&rules, appt.id, AppointmentStatus::Completed)
        .await
        .unwrap();
    assert_eq!(done.status, AppointmentStatus::Completed);

    // A completed visit no longer holds the slot or its gap block.
    let slots = engine.get_availability(&rules, query).await.unwrap();
    assert!(slots.iter().all(|s| s.available));
    assert!(engine.gap_blocks_for(monday(), r).await.is_empty());

    // Restart from the log.
    drop(engine);
    let engine = Engine::new(wal, Arc::new(NotifyHub::new()), clock()).unwrap();
    assert_eq!(engine.appointment(appt.id).await.map(|a| a.status), Some(AppointmentStatus::Completed));
    assert_eq!(engine.appointment(appt.id).await.and_then(|a| a.notes), Some("first visit".into()));
}

#[tokio::test]
async fn closed_weekday_and_horizon() {
    let rules = parse_rules(RULES).unwrap();
    let engine = Engine::new(data_dir("closed").join("slotkeeper.wal"), Arc::new(NotifyHub::new()), clock()).unwrap();

    let wednesday = NaiveDate::from_ymd_opt(2026, 11, 11).unwrap();
    let slots = engine
        .get_availability(&rules, AvailabilityQuery::new(wednesday, ResourceSelector::Any))
        .await
        .unwrap();
    assert!(slots.is_empty());

    // Thursday has no calendar entry at all: closed.
    let thursday = NaiveDate::from_ymd_opt(2026, 11, 12).unwrap();
    let slots = engine
        .get_availability(&rules, AvailabilityQuery::new(thursday, ResourceSelector::Any))
        .await
        .unwrap();
    assert!(slots.is_empty());

    let beyond = NaiveDate::from_ymd_opt(2026, 12, 8).unwrap();
    let err = engine
        .get_availability(&rules, AvailabilityQuery::new(beyond, ResourceSelector::Any))
        .await
        .unwrap_err();
    assert_eq!(err.rejection(), Some(Rejection::AdvanceWindowExceeded));
}

#[tokio::test]
async fn horizon_dry_run_then_apply_after_policy_change() {
    let rules = parse_rules(RULES).unwrap();
    let engine = Engine::new(data_dir("policy").join("slotkeeper.wal"), Arc::new(NotifyHub::new()), clock()).unwrap();
    let service = Ulid::new();
    engine.register_service(service, None, 50, true).await.unwrap();
    engine
        .reserve(&rules, request(service, ResourceSelector::Any, t(11, 0), "yuki@example.com"))
        .await
        .unwrap();
    assert_eq!(engine.gap_blocks_for(monday(), ResourceSelector::Any).await.len(), 1);

    let narrower = parse_rules(&RULES.replace("\"min_gap_minutes\": 60", "\"min_gap_minutes\": 30")).unwrap();
    let preview = engine
        .recompute_horizon(
            &narrower,
            RecomputeOptions {
                dry_run: true,
                ..RecomputeOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(preview.blocks_removed, 1);
    assert_eq!(engine.gap_blocks_for(monday(), ResourceSelector::Any).await.len(), 1);

    let applied = engine
        .recompute_horizon(&narrower, RecomputeOptions::default())
        .await
        .unwrap();
    assert_eq!(applied.blocks_removed, 1);
    assert_eq!(applied.dates_processed, 31);
    assert!(engine.gap_blocks_for(monday(), ResourceSelector::Any).await.is_empty());
}
