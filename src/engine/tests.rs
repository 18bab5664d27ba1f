use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use super::*;
use crate::grid::{self, OfficeHours};
use crate::limits::*;
use crate::model::*;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("clinicslot_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn open(path: &PathBuf) -> (Arc<Store>, Scheduler, AvailabilityCalculator) {
    let store = Arc::new(Store::open(path.clone()).unwrap());
    let hours = OfficeHours::default();
    let scheduler = Scheduler::new(store.clone(), hours);
    let calculator = AvailabilityCalculator::new(store.clone(), hours);
    (store, scheduler, calculator)
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn starts(slots: &[Span]) -> Vec<Instant> {
    slots.iter().map(|s| s.start).collect()
}

// ── Walkthrough ──────────────────────────────────────────

#[tokio::test]
async fn wednesday_walkthrough() {
    let path = test_wal_path("walkthrough.wal");
    let (_store, scheduler, calculator) = open(&path);
    let day = date("2025-08-20");

    assert_eq!(calculator.free_slots(day).await.unwrap().len(), 16);

    let a1 = scheduler.book("+15550001", at("2025-08-20T10:00"), None).await.unwrap();
    assert_eq!(a1.span, Span::new(at("2025-08-20T10:00"), at("2025-08-20T10:30")));
    let free = calculator.free_slots(day).await.unwrap();
    assert_eq!(free.len(), 15);
    assert!(!starts(&free).contains(&at("2025-08-20T10:00")));

    let err = scheduler.book("+15550002", at("2025-08-20T10:00"), None).await.unwrap_err();
    assert!(matches!(err, SchedulerError::SlotTaken(id) if id == a1.id));

    let err = scheduler.book("+15550002", at("2025-08-20T10:15"), None).await.unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTime(_)));

    let err = scheduler.book("+15550002", at("2025-08-20T17:00"), None).await.unwrap_err();
    assert!(matches!(err, SchedulerError::OutOfHours(_)));
    let err = scheduler.book("+15550002", at("2025-08-20T08:30"), None).await.unwrap_err();
    assert!(matches!(err, SchedulerError::OutOfHours(_)));

    let b = scheduler
        .block(at("2025-08-20T13:00"), at("2025-08-20T14:00"), Some("lunch".into()))
        .await
        .unwrap();
    let free = calculator.free_slots(day).await.unwrap();
    assert_eq!(free.len(), 13);
    let err = scheduler.book("+15550002", at("2025-08-20T13:30"), None).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Blocked(id) if id == b.id));

    let err = scheduler
        .block(at("2025-08-20T09:30"), at("2025-08-20T10:30"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::ConflictsWithAppointment(id) if id == a1.id));
    assert!(err.is_conflict());

    let moved = scheduler.reschedule(a1.id, at("2025-08-20T15:00")).await.unwrap();
    assert_eq!(moved.span.start, at("2025-08-20T15:00"));
    let free = starts(&calculator.free_slots(day).await.unwrap());
    assert!(free.contains(&at("2025-08-20T10:00")));
    assert!(!free.contains(&at("2025-08-20T15:00")));

    scheduler.cancel(a1.id).await.unwrap();
    scheduler.remove_exception(b.id).await.unwrap();
    assert_eq!(calculator.free_slots(day).await.unwrap().len(), 16);
}

#[tokio::test]
async fn last_slot_of_day_is_bookable() {
    let path = test_wal_path("last_slot.wal");
    let (_store, scheduler, _) = open(&path);
    let a = scheduler.book("+15550001", at("2025-08-20T16:30"), None).await.unwrap();
    assert_eq!(a.span.end, at("2025-08-20T17:00"));
    let a = scheduler.book("+15550001", at("2025-08-20T09:00"), None).await.unwrap();
    assert_eq!(a.span.start, at("2025-08-20T09:00"));
}

// ── Rejections leave no trace ────────────────────────────

#[tokio::test]
async fn rejected_mutations_have_no_side_effects() {
    let path = test_wal_path("no_side_effects.wal");
    let (store, scheduler, _) = open(&path);
    let a = scheduler.book("+15550001", at("2025-08-20T10:00"), None).await.unwrap();
    scheduler
        .block(at("2025-08-20T12:00"), at("2025-08-20T13:00"), None)
        .await
        .unwrap();
    let before = store.read().await.unwrap().snapshot_events();
    let appends = store.wal_appends_since_compact().await;

    let attempts = [
        scheduler.book("+15550009", at("2025-08-20T10:00"), None).await.err(),
        scheduler.book("+15550009", at("2025-08-20T12:30"), None).await.err(),
        scheduler.book("+15550009", at("2025-08-20T18:00"), None).await.err(),
        scheduler.reschedule(a.id, at("2025-08-20T12:00")).await.err(),
        scheduler.reschedule(999, at("2025-08-20T15:00")).await.err(),
        scheduler.cancel(999).await.err(),
        scheduler.remove_exception(999).await.err(),
        scheduler.block(at("2025-08-20T10:00"), at("2025-08-20T11:00"), None).await.err(),
        scheduler.block(at("2025-08-20T12:30"), at("2025-08-20T14:00"), None).await.err(),
        scheduler.block(at("2025-08-20T14:00"), at("2025-08-20T14:00"), None).await.err(),
    ];
    assert!(attempts.iter().all(Option::is_some));

    // Unknown phone on a rejected booking never registers a patient.
    assert!(matches!(
        scheduler.get_patient("+15550009").await,
        Err(SchedulerError::NotFound(Missing::Patient(_)))
    ));
    assert_eq!(store.read().await.unwrap().snapshot_events(), before);
    assert_eq!(store.wal_appends_since_compact().await, appends);
}

#[tokio::test]
async fn block_validation_order() {
    let path = test_wal_path("block_validation.wal");
    let (_store, scheduler, _) = open(&path);

    let err = scheduler
        .block(at("2025-08-20T14:00"), at("2025-08-20T13:00"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidRange { .. }));
    let err = scheduler
        .block(at("2025-08-20T13:00"), at("2025-08-20T13:45"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTime(_)));

    // Blocks may lie outside office hours and span days.
    scheduler
        .block(at("2025-08-20T20:00"), at("2025-08-22T08:00"), None)
        .await
        .unwrap();
    let err = scheduler
        .block(at("2025-08-21T07:00"), at("2025-08-21T07:30"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::ConflictsWithException(_)));
    let err = scheduler.book("+15550001", at("2025-08-21T10:00"), None).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Blocked(_)));
}

#[tokio::test]
async fn input_limits_enforced() {
    let path = test_wal_path("input_limits.wal");
    let (_store, scheduler, _) = open(&path);

    let long_phone = "1".repeat(MAX_PHONE_LEN + 1);
    let err = scheduler.book(&long_phone, at("2025-08-20T10:00"), None).await.unwrap_err();
    assert!(matches!(err, SchedulerError::LimitExceeded(_)));

    let err = scheduler
        .book("+15550001", at("2025-08-20T10:00"), Some("x".repeat(MAX_NOTE_LEN + 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::LimitExceeded(_)));

    let err = scheduler
        .upsert_patient("+15550001", &"n".repeat(MAX_NAME_LEN + 1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::LimitExceeded(_)));

    let err = scheduler.upsert_patient("  ", "Nobody", None).await.unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidInput(_)));
}

// ── Patients ─────────────────────────────────────────────

#[tokio::test]
async fn booking_never_overwrites_existing_patient() {
    let path = test_wal_path("patient_preserved.wal");
    let (_store, scheduler, _) = open(&path);

    let p = scheduler
        .upsert_patient("+15550001", "Alice Smith", Some("allergic to latex"))
        .await
        .unwrap();
    let a = scheduler.book("+15550001", at("2025-08-20T10:00"), None).await.unwrap();
    assert_eq!(a.patient_id, p.id);

    let after = scheduler.get_patient("+15550001").await.unwrap();
    assert_eq!(after.name, "Alice Smith");
    assert_eq!(after.notes, "allergic to latex");
}

#[tokio::test]
async fn booking_registers_unknown_phone() {
    let path = test_wal_path("patient_implicit.wal");
    let (_store, scheduler, _) = open(&path);

    let a = scheduler.book(" +15550002 ", at("2025-08-20T10:00"), None).await.unwrap();
    let p = scheduler.get_patient("+15550002").await.unwrap();
    assert_eq!(p.id, a.patient_id);
    assert_eq!(p.name, "+15550002");
    assert!(p.notes.is_empty());

    // Explicit upsert overwrites and keeps the id.
    let renamed = scheduler.upsert_patient("+15550002", "Bob", None).await.unwrap();
    assert_eq!(renamed.id, p.id);
    assert_eq!(scheduler.get_patient("+15550002").await.unwrap().name, "Bob");
}

#[tokio::test]
async fn appointments_for_phone_ordered() {
    let path = test_wal_path("patient_appointments.wal");
    let (_store, scheduler, _) = open(&path);

    let late = scheduler.book("+15550001", at("2025-08-21T09:00"), None).await.unwrap();
    scheduler.book("+15550002", at("2025-08-20T09:00"), None).await.unwrap();
    let early = scheduler.book("+15550001", at("2025-08-20T14:00"), None).await.unwrap();

    let mine = scheduler.appointments_for_phone("+15550001").await.unwrap();
    assert_eq!(mine.iter().map(|a| a.id).collect::<Vec<_>>(), vec![early.id, late.id]);
    assert_eq!(scheduler.list_by_patient(late.patient_id).await.unwrap(), mine);
    assert!(scheduler.appointments_for_phone("+19999999").await.unwrap().is_empty());
}

// ── Reschedule ───────────────────────────────────────────

#[tokio::test]
async fn reschedule_onto_own_slot_succeeds() {
    let path = test_wal_path("reschedule_self.wal");
    let (_store, scheduler, _) = open(&path);
    let a = scheduler.book("+15550001", at("2025-08-20T10:00"), None).await.unwrap();
    let same = scheduler.reschedule(a.id, at("2025-08-20T10:00")).await.unwrap();
    assert_eq!(same.span, a.span);
}

#[tokio::test]
async fn reschedule_round_trip_restores_state() {
    let path = test_wal_path("reschedule_round_trip.wal");
    let (store, scheduler, calculator) = open(&path);
    let a = scheduler.book("+15550001", at("2025-08-20T10:00"), None).await.unwrap();
    let before = store.read().await.unwrap().snapshot_events();
    let free_before = calculator.free_slots(date("2025-08-20")).await.unwrap();

    scheduler.reschedule(a.id, at("2025-08-21T11:30")).await.unwrap();
    scheduler.reschedule(a.id, at("2025-08-20T10:00")).await.unwrap();

    assert_eq!(store.read().await.unwrap().snapshot_events(), before);
    assert_eq!(calculator.free_slots(date("2025-08-20")).await.unwrap(), free_before);
}

#[tokio::test]
async fn reschedule_collision_keeps_old_slot() {
    let path = test_wal_path("reschedule_collision.wal");
    let (_store, scheduler, _) = open(&path);
    let a = scheduler.book("+15550001", at("2025-08-20T10:00"), None).await.unwrap();
    let b = scheduler.book("+15550002", at("2025-08-20T11:00"), None).await.unwrap();

    let err = scheduler.reschedule(a.id, at("2025-08-20T11:00")).await.unwrap_err();
    assert!(matches!(err, SchedulerError::SlotTaken(id) if id == b.id));
    assert_eq!(scheduler.get_appointment(a.id).await.unwrap().span, a.span);
}

#[tokio::test]
async fn cancel_twice_is_not_found() {
    let path = test_wal_path("cancel_twice.wal");
    let (_store, scheduler, _) = open(&path);
    let a = scheduler.book("+15550001", at("2025-08-20T10:00"), None).await.unwrap();
    assert_eq!(scheduler.cancel(a.id).await.unwrap(), a);
    assert!(matches!(
        scheduler.cancel(a.id).await,
        Err(SchedulerError::NotFound(Missing::Appointment(_)))
    ));
}

// ── Availability ─────────────────────────────────────────

#[tokio::test]
async fn free_slots_agree_with_book() {
    let path = test_wal_path("free_slots_agree.wal");
    let (_store, scheduler, calculator) = open(&path);
    scheduler.book("+15550001", at("2025-08-20T09:30"), None).await.unwrap();
    scheduler
        .block(at("2025-08-20T11:00"), at("2025-08-20T12:30"), None)
        .await
        .unwrap();

    let day = date("2025-08-20");
    let free = calculator.free_slots(day).await.unwrap();
    for slot in grid::grid_slots(day, &OfficeHours::default()) {
        let listed = free.contains(&slot);
        let booked = scheduler.book("+15550002", slot.start, None).await;
        assert_eq!(listed, booked.is_ok(), "slot {} disagrees", slot.start);
        if let Ok(a) = booked {
            scheduler.cancel(a.id).await.unwrap();
        }
    }
}

#[tokio::test]
async fn free_slots_by_weekday() {
    let path = test_wal_path("free_slots_weekday.wal");
    let (_store, scheduler, calculator) = open(&path);
    scheduler.book("+15550001", at("2025-08-22T09:00"), None).await.unwrap();

    let (resolved, slots) = calculator
        .free_slots_on("Friday", Some(date("2025-08-20")))
        .await
        .unwrap();
    assert_eq!(resolved, date("2025-08-22"));
    assert_eq!(slots.len(), 15);

    let (resolved, _) = calculator.free_slots_on("wed", Some(date("2025-08-20"))).await.unwrap();
    assert_eq!(resolved, date("2025-08-20"));

    let err = calculator.free_slots_on("someday", None).await.unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidInput(_)));
}

#[tokio::test]
async fn exceptions_on_day() {
    let path = test_wal_path("exceptions_on_day.wal");
    let (_store, scheduler, _) = open(&path);
    let week = scheduler
        .block(at("2025-08-18T00:00"), at("2025-08-21T00:00"), Some("vacation".into()))
        .await
        .unwrap();
    let late = scheduler
        .block(at("2025-08-21T16:00"), at("2025-08-21T17:00"), None)
        .await
        .unwrap();

    let on_20 = scheduler.exceptions_on(date("2025-08-20")).await.unwrap();
    assert_eq!(on_20, vec![week.clone()]);
    let on_21 = scheduler.exceptions_on(date("2025-08-21")).await.unwrap();
    assert_eq!(on_21, vec![late]);

    let too_wide = Span::new(at("2025-01-01T00:00"), at("2026-06-01T00:00"));
    assert!(matches!(
        scheduler.list_exceptions(too_wide).await,
        Err(SchedulerError::LimitExceeded(_))
    ));
}

#[tokio::test]
async fn health_reports_office_hours() {
    let path = test_wal_path("health.wal");
    let store = Arc::new(Store::open(path).unwrap());
    let scheduler = Scheduler::new(store, OfficeHours::parse("08:00", "12:30").unwrap());
    let health = scheduler.health();
    assert!(health.ok);
    assert_eq!(health.office_open.to_string(), "08:00:00");
    assert_eq!(health.office_close.to_string(), "12:30:00");
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn wal_replay_restores_everything() {
    let path = test_wal_path("replay.wal");
    let (a, b, snapshot) = {
        let (store, scheduler, _) = open(&path);
        scheduler.upsert_patient("+15550001", "Alice", Some("new")).await.unwrap();
        let a = scheduler.book("+15550001", at("2025-08-20T10:00"), Some("checkup".into())).await.unwrap();
        scheduler.book("+15550002", at("2025-08-20T11:00"), None).await.unwrap();
        scheduler.reschedule(a.id, at("2025-08-20T15:30")).await.unwrap();
        let b = scheduler
            .block(at("2025-08-20T13:00"), at("2025-08-20T14:00"), None)
            .await
            .unwrap();
        let snapshot = store.read().await.unwrap().snapshot_events();
        (a, b, snapshot)
    };

    let (store, scheduler, _) = open(&path);
    assert_eq!(store.read().await.unwrap().snapshot_events(), snapshot);
    let restored = scheduler.get_appointment(a.id).await.unwrap();
    assert_eq!(restored.span.start, at("2025-08-20T15:30"));
    assert_eq!(restored.note.as_deref(), Some("checkup"));
    assert_eq!(scheduler.exceptions_on(date("2025-08-20")).await.unwrap()[0].id, b.id);
    assert_eq!(scheduler.get_patient("+15550001").await.unwrap().name, "Alice");
}

#[tokio::test]
async fn compaction_preserves_state_and_ids() {
    let path = test_wal_path("compaction.wal");
    let last_id = {
        let (store, scheduler, _) = open(&path);
        let mut last = 0;
        for _ in 0..10 {
            let a = scheduler.book("+15550001", at("2025-08-20T10:00"), None).await.unwrap();
            scheduler.cancel(a.id).await.unwrap();
            last = a.id;
        }
        scheduler.book("+15550001", at("2025-08-20T12:00"), None).await.unwrap();
        let size_before = std::fs::metadata(&path).unwrap().len();
        let snapshot = store.read().await.unwrap().snapshot_events();

        store.compact_wal().await.unwrap();
        assert_eq!(store.wal_appends_since_compact().await, 0);
        assert!(std::fs::metadata(&path).unwrap().len() < size_before);
        assert_eq!(store.read().await.unwrap().snapshot_events(), snapshot);
        last + 1
    };

    let (_store, scheduler, calculator) = open(&path);
    assert_eq!(calculator.free_slots(date("2025-08-20")).await.unwrap().len(), 15);
    let next = scheduler.book("+15550003", at("2025-08-20T14:00"), None).await.unwrap();
    assert!(next.id > last_id, "id {} reused after compaction", next.id);
}

#[tokio::test]
async fn new_patient_booking_is_one_flush() {
    let path = test_wal_path("one_flush.wal");
    let (store, scheduler, _) = open(&path);
    scheduler.book("+15550001", at("2025-08-20T10:00"), None).await.unwrap();
    // Patient row plus appointment row.
    assert_eq!(store.wal_appends_since_compact().await, 2);
    scheduler.book("+15550001", at("2025-08-20T11:00"), None).await.unwrap();
    assert_eq!(store.wal_appends_since_compact().await, 3);
}

// ── Concurrency ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_of_one_slot() {
    let path = test_wal_path("concurrent_same_slot.wal");
    let (store, scheduler, _) = open(&path);
    let scheduler = Arc::new(scheduler);

    let mut handles = Vec::new();
    for i in 0..16 {
        let s = scheduler.clone();
        handles.push(tokio::spawn(async move {
            s.book(&format!("+1555{i:04}"), at("2025-08-20T10:00"), None).await
        }));
    }
    let mut ok = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => assert!(matches!(e, SchedulerError::SlotTaken(_)), "unexpected {e}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(store.read().await.unwrap().appointments.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_book_and_block_never_overlap() {
    let path = test_wal_path("concurrent_book_block.wal");
    let (store, scheduler, _) = open(&path);
    let scheduler = Arc::new(scheduler);

    let mut handles = Vec::new();
    for i in 0..8 {
        let s = scheduler.clone();
        handles.push(tokio::spawn(async move {
            let start = at("2025-08-20T09:00") + chrono::Duration::minutes(30 * i);
            let _ = s.book("+15550001", start, None).await;
        }));
        let s = scheduler.clone();
        handles.push(tokio::spawn(async move {
            let start = at("2025-08-20T09:00") + chrono::Duration::minutes(60 * i);
            let _ = s.block(start, start + chrono::Duration::hours(1), None).await;
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let ledgers = store.read().await.unwrap();
    let appts: Vec<_> = ledgers.appointments.iter().collect();
    let blocks: Vec<_> = ledgers.exceptions.iter().collect();
    for (i, a) in appts.iter().enumerate() {
        assert!(appts[i + 1..].iter().all(|b| !a.span.overlaps(&b.span)));
        assert!(blocks.iter().all(|e| !a.span.overlaps(&e.span)));
    }
    for (i, e) in blocks.iter().enumerate() {
        assert!(blocks[i + 1..].iter().all(|f| !e.span.overlaps(&f.span)));
    }
}

#[tokio::test]
async fn lock_timeout_fails_without_mutation() {
    let path = test_wal_path("lock_timeout.wal");
    let store = Arc::new(
        Store::open(path)
            .unwrap()
            .with_lock_timeout(Duration::from_millis(50)),
    );
    let scheduler = Scheduler::new(store.clone(), OfficeHours::default());

    let held = store.write().await.unwrap();
    let err = scheduler.book("+15550001", at("2025-08-20T10:00"), None).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Timeout(_)));
    assert_eq!(err.code(), "55P03");
    drop(held);

    assert!(store.read().await.unwrap().appointments.is_empty());
    scheduler.book("+15550001", at("2025-08-20T10:00"), None).await.unwrap();
}

/// Counts `clinicslot_scheduling_rejections_total{kind="timeout"}` increments.
struct TimeoutRejections(Arc<std::sync::atomic::AtomicU64>);

impl metrics::Recorder for TimeoutRejections {
    fn describe_counter(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}
    fn describe_gauge(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}
    fn describe_histogram(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}

    fn register_counter(&self, key: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Counter {
        let timeout = key.labels().any(|l| l.key() == "kind" && l.value() == "timeout");
        if key.name() == crate::observability::SCHEDULING_REJECTIONS_TOTAL && timeout {
            metrics::Counter::from_arc(self.0.clone())
        } else {
            metrics::Counter::noop()
        }
    }

    fn register_gauge(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Gauge {
        metrics::Gauge::noop()
    }

    fn register_histogram(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Histogram {
        metrics::Histogram::noop()
    }
}

#[test]
fn lock_timeouts_counted_as_rejections() {
    use std::sync::atomic::{AtomicU64, Ordering};

    let count = Arc::new(AtomicU64::new(0));
    let recorder = TimeoutRejections(count.clone());
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

    metrics::with_local_recorder(&recorder, || {
        rt.block_on(async {
            let path = test_wal_path("timeout_metric.wal");
            let store = Arc::new(
                Store::open(path)
                    .unwrap()
                    .with_lock_timeout(Duration::from_millis(20)),
            );
            let scheduler = Scheduler::new(store.clone(), OfficeHours::default());

            let held = store.write().await.unwrap();
            let err = scheduler.cancel(1).await.unwrap_err();
            assert!(matches!(err, SchedulerError::Timeout(_)));
            let err = scheduler
                .block(at("2025-08-20T13:00"), at("2025-08-20T14:00"), None)
                .await
                .unwrap_err();
            assert!(matches!(err, SchedulerError::Timeout(_)));
            drop(held);
        })
    });

    assert_eq!(count.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn extreme_dates_are_errors_not_panics() {
    let path = test_wal_path("extreme_dates.wal");
    let (_store, scheduler, _calculator) = open(&path);

    let last = grid::parse_instant("+262142-12-31T23:30").unwrap();
    let err = scheduler.book("+15550001", last, None).await.unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTime(_)));

    let err = scheduler.exceptions_on(last.date()).await.unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTime(_)));

    let first = grid::parse_date("2025-08-20").unwrap();
    assert!(scheduler.exceptions_on(first).await.unwrap().is_empty());
}
