use std::sync::Arc;
use std::time::Duration as PollDuration;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use dayline::models::day::{day_start, local_day};
use dayline::models::BiometricKind;
use dayline::{
    Category, CategorySource, Coordinate, EngineConfig, PipelineRunner, RawBiometricSample,
    RawLocationFix, TimeSlot, TimelineEngine, TrackOutcome,
};

const OFFICE: Coordinate = Coordinate {
    latitude: 40.7128,
    longitude: -74.0060,
};

async fn new_engine(dir: &TempDir) -> TimelineEngine {
    let _ = env_logger::Builder::from_default_env().is_test(true).try_init();
    TimelineEngine::new(EngineConfig::default(), dir.path())
        .await
        .unwrap()
}

fn today() -> NaiveDate {
    local_day(Utc::now(), 0)
}

fn fix(at: DateTime<Utc>, coordinate: Coordinate) -> RawLocationFix {
    RawLocationFix {
        latitude: coordinate.latitude,
        longitude: coordinate.longitude,
        accuracy_m: 10.0,
        timestamp: at,
    }
}

fn distance(at: DateTime<Utc>, meters: f64) -> RawBiometricSample {
    RawBiometricSample {
        kind: BiometricKind::DistanceWalkingRunning,
        value: meters,
        timestamp: at,
    }
}

fn assert_contiguous(slots: &[TimeSlot], day: NaiveDate) {
    assert_eq!(slots.first().unwrap().start_time, day_start(day, 0));
    for pair in slots.windows(2) {
        assert_eq!(pair[1].start_time, pair[0].end_time.unwrap());
    }
}

#[tokio::test]
async fn out_of_order_fixes_build_a_contiguous_day() {
    let dir = TempDir::new().unwrap();
    let engine = new_engine(&dir).await;
    let day = today();
    let t0 = day_start(day, 0) + Duration::hours(10);

    let handle = engine.register_source("phone-gps").await;
    // Shuffled on purpose, with one exact duplicate.
    for minutes in [25i64, 0, 90, 5, 5, 30] {
        handle
            .push_location(fix(t0 + Duration::minutes(minutes), OFFICE))
            .await
            .unwrap();
    }

    let summary = engine.run_pipeline().await.unwrap();
    assert_eq!(summary.merged_events, 5);
    assert_eq!(summary.deduped, 1);
    assert_eq!(summary.dropped_late, 0);
    assert_eq!(summary.fixes_applied, 5);
    assert_eq!(summary.days_persisted, 1);

    let slots = engine.slots_for_day(day).await.unwrap();
    assert_contiguous(&slots, day);
    assert_eq!(slots.len(), 4);
    // Midnight filler, then the 20-minute gap turned the first slot into a
    // commute, an hour of silence became a filler, and the newest fix left
    // an open slot.
    assert_eq!(slots[0].category, Category::Unknown);
    assert_eq!(slots[1].category, Category::Commute);
    assert_eq!(slots[1].start_time, t0 + Duration::minutes(5));
    assert_eq!(slots[2].category, Category::Unknown);
    assert!(slots[3].is_open());
    assert_eq!(slots[3].start_time, t0 + Duration::minutes(90));
}

#[tokio::test]
async fn pipeline_results_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let day = today();
    let t0 = day_start(day, 0) + Duration::hours(10);

    let before = {
        let engine = new_engine(&dir).await;
        engine.handle_fix(t0, OFFICE).await.unwrap();
        engine
            .handle_fix(t0 + Duration::minutes(5), OFFICE)
            .await
            .unwrap();
        engine.slots_for_day(day).await.unwrap()
    };
    assert_eq!(before.len(), 2);

    let engine = new_engine(&dir).await;
    assert_eq!(engine.slots_for_day(day).await.unwrap(), before);

    // The restored cursor makes the next fix a continuation, not a restart.
    let resolution = engine
        .handle_fix(t0 + Duration::minutes(12), OFFICE)
        .await
        .unwrap();
    assert_eq!(resolution.outcome, TrackOutcome::Extended);
}

#[tokio::test]
async fn confirmations_teach_the_guess_engine() {
    let dir = TempDir::new().unwrap();
    let engine = new_engine(&dir).await;
    let day = today();
    let t0 = day_start(day, 0) + Duration::hours(10);

    engine.handle_fix(t0, OFFICE).await.unwrap();
    engine
        .handle_fix(t0 + Duration::minutes(5), OFFICE)
        .await
        .unwrap();

    let slots = engine.slots_for_day(day).await.unwrap();
    let first = slots.last().unwrap().clone();
    engine
        .confirm_category(day, &first.id, Category::Work, t0 + Duration::minutes(6))
        .await
        .unwrap();

    // One confirmation is below the confidence threshold.
    engine
        .handle_fix(t0 + Duration::minutes(50), OFFICE)
        .await
        .unwrap();
    let slots = engine.slots_for_day(day).await.unwrap();
    let second = slots.last().unwrap().clone();
    assert_eq!(second.category, Category::Unknown);

    engine
        .confirm_category(day, &second.id, Category::Work, t0 + Duration::minutes(55))
        .await
        .unwrap();

    // The second confirmation at the same cell makes the guess trusted.
    let mut changes = engine.subscribe();
    engine
        .handle_fix(t0 + Duration::minutes(95), OFFICE)
        .await
        .unwrap();
    let slots = engine.slots_for_day(day).await.unwrap();
    let third = slots.last().unwrap();
    assert!(third.is_open());
    assert_eq!(third.category, Category::Work);
    assert_eq!(third.source, CategorySource::SmartGuess);

    // Guessed slots are announced so the host can prompt for confirmation.
    let change = changes.try_recv().unwrap();
    assert_eq!(change.slot_id, third.id);
    assert_eq!(change.category, Category::Work);
    assert_eq!(change.source, CategorySource::SmartGuess);
}

#[tokio::test]
async fn sustained_motion_marks_silent_stretches_as_commute() {
    let dir = TempDir::new().unwrap();
    let engine = new_engine(&dir).await;
    let day = today();
    let t0 = day_start(day, 0) + Duration::hours(9);

    let phone = engine.register_source("phone-gps").await;
    for minutes in [0i64, 10, 55] {
        phone
            .push_location(fix(t0 + Duration::minutes(minutes), OFFICE))
            .await
            .unwrap();
    }

    // A brisk walk at 1.5 m/s spanning the whole silent stretch.
    let watch = engine.register_source("watch-health").await;
    for step in 2..=11i64 {
        watch
            .push_biometric(distance(t0 + Duration::minutes(step * 5), 450.0))
            .await
            .unwrap();
    }

    let summary = engine.run_pipeline().await.unwrap();
    assert_eq!(summary.merged_events, 13);
    assert_eq!(summary.motion_marked, 1);

    let slots = engine.slots_for_day(day).await.unwrap();
    assert_contiguous(&slots, day);
    assert_eq!(slots.len(), 3);
    assert_eq!(slots[1].category, Category::Commute);
    assert_eq!(slots[1].start_time, t0 + Duration::minutes(10));
    assert_eq!(slots[1].end_time, Some(t0 + Duration::minutes(55)));
    assert!(slots[2].is_open());
}

#[tokio::test]
async fn late_events_are_dropped_after_their_day_is_persisted() {
    let dir = TempDir::new().unwrap();
    let engine = new_engine(&dir).await;
    let day = today();
    let t0 = day_start(day, 0) + Duration::hours(10);

    let handle = engine.register_source("phone-gps").await;
    for minutes in [0i64, 5, 30, 90] {
        handle
            .push_location(fix(t0 + Duration::minutes(minutes), OFFICE))
            .await
            .unwrap();
    }
    engine.run_pipeline().await.unwrap();
    let persisted = engine.slots_for_day(day).await.unwrap();

    // An hour-old straggler is beyond the skew tolerance; a fresh fix that
    // merely extends the open slot changes nothing on disk.
    handle.push_location(fix(t0, OFFICE)).await.unwrap();
    handle
        .push_location(fix(t0 + Duration::minutes(95), OFFICE))
        .await
        .unwrap();
    let summary = engine.run_pipeline().await.unwrap();

    assert_eq!(summary.dropped_late, 1);
    assert_eq!(summary.merged_events, 1);
    assert_eq!(summary.fixes_applied, 1);
    assert_eq!(summary.days_persisted, 0);
    assert_eq!(engine.slots_for_day(day).await.unwrap(), persisted);
}

#[tokio::test]
async fn cold_days_are_read_from_storage() {
    let dir = TempDir::new().unwrap();
    let old_day = today() - Duration::days(40);
    let t0 = day_start(old_day, 0) + Duration::hours(10);

    let before = {
        let engine = new_engine(&dir).await;
        engine.handle_fix(t0, OFFICE).await.unwrap();
        engine
            .handle_fix(t0 + Duration::minutes(5), OFFICE)
            .await
            .unwrap();
        engine.slots_for_day(old_day).await.unwrap()
    };
    assert_eq!(before.len(), 2);

    // Outside the hydration window the day is not in memory, so this read
    // goes straight to SQLite.
    let engine = new_engine(&dir).await;
    assert_eq!(engine.slots_for_day(old_day).await.unwrap(), before);
}

#[tokio::test]
async fn confirming_broadcasts_the_category_change() {
    let dir = TempDir::new().unwrap();
    let engine = new_engine(&dir).await;
    let day = today();
    let t0 = day_start(day, 0) + Duration::hours(10);

    engine.handle_fix(t0, OFFICE).await.unwrap();
    engine
        .handle_fix(t0 + Duration::minutes(5), OFFICE)
        .await
        .unwrap();
    let open = engine
        .slots_for_day(day)
        .await
        .unwrap()
        .last()
        .unwrap()
        .clone();

    let mut changes = engine.subscribe();
    engine
        .confirm_category(day, &open.id, Category::Work, t0 + Duration::minutes(6))
        .await
        .unwrap();

    let change = changes.try_recv().unwrap();
    assert_eq!(change.day, day);
    assert_eq!(change.slot_id, open.id);
    assert_eq!(change.category, Category::Work);
    assert_eq!(change.source, CategorySource::UserConfirmed);
}

#[tokio::test]
async fn the_runner_processes_queued_events_until_stopped() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(new_engine(&dir).await);
    let day = today();
    let t0 = day_start(day, 0) + Duration::hours(10);

    let handle = engine.register_source("phone-gps").await;
    handle.push_location(fix(t0, OFFICE)).await.unwrap();
    handle
        .push_location(fix(t0 + Duration::minutes(5), OFFICE))
        .await
        .unwrap();

    let mut runner = PipelineRunner::new();
    runner
        .start(Arc::clone(&engine), PollDuration::from_millis(20))
        .unwrap();
    assert!(runner
        .start(Arc::clone(&engine), PollDuration::from_millis(20))
        .is_err());

    let mut slots = Vec::new();
    for _ in 0..100 {
        slots = engine.slots_for_day(day).await.unwrap();
        if !slots.is_empty() {
            break;
        }
        tokio::time::sleep(PollDuration::from_millis(20)).await;
    }
    runner.stop().await.unwrap();

    assert_eq!(slots.len(), 2);
    assert!(slots[1].is_open());
}

#[tokio::test]
async fn purging_unused_guesses_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let engine = new_engine(&dir).await;
    let day = today();
    let t0 = day_start(day, 0) + Duration::hours(10);

    engine.handle_fix(t0, OFFICE).await.unwrap();
    engine
        .handle_fix(t0 + Duration::minutes(5), OFFICE)
        .await
        .unwrap();
    let open = engine
        .slots_for_day(day)
        .await
        .unwrap()
        .last()
        .unwrap()
        .clone();
    engine
        .confirm_category(day, &open.id, Category::Work, t0 + Duration::minutes(6))
        .await
        .unwrap();

    let cutoff = t0 + Duration::days(1);
    assert_eq!(
        engine.purge_smart_guesses(cutoff, cutoff).await.unwrap(),
        1
    );
    assert_eq!(
        engine.purge_smart_guesses(cutoff, cutoff).await.unwrap(),
        0
    );
}
