//! Integration tests for the tracker engine using mock dependencies.
//!
//! These tests drive the public API with MockClock and MemoryStore so day
//! boundaries and imports are deterministic.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use vape_tracker::{
    DayRecord, MemoryStore, MockClock, PersistentStore, RangeSummary, Snapshot, Tracker,
    TrackerError, intervals_minutes,
    store::{StoredSettings, StoredState},
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, min, 0).unwrap()
}

/// Helper to create a tracker on an empty store with a shared mock clock.
fn create_tracker(now: NaiveDateTime) -> (Tracker<MemoryStore, MockClock>, MockClock) {
    let clock = MockClock::new(now);
    (Tracker::new(MemoryStore::new(), clock.clone()), clock)
}

// ==================== Count Consistency Tests ====================

#[test]
fn test_count_matches_events_after_mixed_operations() {
    let (tracker, clock) = create_tracker(at(2024, 6, 15, 8, 0));

    for _ in 0..4 {
        tracker.log_event().unwrap();
        clock.advance(Duration::minutes(20));
    }
    tracker.remove_last_event().unwrap();
    tracker.log_event().unwrap();

    let events = tracker.list_today().unwrap();
    assert_eq!(tracker.today_count().unwrap() as usize, events.len());

    let today = tracker
        .history_all()
        .unwrap()
        .into_iter()
        .find(|record| record.date == date(2024, 6, 15));
    assert_eq!(today.map(|r| r.count), Some(4));
}

#[test]
fn test_log_then_undo_restores_previous_state() {
    let (tracker, clock) = create_tracker(at(2024, 6, 15, 8, 0));
    let first = tracker.log_event().unwrap();
    clock.advance(Duration::minutes(30));

    let before_events = tracker.list_today().unwrap();
    let before_history = tracker.history_all().unwrap();

    tracker.log_event().unwrap();
    let last = tracker.remove_last_event().unwrap();

    assert_eq!(tracker.list_today().unwrap(), before_events);
    assert_eq!(tracker.history_all().unwrap(), before_history);
    assert_eq!(last, Some(first));
}

#[test]
fn test_undo_on_empty_day_is_noop() {
    let (tracker, _) = create_tracker(at(2024, 6, 15, 8, 0));

    let last = tracker.remove_last_event().unwrap();

    assert_eq!(last, None);
    assert_eq!(tracker.today_count().unwrap(), 0);
    assert!(tracker.history_all().unwrap().is_empty());
}

#[test]
fn test_undo_last_event_keeps_last_event_time() {
    let (tracker, _) = create_tracker(at(2024, 6, 15, 8, 0));
    let event = tracker.log_event().unwrap();

    tracker.remove_last_event().unwrap();

    assert_eq!(tracker.today_count().unwrap(), 0);
    assert_eq!(tracker.last_event_time().unwrap(), Some(event));
    assert!(tracker.history_all().unwrap().is_empty());
}

#[test]
fn test_remove_specific_event() {
    let (tracker, clock) = create_tracker(at(2024, 6, 15, 8, 0));
    let first = tracker.log_event().unwrap();
    clock.advance(Duration::minutes(45));
    let second = tracker.log_event().unwrap();

    assert!(tracker.remove_event(first).unwrap());
    assert!(!tracker.remove_event(first).unwrap());

    assert_eq!(tracker.list_today().unwrap(), vec![second]);
    assert_eq!(tracker.last_event_time().unwrap(), Some(second));
}

// ==================== Rollover Tests ====================

#[test]
fn test_rollover_archives_previous_day() {
    let (tracker, clock) = create_tracker(at(2024, 6, 14, 21, 0));
    for _ in 0..3 {
        tracker.log_event().unwrap();
    }

    clock.set_time(at(2024, 6, 15, 7, 0));
    tracker.ensure_current_day().unwrap();

    assert_eq!(tracker.today_count().unwrap(), 0);
    assert!(tracker.list_today().unwrap().is_empty());
    assert_eq!(
        tracker.history_all().unwrap(),
        vec![DayRecord::new(date(2024, 6, 14), 3)]
    );
    // The last event time survives the rollover
    assert_eq!(tracker.last_event_time().unwrap(), Some(at(2024, 6, 14, 21, 0)));
}

#[test]
fn test_rollover_across_several_days() {
    let (tracker, clock) = create_tracker(at(2024, 6, 10, 12, 0));
    tracker.log_event().unwrap();
    tracker.log_event().unwrap();

    clock.set_time(at(2024, 6, 15, 12, 0));
    tracker.log_event().unwrap();

    assert_eq!(
        tracker.history_all().unwrap(),
        vec![
            DayRecord::new(date(2024, 6, 15), 1),
            DayRecord::new(date(2024, 6, 10), 2),
        ]
    );
}

#[test]
fn test_rollover_of_empty_day_archives_nothing() {
    let (tracker, clock) = create_tracker(at(2024, 6, 14, 12, 0));
    tracker.ensure_current_day().unwrap();

    clock.set_time(at(2024, 6, 15, 12, 0));
    tracker.ensure_current_day().unwrap();

    assert!(tracker.history_all().unwrap().is_empty());
    let raw = tracker.store().load().unwrap();
    assert_eq!(raw.settings.current_date.as_deref(), Some("2024-06-15"));
}

#[test]
fn test_stored_day_ahead_of_clock_is_kept() {
    let raw = StoredState {
        settings: StoredSettings {
            current_date: Some("2024-06-16".to_string()),
            smokes_today: 1,
            last_smoke_time: Some("2024-06-16T09:00:00".to_string()),
        },
        timestamps: Some("2024-06-16T09:00:00".to_string()),
        history: [("2024-06-16".to_string(), 1)].into_iter().collect(),
    };
    let clock = MockClock::new(at(2024, 6, 15, 10, 0));
    let tracker = Tracker::new(MemoryStore::with_state(raw), clock);

    tracker.log_event().unwrap();

    assert_eq!(tracker.today_count().unwrap(), 2);
    // Events logged while the clock is behind still count toward the stored day
    assert_eq!(
        tracker.history_all().unwrap(),
        vec![DayRecord::new(date(2024, 6, 16), 2)]
    );
}

// ==================== History Tests ====================

#[test]
fn test_history_never_contains_zero_days() {
    let (tracker, clock) = create_tracker(at(2024, 6, 13, 12, 0));
    tracker.log_event().unwrap();
    tracker.remove_last_event().unwrap();

    clock.set_time(at(2024, 6, 14, 12, 0));
    tracker.log_event().unwrap();

    clock.set_time(at(2024, 6, 15, 12, 0));
    tracker.ensure_current_day().unwrap();

    let history = tracker.history_all().unwrap();
    assert!(history.iter().all(|record| record.count > 0));
    assert_eq!(history, vec![DayRecord::new(date(2024, 6, 14), 1)]);
}

#[test]
fn test_history_in_range_is_inclusive() {
    let (tracker, clock) = create_tracker(at(2024, 6, 10, 12, 0));
    for day in 10..=15 {
        clock.set_time(at(2024, 6, day, 12, 0));
        tracker.log_event().unwrap();
    }

    let records = tracker
        .history_in_range(date(2024, 6, 11), date(2024, 6, 13))
        .unwrap();

    let dates: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
    assert_eq!(
        dates,
        vec![date(2024, 6, 13), date(2024, 6, 12), date(2024, 6, 11)]
    );
}

#[test]
fn test_range_buckets_are_dense() {
    let (tracker, clock) = create_tracker(at(2024, 6, 9, 12, 0));
    tracker.log_event().unwrap();
    clock.set_time(at(2024, 6, 12, 12, 0));
    tracker.log_event().unwrap();
    tracker.log_event().unwrap();
    clock.set_time(at(2024, 6, 15, 12, 0));

    let buckets = tracker.range_buckets(7).unwrap();

    assert_eq!(buckets.len(), 7);
    assert_eq!(buckets[0].date, date(2024, 6, 9));
    assert_eq!(buckets[6].date, date(2024, 6, 15));
    let counts: Vec<u32> = buckets.iter().map(|b| b.count).collect();
    assert_eq!(counts, vec![1, 0, 0, 2, 0, 0, 0]);
}

#[test]
fn test_range_summary_over_week() {
    let (tracker, clock) = create_tracker(at(2024, 6, 9, 12, 0));
    tracker.log_event().unwrap();
    clock.set_time(at(2024, 6, 12, 12, 0));
    for _ in 0..3 {
        tracker.log_event().unwrap();
    }
    clock.set_time(at(2024, 6, 15, 12, 0));
    tracker.log_event().unwrap();

    let summary: RangeSummary = tracker.range_summary(7).unwrap();

    assert_eq!(summary.days, 7);
    assert_eq!(summary.total, 5);
    assert!((summary.daily_average - 5.0 / 7.0).abs() < 1e-9);
    assert_eq!(summary.peak, Some(DayRecord::new(date(2024, 6, 12), 3)));
    assert_eq!(summary.trough, Some(DayRecord::new(date(2024, 6, 9), 1)));
}

// ==================== Interval Tests ====================

#[test]
fn test_intervals_today() {
    let (tracker, clock) = create_tracker(at(2024, 6, 15, 9, 0));
    tracker.log_event().unwrap();
    clock.set_time(at(2024, 6, 15, 9, 45));
    tracker.log_event().unwrap();
    clock.set_time(at(2024, 6, 15, 11, 15));
    tracker.log_event().unwrap();

    assert_eq!(tracker.intervals_today().unwrap(), vec![45, 90]);
}

#[test]
fn test_intervals_truncate_partial_minutes() {
    let start = at(2024, 6, 15, 9, 0);
    let events = vec![start, start + Duration::seconds(90)];

    assert_eq!(intervals_minutes(&events), vec![1]);
}

// ==================== Snapshot Tests ====================

#[test]
fn test_export_import_round_trip() {
    let (source, clock) = create_tracker(at(2024, 6, 13, 10, 0));
    source.log_event().unwrap();
    clock.set_time(at(2024, 6, 15, 8, 0));
    source.log_event().unwrap();
    clock.set_time(at(2024, 6, 15, 8, 30));
    source.log_event().unwrap();

    let json = source.export_snapshot().unwrap().to_json().unwrap();

    let (target, _) = create_tracker(at(2024, 6, 15, 9, 0));
    let summary = target.import_json(&json).unwrap();

    assert_eq!(summary.events, 2);
    assert_eq!(summary.days, 2);
    assert_eq!(target.history_all().unwrap(), source.history_all().unwrap());
    assert_eq!(target.list_today().unwrap(), source.list_today().unwrap());
    assert_eq!(target.today_count().unwrap(), 2);
    assert_eq!(
        target.last_event_time().unwrap(),
        source.last_event_time().unwrap()
    );
}

#[test]
fn test_import_replaces_existing_state() {
    let (tracker, _) = create_tracker(at(2024, 6, 15, 9, 0));
    tracker.log_event().unwrap();

    let json = r#"{
        "history": [{"date": "2024-06-01", "count": 5}],
        "todayTimestamps": [],
        "currentDate": "2024-06-15"
    }"#;
    tracker.import_json(json).unwrap();

    assert_eq!(tracker.today_count().unwrap(), 0);
    assert_eq!(
        tracker.history_all().unwrap(),
        vec![DayRecord::new(date(2024, 6, 1), 5)]
    );
}

#[test]
fn test_import_of_older_day_rolls_over() {
    let (tracker, _) = create_tracker(at(2024, 6, 15, 9, 0));

    let json = r#"{
        "todayTimestamps": ["2024-06-12T20:00:00", "2024-06-12T21:00:00"],
        "lastSmokeTime": "2024-06-12T21:00:00",
        "currentDate": "2024-06-12",
        "smokesToday": 2
    }"#;
    tracker.import_json(json).unwrap();

    // The next call sees a new day and archives the imported one
    assert_eq!(tracker.today_count().unwrap(), 0);
    assert_eq!(
        tracker.history_all().unwrap(),
        vec![DayRecord::new(date(2024, 6, 12), 2)]
    );
}

#[test]
fn test_malformed_import_leaves_state_untouched() {
    let (tracker, _) = create_tracker(at(2024, 6, 15, 9, 0));
    tracker.log_event().unwrap();
    let before = tracker.store().load().unwrap();

    let invalid = [
        "not json",
        r#"{"history": "nope"}"#,
        r#"{"history": [{"date": "2024-06-01", "count": -1}]}"#,
        r#"{"history": [{"date": "June 1st", "count": 1}]}"#,
        r#"{"todayTimestamps": ["yesterday"]}"#,
        r#"{"version": 99}"#,
    ];

    for json in invalid {
        let result = tracker.import_json(json);
        assert!(result.is_err(), "{} should be rejected", json);
        assert_eq!(tracker.store().load().unwrap(), before);
    }
}

#[test]
fn test_import_error_kinds() {
    assert!(matches!(
        Snapshot::from_json("[1, 2"),
        Err(TrackerError::Schema(_))
    ));
    assert!(matches!(
        Snapshot::from_json(r#"{"currentDate": "15/06/2024"}"#),
        Err(TrackerError::Parse(_))
    ));
}

// ==================== Property Tests ====================

proptest! {
    #[test]
    fn prop_count_always_matches_event_list(ops in prop::collection::vec(any::<bool>(), 0..40)) {
        let (tracker, clock) = create_tracker(at(2024, 6, 15, 6, 0));

        for log in ops {
            if log {
                tracker.log_event().unwrap();
            } else {
                tracker.remove_last_event().unwrap();
            }
            clock.advance(Duration::minutes(7));
        }

        let events = tracker.list_today().unwrap();
        prop_assert_eq!(tracker.today_count().unwrap() as usize, events.len());

        let history = tracker.history_all().unwrap();
        prop_assert!(history.iter().all(|record| record.count > 0));
        let today_entry = history.iter().find(|r| r.date == date(2024, 6, 15)).map(|r| r.count as usize);
        prop_assert_eq!(today_entry.unwrap_or(0), events.len());
    }
}
