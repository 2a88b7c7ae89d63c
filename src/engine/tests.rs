use super::*;
use super::conflict::{check_in_horizon, horizon_last_day, validate_window};
use crate::slot::SlotTime;
use chrono::NaiveDate;

fn t(s: &str) -> SlotTime {
    s.parse().unwrap()
}

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

/// Fixed "today" so horizon checks are deterministic.
fn today() -> NaiveDate {
    d("2025-03-01")
}

fn studio() -> Studio {
    Studio {
        id: Ulid::new(),
        name: "Studio A".into(),
        location: "Berlin".into(),
        price_per_hour: 5000,
        max_guests: 4,
        max_booking_duration: 3,
        description: "Live room with drum kit".into(),
    }
}

fn request(studio_id: Ulid, date: NaiveDate, start: &str, duration: u8, session: Option<&str>) -> CommitRequest {
    CommitRequest {
        user_id: "user-1".into(),
        studio_id,
        date,
        start_time: t(start),
        duration,
        number_of_guests: 2,
        total_price: 5000 * duration as i64,
        service: ServiceRef {
            kind: ServiceKind::HourPackage,
            id: format!("pkg-{duration}h"),
        },
        payment_session_id: session.map(String::from),
    }
}

fn names(starts: &[SlotTime]) -> Vec<String> {
    starts.iter().map(|s| s.to_string()).collect()
}

// ── Pure helpers ─────────────────────────────────────────

#[test]
fn horizon_bounds() {
    assert_eq!(horizon_last_day(today(), 30), d("2025-03-30"));
    assert!(check_in_horizon(today(), today(), 30).is_ok());
    assert!(check_in_horizon(d("2025-03-30"), today(), 30).is_ok());
    assert!(matches!(
        check_in_horizon(d("2025-03-31"), today(), 30),
        Err(EngineError::OutsideHorizon(_))
    ));
    assert!(matches!(
        check_in_horizon(d("2025-02-28"), today(), 30),
        Err(EngineError::OutsideHorizon(_))
    ));
}

#[test]
fn window_must_match_duration_and_hours() {
    let hours = BusinessHours::default();
    assert!(validate_window(&hours, t("09:00"), t("10:00"), 1).is_ok());
    assert!(validate_window(&hours, t("09:00"), t("10:30"), 1).is_err());
    assert!(validate_window(&hours, t("07:30"), t("08:30"), 1).is_err());
    assert!(validate_window(&hours, t("18:30"), t("19:30"), 1).is_ok());
    assert!(validate_window(&hours, t("19:00"), t("20:00"), 1).is_err());
}

// ── Async engine tests ───────────────────────────────────

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("studiobook_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

async fn engine_with_studio(name: &str) -> (Engine, Studio) {
    let engine = Engine::new(test_wal_path(name), SlotPolicy::default()).unwrap();
    let s = studio();
    engine.register_studio(s.clone()).await.unwrap();
    (engine, s)
}

async fn open_day(engine: &Engine, studio_id: Ulid, date: NaiveDate) {
    let rows = engine
        .policy
        .hours
        .slot_starts()
        .into_iter()
        .map(|start| AvailabilitySlot::open(studio_id, date, start))
        .collect();
    engine.materialize_slots(studio_id, rows).await.unwrap();
}

#[tokio::test]
async fn register_and_list_studios() {
    let (engine, s) = engine_with_studio("register.wal").await;
    let listed = engine.list_studios().await;
    assert_eq!(listed, vec![s.clone()]);
    assert_eq!(engine.get_studio(s.id).await.unwrap(), s);
    assert!(matches!(
        engine.get_studio(Ulid::new()).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn register_rejects_bad_studio() {
    let engine = Engine::new(test_wal_path("bad_studio.wal"), SlotPolicy::default()).unwrap();
    let mut s = studio();
    s.max_booking_duration = 0;
    assert!(matches!(
        engine.register_studio(s).await,
        Err(EngineError::Validation(_))
    ));
    let mut s = studio();
    s.name = String::new();
    assert!(matches!(
        engine.register_studio(s).await,
        Err(EngineError::LimitExceeded(_))
    ));
}

#[tokio::test]
async fn reregister_updates_reference_data_only() {
    let (engine, mut s) = engine_with_studio("reregister.wal").await;
    let date = d("2025-03-02");
    open_day(&engine, s.id, date).await;

    s.price_per_hour = 6000;
    engine.register_studio(s.clone()).await.unwrap();

    assert_eq!(engine.get_studio(s.id).await.unwrap().price_per_hour, 6000);
    assert_eq!(engine.slot_rows(s.id, date).await.unwrap().len(), 23);
}

#[tokio::test]
async fn commit_marks_spanned_slots_unavailable() {
    let (engine, s) = engine_with_studio("commit_roundtrip.wal").await;
    let date = d("2025-03-05");
    open_day(&engine, s.id, date).await;

    let outcome = engine
        .commit_booking(request(s.id, date, "09:00", 1, Some("cs_1")), today())
        .await
        .unwrap();
    let booking = match outcome {
        CommitOutcome::Created(b) => b,
        other => panic!("expected Created, got {other:?}"),
    };
    assert_eq!(booking.end_time, t("10:00"));
    assert_eq!(booking.status, BookingStatus::Upcoming);

    let rows = engine.slot_rows(s.id, date).await.unwrap();
    let taken: Vec<String> = rows
        .iter()
        .filter(|r| !r.is_available)
        .map(|r| r.start_time.to_string())
        .collect();
    assert_eq!(taken, vec!["09:00", "09:30"]);

    let starts = names(&engine.available_start_times(s.id, date, 1, 2, today()).await.unwrap());
    assert!(!starts.contains(&"08:30".to_string()));
    assert!(!starts.contains(&"09:00".to_string()));
    assert!(!starts.contains(&"09:30".to_string()));
    assert!(starts.contains(&"08:00".to_string()));
    assert!(starts.contains(&"10:00".to_string()));

    assert_eq!(engine.get_booking(booking.id).await.unwrap(), booking);
    assert_eq!(engine.bookings_for_user("user-1").await, vec![booking.clone()]);
    assert_eq!(engine.booking_for_session("cs_1").await, Some(booking));
}

#[tokio::test]
async fn commit_on_unmaterialized_day_creates_taken_rows() {
    let (engine, s) = engine_with_studio("commit_no_rows.wal").await;
    let date = d("2025-03-10");

    engine
        .commit_booking(request(s.id, date, "14:00", 2, None), today())
        .await
        .unwrap();

    let rows = engine.slot_rows(s.id, date).await.unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| !r.is_available));
    assert!(matches!(
        engine
            .commit_booking(request(s.id, date, "15:00", 1, None), today())
            .await,
        Err(EngineError::AvailabilityConflict { .. })
    ));
}

#[tokio::test]
async fn concurrent_commits_for_same_window_admit_exactly_one() {
    let (engine, s) = engine_with_studio("commit_race.wal").await;
    let date = d("2025-03-05");
    open_day(&engine, s.id, date).await;

    let (a, b) = tokio::join!(
        engine.commit_booking(request(s.id, date, "09:00", 1, Some("cs_a")), today()),
        engine.commit_booking(request(s.id, date, "09:00", 1, Some("cs_b")), today()),
    );
    let results = [a, b];
    let created = results
        .iter()
        .filter(|r| matches!(r, Ok(CommitOutcome::Created(_))))
        .count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::AvailabilityConflict { .. })))
        .count();
    assert_eq!(created, 1);
    assert_eq!(conflicts, 1);
    assert_eq!(engine.bookings_for_studio(s.id, Some(date)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn overlapping_commits_conflict_on_first_taken_slot() {
    let (engine, s) = engine_with_studio("commit_overlap.wal").await;
    let date = d("2025-03-05");
    open_day(&engine, s.id, date).await;

    engine
        .commit_booking(request(s.id, date, "11:30", 1, None), today())
        .await
        .unwrap();
    let err = engine
        .commit_booking(request(s.id, date, "10:00", 2, None), today())
        .await
        .unwrap_err();
    match err {
        EngineError::AvailabilityConflict { start_time, .. } => assert_eq!(start_time, t("11:30")),
        other => panic!("expected conflict, got {other:?}"),
    }
    // Adjacent window is fine
    engine
        .commit_booking(request(s.id, date, "10:30", 1, None), today())
        .await
        .unwrap();
}

#[tokio::test]
async fn repeat_session_is_idempotent() {
    let (engine, s) = engine_with_studio("commit_idempotent.wal").await;
    let date = d("2025-03-05");
    open_day(&engine, s.id, date).await;

    let first = engine
        .commit_booking(request(s.id, date, "13:00", 1, Some("cs_same")), today())
        .await
        .unwrap();
    let second = engine
        .commit_booking(request(s.id, date, "13:00", 1, Some("cs_same")), today())
        .await
        .unwrap();
    assert!(matches!(first, CommitOutcome::Created(_)));
    assert!(matches!(second, CommitOutcome::AlreadyCommitted(_)));
    assert_eq!(first.booking().id, second.booking().id);
    assert_eq!(engine.bookings_for_studio(s.id, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn commit_rejects_outside_horizon() {
    let (engine, s) = engine_with_studio("commit_horizon.wal").await;
    for date in [d("2025-02-28"), d("2025-03-31"), d("2025-06-01")] {
        assert!(matches!(
            engine.commit_booking(request(s.id, date, "09:00", 1, None), today()).await,
            Err(EngineError::OutsideHorizon(_))
        ));
    }
    assert!(matches!(
        engine.available_start_times(s.id, d("2025-04-15"), 1, 1, today()).await,
        Err(EngineError::OutsideHorizon(_))
    ));
}

#[tokio::test]
async fn commit_validates_session_shape() {
    let (engine, s) = engine_with_studio("commit_validate.wal").await;
    let date = d("2025-03-05");

    // Longer than max_booking_duration
    assert!(matches!(
        engine.commit_booking(request(s.id, date, "09:00", 4, None), today()).await,
        Err(EngineError::Validation(_))
    ));
    // Too many guests
    let mut req = request(s.id, date, "09:00", 1, None);
    req.number_of_guests = 5;
    assert!(matches!(
        engine.commit_booking(req, today()).await,
        Err(EngineError::Validation(_))
    ));
    // Ends after closing
    assert!(matches!(
        engine.commit_booking(request(s.id, date, "19:00", 1, None), today()).await,
        Err(EngineError::Validation(_))
    ));
    // Unknown studio
    assert!(matches!(
        engine.commit_booking(request(Ulid::new(), date, "09:00", 1, None), today()).await,
        Err(EngineError::NotFound(_))
    ));
    // Missing user
    let mut req = request(s.id, date, "09:00", 1, None);
    req.user_id = String::new();
    assert!(matches!(
        engine.commit_booking(req, today()).await,
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn start_times_reject_invalid_duration_and_guests() {
    let (engine, s) = engine_with_studio("start_times_validate.wal").await;
    let date = d("2025-03-05");
    assert!(matches!(
        engine.available_start_times(s.id, date, 0, 1, today()).await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        engine.available_start_times(s.id, date, 1, 0, today()).await,
        Err(EngineError::Validation(_))
    ));
    let starts = engine.available_start_times(s.id, date, 1, 4, today()).await.unwrap();
    assert_eq!(starts.len(), 22);
}

#[tokio::test]
async fn cancel_reopens_slots() {
    let (engine, s) = engine_with_studio("cancel.wal").await;
    let date = d("2025-03-05");
    open_day(&engine, s.id, date).await;

    let booking = engine
        .commit_booking(request(s.id, date, "10:00", 2, None), today())
        .await
        .unwrap()
        .into_booking();
    let cancelled = engine.cancel_booking(booking.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let rows = engine.slot_rows(s.id, date).await.unwrap();
    assert!(rows.iter().all(|r| r.is_available));

    assert!(matches!(
        engine.cancel_booking(booking.id).await,
        Err(EngineError::InvalidTransition { .. })
    ));
    assert!(matches!(
        engine.cancel_booking(Ulid::new()).await,
        Err(EngineError::NotFound(_))
    ));

    // Window is bookable again
    engine
        .commit_booking(request(s.id, date, "10:00", 2, None), today())
        .await
        .unwrap();
}

#[tokio::test]
async fn block_closes_window_without_booking() {
    let (engine, s) = engine_with_studio("block.wal").await;
    let date = d("2025-03-06");
    open_day(&engine, s.id, date).await;

    let n = engine
        .block_slots(s.id, date, t("12:00"), t("14:00"), today())
        .await
        .unwrap();
    assert_eq!(n, 4);

    let starts = names(&engine.available_start_times(s.id, date, 1, 1, today()).await.unwrap());
    assert!(!starts.contains(&"11:30".to_string()));
    assert!(!starts.contains(&"13:30".to_string()));
    assert!(starts.contains(&"14:00".to_string()));
    assert!(engine.bookings_for_studio(s.id, None).await.unwrap().is_empty());

    assert!(matches!(
        engine.block_slots(s.id, date, t("19:00"), t("20:00"), today()).await,
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn cancel_keeps_later_block_closed() {
    let path = test_wal_path("cancel_after_block.wal");
    let s = studio();
    let date = d("2025-03-06");
    {
        let engine = Engine::new(path.clone(), SlotPolicy::default()).unwrap();
        engine.register_studio(s.clone()).await.unwrap();
        open_day(&engine, s.id, date).await;
        let booking = engine
            .commit_booking(request(s.id, date, "10:00", 1, None), today())
            .await
            .unwrap()
            .into_booking();
        engine
            .block_slots(s.id, date, t("10:00"), t("12:00"), today())
            .await
            .unwrap();
        engine.cancel_booking(booking.id).await.unwrap();

        let starts = names(&engine.available_start_times(s.id, date, 1, 1, today()).await.unwrap());
        assert!(!starts.contains(&"10:00".to_string()));
        assert!(!starts.contains(&"11:00".to_string()));
        assert!(starts.contains(&"12:00".to_string()));
        let rows = engine.slot_rows(s.id, date).await.unwrap();
        let row = rows.iter().find(|r| r.start_time == t("10:00")).unwrap();
        assert!(!row.is_available);

        engine.compact_wal().await.unwrap();
    }

    // The block outlives compaction: cancelling another booking after
    // restart still leaves it closed.
    let engine = Engine::new(path, SlotPolicy::default()).unwrap();
    let other = engine
        .commit_booking(request(s.id, date, "09:00", 2, None), today())
        .await;
    assert!(matches!(
        other,
        Err(EngineError::AvailabilityConflict { start_time, .. }) if start_time == t("10:00")
    ));
    let early = engine
        .commit_booking(request(s.id, date, "09:00", 1, None), today())
        .await
        .unwrap()
        .into_booking();
    engine.cancel_booking(early.id).await.unwrap();
    let rows = engine.slot_rows(s.id, date).await.unwrap();
    let closed: Vec<String> = rows
        .iter()
        .filter(|r| !r.is_available)
        .map(|r| r.start_time.to_string())
        .collect();
    assert_eq!(closed, vec!["10:00", "10:30", "11:00", "11:30"]);
}

#[tokio::test]
async fn cancel_leaves_overlapping_booking_closed() {
    let (engine, s) = engine_with_studio("cancel_overlap.wal").await;
    let date = d("2025-03-07");
    open_day(&engine, s.id, date).await;
    let first = engine
        .commit_booking(request(s.id, date, "10:00", 1, None), today())
        .await
        .unwrap()
        .into_booking();
    let second = engine
        .commit_booking(request(s.id, date, "11:00", 1, None), today())
        .await
        .unwrap()
        .into_booking();
    engine.cancel_booking(first.id).await.unwrap();

    let rows = engine.slot_rows(s.id, date).await.unwrap();
    let closed: Vec<String> = rows
        .iter()
        .filter(|r| !r.is_available)
        .map(|r| r.start_time.to_string())
        .collect();
    assert_eq!(closed, vec!["11:00", "11:30"]);
    assert_eq!(engine.get_booking(second.id).await.unwrap().status, BookingStatus::Upcoming);
}

#[tokio::test]
async fn day_slots_list_business_hours() {
    let (engine, s) = engine_with_studio("day_slots.wal").await;
    let date = d("2025-03-07");
    // Nothing materialized: still 23 open cells
    let cells = engine.day_slots(s.id, date, today()).await.unwrap();
    assert_eq!(cells.len(), 23);
    assert!(cells.iter().all(|c| c.is_available && !c.explicit));

    engine
        .commit_booking(request(s.id, date, "08:00", 1, None), today())
        .await
        .unwrap();
    let cells = engine.day_slots(s.id, date, today()).await.unwrap();
    assert!(!cells[0].is_available);
    assert!(!cells[1].is_available);
    assert!(cells[2].is_available);
}

#[tokio::test]
async fn check_window_is_advisory() {
    let (engine, s) = engine_with_studio("check_window.wal").await;
    let date = d("2025-03-05");
    let (studio, end) = engine
        .check_window(s.id, date, t("15:00"), 2, 2, today())
        .await
        .unwrap();
    assert_eq!(studio.id, s.id);
    assert_eq!(end, t("17:00"));
    // Nothing was marked
    assert!(engine.slot_rows(s.id, date).await.unwrap().is_empty());

    engine
        .commit_booking(request(s.id, date, "16:00", 1, None), today())
        .await
        .unwrap();
    assert!(matches!(
        engine.check_window(s.id, date, t("15:00"), 2, 2, today()).await,
        Err(EngineError::AvailabilityConflict { .. })
    ));
}

#[tokio::test]
async fn prune_and_materialize() {
    let (engine, s) = engine_with_studio("prune.wal").await;
    open_day(&engine, s.id, d("2025-02-27")).await;
    open_day(&engine, s.id, d("2025-03-01")).await;

    // Second insert of the same rows is a no-op
    let rows: Vec<AvailabilitySlot> = engine
        .policy
        .hours
        .slot_starts()
        .into_iter()
        .map(|start| AvailabilitySlot::open(s.id, d("2025-03-01"), start))
        .collect();
    assert_eq!(engine.materialize_slots(s.id, rows).await.unwrap(), 0);

    assert_eq!(engine.prune_slots(s.id, today()).await.unwrap(), 23);
    assert_eq!(engine.prune_slots(s.id, today()).await.unwrap(), 0);
    assert_eq!(engine.max_slot_date(s.id).await.unwrap(), Some(d("2025-03-01")));
}

#[tokio::test]
async fn materialize_rejects_oversized_or_foreign_batches() {
    let (engine, s) = engine_with_studio("materialize_limits.wal").await;
    let rows: Vec<AvailabilitySlot> = (0..5)
        .flat_map(|i| {
            let date = d("2025-03-02") + chrono::Days::new(i);
            (0..48u8)
                .filter_map(SlotTime::from_index)
                .map(move |start| AvailabilitySlot::open(s.id, date, start))
        })
        .take(101)
        .collect();
    assert!(matches!(
        engine.materialize_slots(s.id, rows).await,
        Err(EngineError::LimitExceeded(_))
    ));

    let foreign = vec![AvailabilitySlot::open(Ulid::new(), d("2025-03-02"), t("09:00"))];
    assert!(matches!(
        engine.materialize_slots(s.id, foreign).await,
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn complete_past_bookings_only_touches_past_upcoming() {
    let (engine, s) = engine_with_studio("complete.wal").await;
    let past = engine
        .commit_booking(request(s.id, d("2025-03-02"), "09:00", 1, None), today())
        .await
        .unwrap()
        .into_booking();
    let future = engine
        .commit_booking(request(s.id, d("2025-03-20"), "09:00", 1, None), today())
        .await
        .unwrap()
        .into_booking();

    // Two days later the first booking lies in the past
    let later = d("2025-03-03");
    assert_eq!(engine.complete_past_bookings(s.id, later).await.unwrap(), 1);
    assert_eq!(engine.complete_past_bookings(s.id, later).await.unwrap(), 0);
    assert_eq!(engine.get_booking(past.id).await.unwrap().status, BookingStatus::Completed);
    assert_eq!(engine.get_booking(future.id).await.unwrap().status, BookingStatus::Upcoming);
}

#[tokio::test]
async fn subscriptions_are_idempotent_per_session() {
    let engine = Engine::new(test_wal_path("subscriptions.wal"), SlotPolicy::default()).unwrap();
    let a = engine
        .activate_subscription("user-9".into(), "pro".into(), today(), Some("cs_sub".into()))
        .await
        .unwrap();
    let b = engine
        .activate_subscription("user-9".into(), "pro".into(), today(), Some("cs_sub".into()))
        .await
        .unwrap();
    assert_eq!(a, b);
    assert_eq!(a.renews_on, d("2025-04-01"));
    assert_eq!(engine.subscriptions_for_user("user-9"), vec![a.clone()]);
    assert_eq!(engine.subscription_for_session("cs_sub"), Some(a));
}

#[tokio::test]
async fn rejected_session_is_recorded_once_and_never_books() {
    let path = test_wal_path("rejected_session.wal");
    let s = studio();
    let date = d("2025-03-05");
    {
        let engine = Engine::new(path.clone(), SlotPolicy::default()).unwrap();
        engine.register_studio(s.clone()).await.unwrap();
        assert!(engine
            .reject_session("cs_lost".into(), "slot no longer available".into())
            .await
            .unwrap());
        assert!(!engine
            .reject_session("cs_lost".into(), "again".into())
            .await
            .unwrap());
        assert!(matches!(
            engine.reject_session(String::new(), "x".into()).await,
            Err(EngineError::Validation(_))
        ));
        engine.compact_wal().await.unwrap();
    }

    let engine = Engine::new(path, SlotPolicy::default()).unwrap();
    assert_eq!(
        engine.rejected_session("cs_lost").as_deref(),
        Some("slot no longer available")
    );
    assert!(matches!(
        engine
            .commit_booking(request(s.id, date, "10:00", 1, Some("cs_lost")), today())
            .await,
        Err(EngineError::Validation(_))
    ));
    assert!(engine.booking_for_session("cs_lost").await.is_none());
    assert!(engine.rejected_session("cs_other").is_none());
}

#[tokio::test]
async fn replay_restores_state() {
    let path = test_wal_path("replay.wal");
    let s = studio();
    let date = d("2025-03-05");
    let (booking_id, cancelled_id) = {
        let engine = Engine::new(path.clone(), SlotPolicy::default()).unwrap();
        engine.register_studio(s.clone()).await.unwrap();
        open_day(&engine, s.id, date).await;
        let kept = engine
            .commit_booking(request(s.id, date, "09:00", 1, Some("cs_keep")), today())
            .await
            .unwrap()
            .into_booking();
        let gone = engine
            .commit_booking(request(s.id, date, "12:00", 1, None), today())
            .await
            .unwrap()
            .into_booking();
        engine.cancel_booking(gone.id).await.unwrap();
        engine
            .activate_subscription("user-1".into(), "basic".into(), today(), Some("cs_sub".into()))
            .await
            .unwrap();
        (kept.id, gone.id)
    };

    let engine = Engine::new(path, SlotPolicy::default()).unwrap();
    assert_eq!(engine.get_studio(s.id).await.unwrap(), s);
    assert_eq!(engine.get_booking(booking_id).await.unwrap().start_time, t("09:00"));
    assert_eq!(
        engine.get_booking(cancelled_id).await.unwrap().status,
        BookingStatus::Cancelled
    );
    assert_eq!(engine.booking_for_session("cs_keep").await.map(|b| b.id), Some(booking_id));
    assert!(engine.subscription_for_session("cs_sub").is_some());

    let rows = engine.slot_rows(s.id, date).await.unwrap();
    assert_eq!(rows.len(), 23);
    assert_eq!(rows.iter().filter(|r| !r.is_available).count(), 2);

    // Idempotency survives restart
    let again = engine
        .commit_booking(request(s.id, date, "09:00", 1, Some("cs_keep")), today())
        .await
        .unwrap();
    assert!(matches!(again, CommitOutcome::AlreadyCommitted(_)));
}

#[tokio::test]
async fn compaction_preserves_state() {
    let path = test_wal_path("compact_engine.wal");
    let s = studio();
    let date = d("2025-03-05");
    {
        let engine = Engine::new(path.clone(), SlotPolicy::default()).unwrap();
        engine.register_studio(s.clone()).await.unwrap();
        for i in 0..5 {
            open_day(&engine, s.id, date + chrono::Days::new(i)).await;
        }
        engine
            .commit_booking(request(s.id, date, "10:00", 3, Some("cs_x")), today())
            .await
            .unwrap();
        engine.prune_slots(s.id, date + chrono::Days::new(2)).await.unwrap();
        assert!(engine.wal_appends_since_compact().await > 0);

        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);

        // Writes after compaction land in the new file
        engine
            .commit_booking(
                request(s.id, date + chrono::Days::new(3), "08:00", 1, None),
                today(),
            )
            .await
            .unwrap();
    }

    let engine = Engine::new(path, SlotPolicy::default()).unwrap();
    assert_eq!(engine.max_slot_date(s.id).await.unwrap(), Some(date + chrono::Days::new(4)));
    assert!(engine.slot_rows(s.id, date).await.unwrap().is_empty());
    assert_eq!(engine.bookings_for_studio(s.id, None).await.unwrap().len(), 2);
    assert!(engine.booking_for_session("cs_x").await.is_some());
    let third = engine.slot_rows(s.id, date + chrono::Days::new(3)).await.unwrap();
    assert_eq!(third.iter().filter(|r| !r.is_available).count(), 2);
}
