use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::limits::MAINTENANCE_BATCH_SIZE;
use crate::model::AvailabilitySlot;

/// Outcome of one maintenance pass, summed over all studios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub deleted_count: usize,
    pub new_slots_count: usize,
    pub completed_bookings: usize,
}

/// Keep every studio's slot rows covering `[today, today + horizon)`.
///
/// Prunes rows dated before `today`, then fills every missing day after the
/// studio's latest row with open business-hour rows, written in batches.
/// A second run on the same day writes nothing. An error aborts the pass;
/// whatever was written stays and the next run picks up from there.
pub async fn run_maintenance(engine: &Engine, today: NaiveDate) -> Result<MaintenanceReport, EngineError> {
    let started = std::time::Instant::now();
    let mut report = MaintenanceReport::default();
    let last_day = crate::engine::horizon_last_day(today, engine.policy.horizon_days);

    let mut studio_ids = engine.studio_ids();
    studio_ids.sort();
    for studio_id in studio_ids {
        report.deleted_count += engine.prune_slots(studio_id, today).await?;
        report.completed_bookings += engine.complete_past_bookings(studio_id, today).await?;

        let first_missing = match engine.max_slot_date(studio_id).await? {
            Some(max) if max >= today => max.checked_add_days(Days::new(1)),
            _ => Some(today),
        };
        let Some(first_missing) = first_missing else { continue };
        report.new_slots_count += fill_days(engine, studio_id, first_missing, last_day).await?;
    }

    metrics::counter!(crate::observability::MAINTENANCE_RUNS_TOTAL).increment(1);
    metrics::counter!(crate::observability::SLOTS_PRUNED_TOTAL).increment(report.deleted_count as u64);
    metrics::counter!(crate::observability::SLOTS_CREATED_TOTAL).increment(report.new_slots_count as u64);
    metrics::histogram!(crate::observability::MAINTENANCE_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    info!(
        deleted = report.deleted_count,
        created = report.new_slots_count,
        completed = report.completed_bookings,
        "availability maintenance finished"
    );
    Ok(report)
}

/// Generate open rows for `[from, to]` and insert them batch by batch.
async fn fill_days(
    engine: &Engine,
    studio_id: Ulid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<usize, EngineError> {
    let starts = engine.policy.hours.slot_starts();
    let rows: Vec<AvailabilitySlot> = from
        .iter_days()
        .take_while(|d| *d <= to)
        .flat_map(|date| {
            starts
                .iter()
                .map(move |start| AvailabilitySlot::open(studio_id, date, *start))
        })
        .collect();

    let mut inserted = 0;
    for batch in rows.chunks(MAINTENANCE_BATCH_SIZE) {
        inserted += engine.materialize_slots(studio_id, batch.to_vec()).await?;
    }
    if inserted > 0 {
        debug!(studio = %studio_id, %from, %to, inserted, "materialized slot rows");
    }
    Ok(inserted)
}

/// Background task: one pass right away, then one every `every`.
pub async fn run_scheduler(engine: Arc<Engine>, every: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => break,
        }
        let today = crate::engine::today();
        if let Err(e) = run_maintenance(&engine, today).await {
            metrics::counter!(crate::observability::MAINTENANCE_FAILURES_TOTAL).increment(1);
            error!("availability maintenance failed: {e}");
        }
    }
}

/// Background task: rewrite the log once enough records have piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => break,
        }
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!(appends, "compacted booking log"),
            Err(e) => error!("log compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CommitRequest, SlotPolicy};
    use crate::model::*;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("studiobook_test_maintenance");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn studio() -> Studio {
        Studio {
            id: Ulid::new(),
            name: "Control Room".into(),
            location: "Hamburg".into(),
            price_per_hour: 7000,
            max_guests: 5,
            max_booking_duration: 4,
            description: String::new(),
        }
    }

    async fn engine_with(name: &str, studios: usize) -> (Engine, Vec<Studio>) {
        let engine = Engine::new(test_wal_path(name), SlotPolicy::default()).unwrap();
        let mut all = Vec::new();
        for _ in 0..studios {
            let s = studio();
            engine.register_studio(s.clone()).await.unwrap();
            all.push(s);
        }
        (engine, all)
    }

    #[tokio::test]
    async fn first_run_fills_horizon() {
        let (engine, studios) = engine_with("fill.wal", 2).await;
        let today = d("2025-03-01");

        let report = run_maintenance(&engine, today).await.unwrap();
        assert_eq!(report.new_slots_count, 2 * 30 * 23);
        assert_eq!(report.deleted_count, 0);

        for s in &studios {
            assert_eq!(engine.max_slot_date(s.id).await.unwrap(), Some(d("2025-03-30")));
            let rows = engine.slot_rows(s.id, d("2025-03-15")).await.unwrap();
            assert_eq!(rows.len(), 23);
            assert!(rows.iter().all(|r| r.is_available));
            assert_eq!(rows[0].start_time.to_string(), "08:00");
            assert_eq!(rows[22].end_time.to_string(), "19:30");
        }
    }

    #[tokio::test]
    async fn second_run_same_day_is_noop() {
        let (engine, _) = engine_with("idempotent.wal", 1).await;
        let today = d("2025-03-01");
        run_maintenance(&engine, today).await.unwrap();
        let appends = engine.wal_appends_since_compact().await;

        let report = run_maintenance(&engine, today).await.unwrap();
        assert_eq!(report, MaintenanceReport::default());
        assert_eq!(engine.wal_appends_since_compact().await, appends);
    }

    #[tokio::test]
    async fn next_day_prunes_one_and_adds_one() {
        let (engine, studios) = engine_with("roll.wal", 1).await;
        run_maintenance(&engine, d("2025-03-01")).await.unwrap();

        let report = run_maintenance(&engine, d("2025-03-02")).await.unwrap();
        assert_eq!(report.deleted_count, 23);
        assert_eq!(report.new_slots_count, 23);
        let s = &studios[0];
        assert!(engine.slot_rows(s.id, d("2025-03-01")).await.unwrap().is_empty());
        assert_eq!(engine.max_slot_date(s.id).await.unwrap(), Some(d("2025-03-31")));
    }

    #[tokio::test]
    async fn stale_table_is_rebuilt_from_today() {
        let (engine, studios) = engine_with("stale.wal", 1).await;
        run_maintenance(&engine, d("2025-01-01")).await.unwrap();

        // Two months later every row is in the past
        let report = run_maintenance(&engine, d("2025-03-01")).await.unwrap();
        assert_eq!(report.deleted_count, 30 * 23);
        assert_eq!(report.new_slots_count, 30 * 23);
        assert_eq!(
            engine.max_slot_date(studios[0].id).await.unwrap(),
            Some(d("2025-03-30"))
        );
    }

    #[tokio::test]
    async fn new_studio_gets_rows_alongside_existing() {
        let (engine, _) = engine_with("late_studio.wal", 1).await;
        let today = d("2025-03-01");
        run_maintenance(&engine, today).await.unwrap();

        let late = studio();
        engine.register_studio(late.clone()).await.unwrap();
        let report = run_maintenance(&engine, today).await.unwrap();
        assert_eq!(report.new_slots_count, 30 * 23);
        assert_eq!(engine.max_slot_date(late.id).await.unwrap(), Some(d("2025-03-30")));
    }

    #[tokio::test]
    async fn booked_rows_survive_and_past_bookings_complete() {
        let (engine, studios) = engine_with("booked.wal", 1).await;
        let s = &studios[0];
        run_maintenance(&engine, d("2025-03-01")).await.unwrap();

        let booking = engine
            .commit_booking(
                CommitRequest {
                    user_id: "user-7".into(),
                    studio_id: s.id,
                    date: d("2025-03-03"),
                    start_time: "10:00".parse().unwrap(),
                    duration: 1,
                    number_of_guests: 1,
                    total_price: 7000,
                    service: ServiceRef {
                        kind: ServiceKind::HourPackage,
                        id: "pkg-1h".into(),
                    },
                    payment_session_id: None,
                },
                d("2025-03-01"),
            )
            .await
            .unwrap()
            .into_booking();

        let report = run_maintenance(&engine, d("2025-03-02")).await.unwrap();
        assert_eq!(report.completed_bookings, 0);
        let taken = engine
            .slot_rows(s.id, d("2025-03-03"))
            .await
            .unwrap()
            .iter()
            .filter(|r| !r.is_available)
            .count();
        assert_eq!(taken, 2);

        let report = run_maintenance(&engine, d("2025-03-04")).await.unwrap();
        assert_eq!(report.completed_bookings, 1);
        assert_eq!(
            engine.get_booking(booking.id).await.unwrap().status,
            BookingStatus::Completed
        );
    }

    #[tokio::test]
    async fn scheduler_stops_on_cancel() {
        let (engine, studios) = engine_with("scheduler.wal", 1).await;
        let engine = Arc::new(engine);
        let token = CancellationToken::new();
        let task = tokio::spawn(run_scheduler(engine.clone(), Duration::from_secs(3600), token.clone()));

        // The first tick fires immediately
        for _ in 0..100 {
            if engine.max_slot_date(studios[0].id).await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(engine.max_slot_date(studios[0].id).await.unwrap().is_some());

        token.cancel();
        task.await.unwrap();
    }
}
