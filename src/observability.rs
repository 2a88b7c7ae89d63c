use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests served. Labels: route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "studiobook_http_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "studiobook_http_request_duration_seconds";

/// Counter: bookings created by the commit routine.
pub const BOOKINGS_COMMITTED_TOTAL: &str = "studiobook_bookings_committed_total";

/// Counter: commits rejected because a slot was already taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "studiobook_booking_conflicts_total";

/// Counter: checkout sessions created. Labels: service_type.
pub const CHECKOUT_SESSIONS_TOTAL: &str = "studiobook_checkout_sessions_total";

/// Counter: payment verifications. Labels: outcome.
pub const PAYMENT_VERIFICATIONS_TOTAL: &str = "studiobook_payment_verifications_total";

/// Counter: refunds requested after a post-payment conflict. Labels: status.
pub const REFUNDS_TOTAL: &str = "studiobook_refunds_total";

/// Counter: calendar events pushed. Labels: status.
pub const CALENDAR_EVENTS_TOTAL: &str = "studiobook_calendar_events_total";

/// Counter: admin requests rejected for a bad or missing token.
pub const AUTH_FAILURES_TOTAL: &str = "studiobook_auth_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: maintenance passes completed.
pub const MAINTENANCE_RUNS_TOTAL: &str = "studiobook_maintenance_runs_total";

/// Counter: maintenance passes that aborted with an error.
pub const MAINTENANCE_FAILURES_TOTAL: &str = "studiobook_maintenance_failures_total";

/// Histogram: maintenance pass duration in seconds.
pub const MAINTENANCE_DURATION_SECONDS: &str = "studiobook_maintenance_duration_seconds";

/// Counter: slot rows created by maintenance.
pub const SLOTS_CREATED_TOTAL: &str = "studiobook_slots_created_total";

/// Counter: past slot rows deleted by maintenance.
pub const SLOTS_PRUNED_TOTAL: &str = "studiobook_slots_pruned_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "studiobook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "studiobook_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
