//! Router configuration for the HTTP API.

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;
use crate::observability::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Create the application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let api_v1 = Router::new()
        // Public browsing
        .route("/studios", get(handlers::list_studios))
        .route("/studios/{id}", get(handlers::get_studio))
        .route("/studios/{id}/availability", get(handlers::get_availability))
        .route("/studios/{id}/start-times", get(handlers::get_start_times))
        .route("/catalog", get(handlers::get_catalog))
        // Purchase flow
        .route("/checkout/sessions", post(handlers::create_checkout_session))
        .route("/checkout/verify", post(handlers::verify_payment))
        .route("/users/{user_id}/bookings", get(handlers::list_user_bookings))
        // Operator routes, bearer token required
        .route("/admin/availability/refresh", post(handlers::refresh_availability))
        .route("/admin/studios/{id}/blocks", post(handlers::block_slots))
        .route("/admin/studios/{id}/bookings", get(handlers::list_studio_bookings))
        .route("/admin/bookings/{id}/cancel", post(handlers::cancel_booking))
        .route("/admin/calendar-events", post(handlers::create_calendar_event));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", api_v1)
        .route_layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Record request count and latency, labelled by route template so ids
/// never become label values.
async fn track_metrics(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let start = Instant::now();
    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(HTTP_REQUESTS_TOTAL, "route" => route.clone(), "status" => status).increment(1);
    metrics::histogram!(HTTP_REQUEST_DURATION_SECONDS, "route" => route).record(start.elapsed().as_secs_f64());
    response
}
