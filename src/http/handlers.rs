//! HTTP handlers. Each one validates its input and delegates to the engine,
//! the checkout bridge or the calendar client.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use ulid::Ulid;

use super::dto::*;
use super::error::AppError;
use super::state::AppState;
use crate::auth::Admin;
use crate::calendar::{CalendarEvent, CreatedEvent};
use crate::checkout::CreateSession;
use crate::engine::today;
use crate::limits::MAX_USER_ID_LEN;
use crate::model::{Booking, ServiceRef, Studio};

pub type HandlerResult<T> = Result<Json<T>, AppError>;

fn parse_id(raw: &str) -> Result<Ulid, AppError> {
    Ulid::from_string(raw).map_err(|_| AppError::BadRequest(format!("invalid id: {raw}")))
}

// =============================================================================
// Health
// =============================================================================

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        studios: state.engine.studio_ids().len(),
    }))
}

// =============================================================================
// Studios & availability
// =============================================================================

/// GET /v1/studios
pub async fn list_studios(State(state): State<AppState>) -> HandlerResult<Vec<Studio>> {
    Ok(Json(state.engine.list_studios().await))
}

/// GET /v1/studios/{id}
pub async fn get_studio(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> HandlerResult<Studio> {
    let Path(id) = path?;
    Ok(Json(state.engine.get_studio(parse_id(&id)?).await?))
}

/// GET /v1/studios/{id}/availability?date=YYYY-MM-DD
///
/// Every half-hour cell inside opening hours with its availability.
pub async fn get_availability(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<DateQuery>, QueryRejection>,
) -> HandlerResult<AvailabilityResponse> {
    let Path(id) = path?;
    let Query(query) = query?;
    let studio_id = parse_id(&id)?;
    let cells = state.engine.day_slots(studio_id, query.date, today()).await?;
    Ok(Json(AvailabilityResponse {
        studio_id: studio_id.to_string(),
        date: query.date,
        slots: cells.into_iter().map(SlotDto::from).collect(),
    }))
}

/// GET /v1/studios/{id}/start-times?date=&duration=&guests=
pub async fn get_start_times(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<StartTimesQuery>, QueryRejection>,
) -> HandlerResult<StartTimesResponse> {
    let Path(id) = path?;
    let Query(query) = query?;
    let studio_id = parse_id(&id)?;
    let start_times = state
        .engine
        .available_start_times(studio_id, query.date, query.duration, query.guests, today())
        .await?;
    Ok(Json(StartTimesResponse {
        studio_id: studio_id.to_string(),
        date: query.date,
        duration: query.duration,
        start_times,
    }))
}

/// GET /v1/catalog
pub async fn get_catalog(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let body = CatalogResponse {
        plans: &state.catalog.plans,
        packages: &state.catalog.packages,
    };
    serde_json::to_value(body)
        .map(Json)
        .map_err(|e| AppError::Internal(e.to_string()))
}

// =============================================================================
// Checkout
// =============================================================================

/// POST /v1/checkout/sessions
pub async fn create_checkout_session(
    State(state): State<AppState>,
    body: Result<Json<CreateCheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateCheckoutResponse>), AppError> {
    let Json(request) = body?;
    let created = state
        .checkout
        .create_session(
            CreateSession {
                user_id: request.user_id,
                service: ServiceRef {
                    kind: request.service_type,
                    id: request.service_id,
                },
                booking_draft: request.booking_draft,
            },
            today(),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateCheckoutResponse {
            session_id: created.session_id,
            url: created.url,
            amount: created.amount,
        }),
    ))
}

/// POST /v1/checkout/verify
///
/// Verifies the session with the processor and commits the purchase.
pub async fn verify_payment(
    State(state): State<AppState>,
    body: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> HandlerResult<VerifyPaymentResponse> {
    let Json(request) = body?;
    if request.session_id.trim().is_empty() {
        return Err(AppError::BadRequest("sessionId is required".into()));
    }
    let completion = state.checkout.complete(&request.session_id, today()).await?;
    Ok(Json(VerifyPaymentResponse {
        success: true,
        already_processed: completion.already_processed,
        booking: completion.booking,
        subscription: completion.subscription,
    }))
}

/// GET /v1/users/{user_id}/bookings
pub async fn list_user_bookings(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> HandlerResult<BookingsResponse> {
    let Path(user_id) = path?;
    if user_id.is_empty() || user_id.len() > MAX_USER_ID_LEN {
        return Err(AppError::BadRequest("invalid user id".into()));
    }
    let bookings = state.engine.bookings_for_user(&user_id).await;
    Ok(Json(BookingsResponse {
        total: bookings.len(),
        bookings,
    }))
}

// =============================================================================
// Admin
// =============================================================================

/// POST /v1/admin/availability/refresh
pub async fn refresh_availability(_admin: Admin, State(state): State<AppState>) -> HandlerResult<RefreshResponse> {
    let report = crate::maintenance::run_maintenance(&state.engine, today()).await?;
    Ok(Json(RefreshResponse { success: true, report }))
}

/// POST /v1/admin/studios/{id}/blocks
pub async fn block_slots(
    _admin: Admin,
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<BlockRequest>, JsonRejection>,
) -> HandlerResult<BlockResponse> {
    let Path(id) = path?;
    let Json(request) = body?;
    let blocked_slots = state
        .engine
        .block_slots(parse_id(&id)?, request.date, request.start_time, request.end_time, today())
        .await?;
    Ok(Json(BlockResponse { blocked_slots }))
}

/// POST /v1/admin/bookings/{id}/cancel
pub async fn cancel_booking(
    _admin: Admin,
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> HandlerResult<Booking> {
    let Path(id) = path?;
    Ok(Json(state.engine.cancel_booking(parse_id(&id)?).await?))
}

/// GET /v1/admin/studios/{id}/bookings?date=
pub async fn list_studio_bookings(
    _admin: Admin,
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<StudioBookingsQuery>, QueryRejection>,
) -> HandlerResult<BookingsResponse> {
    let Path(id) = path?;
    let Query(query) = query?;
    let bookings = state
        .engine
        .bookings_for_studio(parse_id(&id)?, query.date)
        .await?;
    Ok(Json(BookingsResponse {
        total: bookings.len(),
        bookings,
    }))
}

/// POST /v1/admin/calendar-events
pub async fn create_calendar_event(
    _admin: Admin,
    State(state): State<AppState>,
    body: Result<Json<CalendarEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedEvent>), AppError> {
    let Json(event) = body?;
    event.validate()?;
    let created = match state.calendar.create_event(&event).await {
        Ok(created) => {
            metrics::counter!(crate::observability::CALENDAR_EVENTS_TOTAL, "status" => "created").increment(1);
            created
        }
        Err(e) => {
            metrics::counter!(crate::observability::CALENDAR_EVENTS_TOTAL, "status" => "failed").increment(1);
            return Err(e.into());
        }
    };
    Ok((StatusCode::CREATED, Json(created)))
}
