//! Request and response bodies. All camelCase on the wire.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::{HourPackage, SubscriptionPlan};
use crate::engine::SlotCell;
use crate::maintenance::MaintenanceReport;
use crate::model::{Booking, BookingDraft, ServiceKind, Subscription};
use crate::slot::SlotTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub studios: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartTimesQuery {
    pub date: NaiveDate,
    pub duration: u8,
    pub guests: u32,
}

/// One half-hour cell of the public day listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDto {
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub is_available: bool,
}

impl From<SlotCell> for SlotDto {
    fn from(cell: SlotCell) -> Self {
        Self {
            start_time: cell.start_time,
            end_time: cell.end_time,
            is_available: cell.is_available,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub studio_id: String,
    pub date: NaiveDate,
    pub slots: Vec<SlotDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTimesResponse {
    pub studio_id: String,
    pub date: NaiveDate,
    pub duration: u8,
    pub start_times: Vec<SlotTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogResponse<'a> {
    pub plans: &'a [SubscriptionPlan],
    pub packages: &'a [HourPackage],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub user_id: String,
    pub service_type: ServiceKind,
    pub service_id: String,
    #[serde(default)]
    pub booking_draft: Option<BookingDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub already_processed: bool,
    pub booking: Option<Booking>,
    pub subscription: Option<Subscription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingsResponse {
    pub bookings: Vec<Booking>,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudioBookingsQuery {
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: MaintenanceReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRequest {
    pub date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockResponse {
    pub blocked_slots: usize,
}
