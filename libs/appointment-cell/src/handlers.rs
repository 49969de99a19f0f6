use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::AppState;

use crate::models::{
    Booking, BookingKind, BookingQuery, BookingResponse, CancelBookingRequest, ConflictCheckQuery,
    CreateBookingRequest, RescheduleBookingRequest, UpdateBookingDetailsRequest, UpdateStatusRequest,
};
use crate::services::BookingService;

/// `{"success": true, "<kind>": booking, "message": ...}`
fn envelope(kind: BookingKind, booking: Booking, message: &str) -> Value {
    let mut body = Map::new();
    body.insert("success".into(), json!(true));
    body.insert(kind.as_str().into(), json!(BookingResponse::from(booking)));
    body.insert("message".into(), json!(message));
    Value::Object(body)
}

#[axum::debug_handler]
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<BookingKind>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = BookingService::from_state(&state);

    let booking = service.create(kind, request, user.id).await?;
    info!("{} {} created by {}", kind, booking.id, user.id);

    Ok((
        StatusCode::CREATED,
        Json(envelope(kind, booking, "Booking created successfully")),
    ))
}

#[axum::debug_handler]
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<BookingKind>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::from_state(&state);

    let booking = service.get(kind, booking_id).await?;

    Ok(Json(json!(BookingResponse::from(booking))))
}

#[axum::debug_handler]
pub async fn search_bookings(
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<BookingKind>,
    Query(query): Query<BookingQuery>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::from_state(&state);

    let limit = query.limit;
    let offset = query.offset;
    let bookings: Vec<BookingResponse> = service
        .search(kind, query)
        .await?
        .into_iter()
        .map(BookingResponse::from)
        .collect();

    let mut body = Map::new();
    body.insert("total".into(), json!(bookings.len()));
    body.insert(format!("{}s", kind.as_str()), json!(bookings));
    body.insert("limit".into(), json!(limit));
    body.insert("offset".into(), json!(offset));
    Ok(Json(Value::Object(body)))
}

#[axum::debug_handler]
pub async fn update_booking(
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<BookingKind>,
    Extension(user): Extension<User>,
    Path(booking_id): Path<Uuid>,
    Json(request): Json<UpdateBookingDetailsRequest>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::from_state(&state);

    let booking = service.update_details(kind, booking_id, request, user.id).await?;

    Ok(Json(envelope(kind, booking, "Booking updated successfully")))
}

#[axum::debug_handler]
pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<BookingKind>,
    Extension(user): Extension<User>,
    Path(booking_id): Path<Uuid>,
    Json(request): Json<RescheduleBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::from_state(&state);

    let booking = service.reschedule(kind, booking_id, request, user.id).await?;

    Ok(Json(envelope(kind, booking, "Booking rescheduled successfully")))
}

#[axum::debug_handler]
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<BookingKind>,
    Extension(user): Extension<User>,
    Path(booking_id): Path<Uuid>,
    request: Option<Json<CancelBookingRequest>>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::from_state(&state);

    let reason = request.and_then(|Json(body)| body.reason);
    let booking = service.cancel(kind, booking_id, reason, user.id).await?;
    info!("{} {} cancelled by {}", kind, booking_id, user.id);

    Ok(Json(envelope(kind, booking, "Booking cancelled")))
}

#[axum::debug_handler]
pub async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<BookingKind>,
    Extension(user): Extension<User>,
    Path(booking_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::from_state(&state);

    let booking = service
        .transition(kind, booking_id, request.status, request.diagnosis, user.id)
        .await?;

    Ok(Json(envelope(kind, booking, "Status updated successfully")))
}

#[axum::debug_handler]
pub async fn check_conflicts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::from_state(&state);

    let response = service.check_slot(query).await?;

    Ok(Json(json!(response)))
}
