use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};
use ulid::Ulid;

use crate::engine::{RoomWindow, parse_date};
use crate::model::*;

use super::cafeteria::Created;
use super::{ApiResult, AppState, Caller};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub meeting_name: Option<String>,
}

impl RoomRequest {
    fn window(&self) -> Result<RoomWindow, crate::engine::EngineError> {
        RoomWindow::parse(&self.date, &self.start_time, &self.end_time)
    }
}

/// A reschedule moves the window only; the meeting name is kept.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleRequest {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub exclude_reservation_id: Option<Ulid>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: String,
}

pub async fn available_slots(
    State(state): State<AppState>,
    _caller: Caller,
    Query(q): Query<DateQuery>,
) -> ApiResult<Json<Vec<CandidateSlot>>> {
    let date = parse_date(&q.date)?;
    Ok(Json(state.engine.available_room_slots(date).await))
}

pub async fn check_availability(
    State(state): State<AppState>,
    _caller: Caller,
    Json(req): Json<AvailabilityRequest>,
) -> ApiResult<Json<AvailabilityCheck>> {
    let window = RoomWindow::parse(&req.date, &req.start_time, &req.end_time)?;
    Ok(Json(
        state
            .engine
            .check_room_availability(window, req.exclude_reservation_id)
            .await,
    ))
}

pub async fn create_reservation(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<RoomRequest>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    let window = req.window()?;
    let id = state
        .engine
        .create_room_reservation(&actor, window, req.meeting_name)
        .await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

pub async fn reschedule(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
    Json(req): Json<RescheduleRequest>,
) -> ApiResult<Json<Value>> {
    let window = RoomWindow::parse(&req.date, &req.start_time, &req.end_time)?;
    state
        .engine
        .reschedule_room_reservation(&actor, id, window)
        .await?;
    Ok(Json(json!({ "message": "Room reservation updated" })))
}

pub async fn cancel_reservation(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
) -> ApiResult<Json<Value>> {
    state.engine.cancel_room_reservation(&actor, id).await?;
    Ok(Json(json!({ "message": "Room reservation cancelled" })))
}

pub async fn check_in(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
) -> ApiResult<Json<Value>> {
    let status = state.engine.check_in_room(&actor, id).await?;
    Ok(Json(json!({ "message": "Checked in", "status": status })))
}

pub async fn complete(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
) -> ApiResult<Json<Value>> {
    state.engine.complete_room_reservation(&actor, id).await?;
    Ok(Json(json!({ "message": "Room reservation completed" })))
}

pub async fn delete_reservation(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
) -> ApiResult<StatusCode> {
    state.engine.delete_room_reservation(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reservations_on(
    State(state): State<AppState>,
    _caller: Caller,
    Query(q): Query<DateQuery>,
) -> ApiResult<Json<Vec<RoomReservationInfo>>> {
    let date = parse_date(&q.date)?;
    Ok(Json(state.engine.room_reservations_on(date).await))
}

pub async fn my_reservations(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> Json<Vec<RoomReservationInfo>> {
    Json(state.engine.my_room_reservations(&actor).await)
}

pub async fn all_reservations(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Json<Vec<RoomReservationInfo>>> {
    Ok(Json(state.engine.all_room_reservations(&actor).await?))
}
