use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use ulid::Ulid;

use crate::model::*;

use super::{ApiError, ApiResult, AppState, Caller};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    pub time_slot_id: u32,
}

#[derive(Debug, Serialize)]
pub struct Created {
    pub id: Ulid,
}

pub async fn time_slots(State(state): State<AppState>, _caller: Caller) -> Json<Vec<SlotAvailability>> {
    Json(state.engine.list_time_slots().await)
}

pub async fn create_reservation(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<CreateReservationRequest>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    let id = state.engine.create_reservation(&actor, req.time_slot_id).await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

pub async fn cancel_reservation(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
) -> ApiResult<Json<Value>> {
    state.engine.cancel_reservation(&actor, id).await?;
    Ok(Json(json!({ "message": "Reservation cancelled" })))
}

pub async fn check_in(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
) -> ApiResult<Json<Value>> {
    let status = state.engine.check_in(&actor, id).await?;
    Ok(Json(json!({ "message": "Checked in", "status": status })))
}

pub async fn check_out(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
) -> ApiResult<Json<Value>> {
    state.engine.check_out(&actor, id).await?;
    Ok(Json(json!({ "message": "Checked out" })))
}

pub async fn reservations_today(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> Json<Vec<ReservationInfo>> {
    Json(state.engine.reservations_today(&actor).await)
}

pub async fn my_reservations(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> Json<Vec<ReservationInfo>> {
    Json(state.engine.my_reservations(&actor).await)
}

pub async fn all_reservations(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Json<Vec<ReservationInfo>>> {
    Ok(Json(state.engine.all_reservations(&actor).await?))
}

pub async fn correct_expired(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Json<Value>> {
    if !actor.is_hr() {
        return Err(ApiError::forbidden("only HR may run the expiry correction"));
    }
    let corrected = state.engine.correct_expired().await?;
    Ok(Json(json!({ "corrected": corrected })))
}
