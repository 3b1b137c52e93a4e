use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use ulid::Ulid;

use crate::model::{Role, User};

use super::{ApiError, ApiResult, AppState, Caller};

#[derive(Debug, Deserialize)]
pub struct UpsertUserRequest {
    pub name: String,
    pub role: Role,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

pub async fn me(State(state): State<AppState>, Caller(actor): Caller) -> ApiResult<Json<User>> {
    state
        .engine
        .get_user(&actor.user_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("user is not registered"))
}

pub async fn upsert(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
    Json(req): Json<UpsertUserRequest>,
) -> ApiResult<Json<User>> {
    if !actor.is_hr() {
        return Err(ApiError::forbidden("only HR may manage users"));
    }
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let user = User {
        id,
        name: req.name.trim().to_string(),
        role: req.role,
        active: req.active,
    };
    state.engine.upsert_user(user.clone()).await?;
    Ok(Json(user))
}

pub async fn set_active(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Ulid>,
    Json(req): Json<ActiveRequest>,
) -> ApiResult<Json<User>> {
    if !actor.is_hr() {
        return Err(ApiError::forbidden("only HR may manage users"));
    }
    Ok(Json(state.engine.set_user_active(id, req.active).await?))
}
