mod cafeteria;
mod error;
mod rooms;
mod users;

pub use error::{ApiError, ApiResult, ErrorBody, ErrorResponse};

use std::sync::Arc;

use axum::{
    Router,
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::auth::{IdentityProvider, Principal};
use crate::engine::Engine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub identity: Arc<dyn IdentityProvider>,
}

/// The authenticated principal of the current request. Rejects with 401.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Principal);

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state
            .identity
            .authenticate(&parts.headers)
            .await
            .map(Caller)
            .ok_or_else(ApiError::unauthorized)
    }
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(state: AppState) -> Router {
    let reservations = Router::new()
        .route("/", post(cafeteria::create_reservation))
        .route("/today", get(cafeteria::reservations_today))
        .route("/my-reservations", get(cafeteria::my_reservations))
        .route("/all", get(cafeteria::all_reservations))
        .route("/correct-expired", post(cafeteria::correct_expired))
        .route("/{id}/cancel", post(cafeteria::cancel_reservation))
        .route("/{id}/check-in", post(cafeteria::check_in))
        .route("/{id}/check-out", post(cafeteria::check_out));

    let rooms = Router::new()
        .route(
            "/",
            get(rooms::reservations_on).post(rooms::create_reservation),
        )
        .route("/available-slots", get(rooms::available_slots))
        .route("/check-availability", post(rooms::check_availability))
        .route("/my-reservations", get(rooms::my_reservations))
        .route("/all", get(rooms::all_reservations))
        .route(
            "/{id}",
            put(rooms::reschedule).delete(rooms::delete_reservation),
        )
        .route("/{id}/cancel", post(rooms::cancel_reservation))
        .route("/{id}/check-in", post(rooms::check_in))
        .route("/{id}/complete", post(rooms::complete));

    let users = Router::new()
        .route("/me", get(users::me))
        .route("/{id}", put(users::upsert))
        .route("/{id}/active", put(users::set_active));

    let api = Router::new()
        .route("/timeslots", get(cafeteria::time_slots))
        .nest("/reservations", reservations)
        .nest("/roomreservations", rooms)
        .nest("/users", users);

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
