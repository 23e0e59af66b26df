use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::bookings::BookingList,
    error::AppResult,
    middleware::auth::{AuthUser, ensure_admin},
    response::{ApiResponse, Meta},
    services::sweeper_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sweep", post(trigger_sweep))
        .route("/sweep/eligible", get(list_sweep_eligible))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SweepResult {
    pub cancelled: u64,
}

#[utoipa::path(
    post,
    path = "/admin/sweep",
    responses(
        (status = 200, description = "Stale PENDING bookings cancelled", body = ApiResponse<SweepResult>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn trigger_sweep(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<SweepResult>>> {
    ensure_admin(&user)?;
    let cancelled = sweeper_service::sweep_stale_pending(&state).await?;
    Ok(Json(ApiResponse::success(
        "Sweep complete",
        SweepResult { cancelled },
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    get,
    path = "/admin/sweep/eligible",
    responses(
        (status = 200, description = "Bookings the next sweep would cancel", body = ApiResponse<BookingList>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_sweep_eligible(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<BookingList>>> {
    ensure_admin(&user)?;
    let resp = sweeper_service::list_sweep_eligible(&state).await?;
    Ok(Json(resp))
}
