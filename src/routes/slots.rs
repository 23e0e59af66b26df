use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    dto::slots::{SlotQuery, SlotWindowList},
    error::AppResult,
    response::ApiResponse,
    services::slot_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_slots))
}

#[utoipa::path(
    get,
    path = "/slots",
    params(
        ("court_id" = uuid::Uuid, Query, description = "Court ID"),
        ("date" = String, Query, description = "Calendar day, YYYY-MM-DD (UTC)")
    ),
    responses(
        (status = 200, description = "Hourly windows for the court-day", body = ApiResponse<SlotWindowList>),
        (status = 400, description = "Malformed date"),
        (status = 404, description = "Court not found"),
    ),
    tag = "Slots"
)]
pub async fn get_slots(
    State(state): State<AppState>,
    Query(query): Query<SlotQuery>,
) -> AppResult<Json<ApiResponse<SlotWindowList>>> {
    let resp = slot_service::get_slots(&state, query).await?;
    Ok(Json(resp))
}
