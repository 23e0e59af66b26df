use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::payments::{CreateIntentRequest, IntentData},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(create_intent))
}

#[utoipa::path(
    post,
    path = "/payments",
    request_body = CreateIntentRequest,
    responses(
        (status = 200, description = "Intent created or reused", body = ApiResponse<IntentData>),
        (status = 404, description = "Booking not found"),
        (status = 502, description = "Gateway failure, booking stays PENDING"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_intent(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateIntentRequest>,
) -> AppResult<Json<ApiResponse<IntentData>>> {
    let resp = payment_service::create_or_reuse_intent(&state, &user, payload).await?;
    Ok(Json(resp))
}
