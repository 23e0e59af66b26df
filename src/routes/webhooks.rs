use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::post,
};

use crate::{
    error::AppResult,
    response::ApiResponse,
    services::webhook_service::{self, SIGNATURE_HEADER},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/payment", post(payment_webhook))
}

// Provider-facing: signed raw body, no bearer auth.
#[utoipa::path(
    post,
    path = "/webhooks/payment",
    responses(
        (status = 200, description = "Event processed or acknowledged"),
        (status = 401, description = "Signature verification failed"),
        (status = 400, description = "Malformed event payload"),
    ),
    tag = "Webhooks"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<Json<ApiResponse<()>>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let resp = webhook_service::handle_event(&state, signature, &body).await?;
    Ok(Json(resp))
}
