use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod bookings;
pub mod doc;
pub mod health;
pub mod notifications;
pub mod params;
pub mod payments;
pub mod slots;
pub mod webhooks;

// Build the API router without binding state; it is provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/slots", slots::router())
        .nest("/bookings", bookings::router())
        .nest("/payments", payments::router())
        .nest("/webhooks", webhooks::router())
        .nest("/notifications", notifications::router())
        .nest("/admin", admin::router())
}
