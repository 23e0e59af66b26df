use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::Stream;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use tokio::sync::broadcast;

use crate::{
    dto::notifications::NotificationList,
    entity::notifications::{Column as NotificationCol, Entity as Notifications},
    error::AppResult,
    middleware::auth::AuthUser,
    notify::notification_from_entity,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/stream", get(notification_stream))
}

#[utoipa::path(
    get,
    path = "/notifications",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "Caller's notifications, newest first", body = ApiResponse<NotificationList>),
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<NotificationList>>> {
    let (page, limit, offset) = pagination.normalize();

    let finder = Notifications::find()
        .filter(NotificationCol::UserId.eq(user.user_id))
        .order_by_desc(NotificationCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(notification_from_entity)
        .collect();

    Ok(Json(ApiResponse::success(
        "Ok",
        NotificationList { items },
        Some(Meta::new(page, limit, total)),
    )))
}

/// Push stream of the caller's notifications, fed by the reconciler and the
/// cancellation paths instead of a fixed-interval poll against the table.
#[utoipa::path(
    get,
    path = "/notifications/stream",
    responses(
        (status = 200, description = "Server-sent notification events"),
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn notification_stream(
    State(state): State<AppState>,
    user: AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.notify.subscribe(user.user_id);

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    let event = match Event::default()
                        .event("notification")
                        .json_data(&notification)
                    {
                        Ok(event) => event,
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to encode notification event");
                            continue;
                        }
                    };
                    return Some((Ok(event), rx));
                }
                // Fell behind; skip to the live edge.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
