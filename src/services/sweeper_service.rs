use chrono::{Duration, Utc};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};

use crate::{
    dto::bookings::BookingList,
    entity::bookings::{Column as BookingCol, Entity as Bookings},
    error::AppResult,
    models::{Booking, BookingStatus},
    response::{ApiResponse, Meta},
    services::booking_service::{booking_from_entity, release_slot},
    state::AppState,
};

fn stale_condition(grace_minutes: i64) -> Condition {
    let cutoff = Utc::now() - Duration::minutes(grace_minutes);
    Condition::all()
        .add(BookingCol::Status.eq(BookingStatus::Pending))
        .add(BookingCol::CreatedAt.lt(cutoff))
}

/// Cancel PENDING bookings that outlived the grace window without completing
/// payment. The backstop for abandoned checkouts that never produced a
/// webhook. No refunds (nothing was paid) and no per-row notifications.
pub async fn sweep_stale_pending(state: &AppState) -> AppResult<u64> {
    let grace = state.config.sweep_grace_minutes;
    let txn = state.orm.begin().await?;

    let stale = Bookings::find()
        .filter(stale_condition(grace))
        .lock(LockType::Update)
        .all(&txn)
        .await?;

    if stale.is_empty() {
        txn.commit().await?;
        return Ok(0);
    }

    let ids: Vec<_> = stale.iter().map(|b| b.id).collect();
    Bookings::update_many()
        .col_expr(BookingCol::Status, Expr::value(BookingStatus::Cancelled))
        .col_expr(BookingCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(BookingCol::Id.is_in(ids.clone()))
        .exec(&txn)
        .await?;

    for booking in &stale {
        release_slot(&txn, booking.court_id, booking.start_time).await?;
    }

    txn.commit().await?;

    tracing::info!(count = stale.len(), grace_minutes = grace, "swept stale pending bookings");
    Ok(stale.len() as u64)
}

/// Read-only companion: what the next sweep would cancel.
pub async fn list_sweep_eligible(state: &AppState) -> AppResult<ApiResponse<BookingList>> {
    let grace = state.config.sweep_grace_minutes;
    let items: Vec<Booking> = Bookings::find()
        .filter(stale_condition(grace))
        .order_by_asc(BookingCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(booking_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Sweep eligible",
        BookingList { items },
        Some(Meta::empty()),
    ))
}

/// Background task: run the sweep on a fixed interval.
pub async fn run_sweeper(state: AppState) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
    loop {
        interval.tick().await;
        match sweep_stale_pending(&state).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "sweeper cancelled stale bookings"),
            Err(err) => tracing::warn!(error = %err, "sweep failed"),
        }
    }
}
