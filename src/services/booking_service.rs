use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, PaginatorTrait, SqlErr, TransactionTrait,
};
use sea_orm::sea_query::LockType;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::bookings::{BookingList, BookingWithPayment, CreateBookingRequest, UpdateBookingStatusRequest},
    entity::{
        bookings::{
            ActiveModel as BookingActive, Column as BookingCol, Entity as Bookings,
            Model as BookingModel,
        },
        courts::{Column as CourtCol, Entity as Courts},
        payments::{ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments},
        slots::{Column as SlotCol, Entity as Slots},
        venues::Entity as Venues,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Booking, BookingStatus, NotificationKind, PaymentStatus},
    notify,
    response::{ApiResponse, Meta},
    routes::params::{BookingListQuery, SortOrder},
    state::AppState,
};

/// Create a PENDING booking. The no-double-booking invariant is enforced by
/// the partial unique index on (court_id, start_time) for active bookings, so
/// two concurrent requests for the same slot race at the storage layer and
/// exactly one insert wins.
pub async fn create_booking(
    state: &AppState,
    user: &AuthUser,
    payload: CreateBookingRequest,
) -> AppResult<ApiResponse<Booking>> {
    if payload.start_time >= payload.end_time {
        return Err(AppError::InvalidArgument(
            "start_time must be before end_time".into(),
        ));
    }

    let court = Courts::find_by_id(payload.court_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let txn = state.orm.begin().await?;

    let now = Utc::now();
    let row = BookingActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        court_id: Set(court.id),
        start_time: Set(payload.start_time.into()),
        end_time: Set(payload.end_time.into()),
        status: Set(BookingStatus::Pending),
        note: Set(payload.note),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };

    let booking = match row.insert(&txn).await {
        Ok(b) => b,
        Err(err) => {
            if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                return Err(AppError::AlreadyBooked);
            }
            return Err(err.into());
        }
    };

    // Keep the owner-materialized slot in step with the ledger.
    Slots::update_many()
        .col_expr(SlotCol::IsBooked, Expr::value(true))
        .filter(SlotCol::CourtId.eq(court.id))
        .filter(SlotCol::StartTime.eq(booking.start_time))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "booking_created",
        Some("bookings"),
        Some(serde_json::json!({ "booking_id": booking.id, "court_id": court.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Booking created",
        booking_from_entity(booking),
        Some(Meta::empty()),
    ))
}

pub async fn list_bookings(
    state: &AppState,
    user: &AuthUser,
    query: BookingListQuery,
) -> AppResult<ApiResponse<BookingList>> {
    let (page, limit, offset) = query.normalize();
    let mut condition = Condition::all().add(BookingCol::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(BookingCol::Status.eq(status));
    }

    let mut finder = Bookings::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(BookingCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(BookingCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let bookings = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(booking_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        BookingList { items: bookings },
        Some(meta),
    ))
}

pub async fn get_booking(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<BookingWithPayment>> {
    let booking = Bookings::find()
        .filter(
            Condition::all()
                .add(BookingCol::Id.eq(id))
                .add(BookingCol::UserId.eq(user.user_id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let payment = Payments::find()
        .filter(PaymentCol::BookingId.eq(booking.id))
        .one(&state.orm)
        .await?
        .map(crate::services::payment_service::payment_from_entity);

    Ok(ApiResponse::success(
        "Ok",
        BookingWithPayment {
            booking: booking_from_entity(booking),
            payment,
        },
        Some(Meta::empty()),
    ))
}

/// User-initiated cancellation. Only the booking's own user may cancel, and
/// only out of a non-terminal status. The venue owner is notified.
pub async fn cancel_booking(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Booking>> {
    let txn = state.orm.begin().await?;

    let booking = Bookings::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if booking.user_id != user.user_id {
        return Err(AppError::Unauthorized);
    }

    booking.status.ensure_transition(BookingStatus::Cancelled)?;

    let (court_id, start_time) = (booking.court_id, booking.start_time);
    let mut active: BookingActive = booking.into();
    active.status = Set(BookingStatus::Cancelled);
    active.updated_at = Set(Utc::now().into());
    let booking = active.update(&txn).await?;

    release_slot(&txn, court_id, start_time).await?;

    txn.commit().await?;

    if let Ok(owner_id) = venue_owner_of_court(&state.orm, court_id).await {
        notify::emit(
            state,
            owner_id,
            NotificationKind::BookingCancelled,
            &format!("Booking for {} was cancelled by the player", booking.start_time),
        )
        .await;
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "booking_cancelled",
        Some("bookings"),
        Some(serde_json::json!({ "booking_id": booking.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Booking cancelled",
        booking_from_entity(booking),
        Some(Meta::empty()),
    ))
}

/// Owner-initiated status update. Only the owner of the booking's court's
/// venue may change status. Cancelling a booking with a SUCCEEDED payment
/// refunds through the gateway first; if the refund call fails the error
/// surfaces and nothing is changed.
pub async fn update_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateBookingStatusRequest,
) -> AppResult<ApiResponse<Booking>> {
    let booking = Bookings::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let owner_id = venue_owner_of_court(&state.orm, booking.court_id).await?;
    if owner_id != user.user_id {
        return Err(AppError::Unauthorized);
    }

    let next = payload.status;
    booking.status.ensure_transition(next)?;

    // A booking completes only once its window is over.
    if next == BookingStatus::Completed && booking.end_time.with_timezone(&Utc) > Utc::now() {
        return Err(AppError::InvalidArgument(
            "booking window has not ended yet".into(),
        ));
    }

    let payment = Payments::find()
        .filter(PaymentCol::BookingId.eq(booking.id))
        .one(&state.orm)
        .await?;

    // Refund before any local mutation so money is never silently lost. A
    // crash after the provider call but before commit leaves a payment the
    // provider has refunded but we still show SUCCEEDED; that case is logged
    // for manual reconciliation.
    let refunded = match (&payment, next) {
        (Some(p), BookingStatus::Cancelled) if p.status == PaymentStatus::Succeeded => {
            let refund_ref = state.gateway.refund(&p.provider_intent_id).await?;
            tracing::info!(
                booking_id = %booking.id,
                intent = %p.provider_intent_id,
                refund = %refund_ref,
                "gateway refund initiated"
            );
            true
        }
        _ => false,
    };

    let txn = state.orm.begin().await?;

    // Re-read under a row lock: the pre-transaction snapshot may be stale if
    // a webhook or the sweeper moved the booking in the meantime.
    let booking = Bookings::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    if let Err(err) = booking.status.ensure_transition(next) {
        if refunded {
            tracing::error!(
                booking_id = %booking.id,
                "refund issued but booking moved concurrently, manual reconciliation required"
            );
        }
        return Err(err);
    }

    let (court_id, start_time) = (booking.court_id, booking.start_time);
    let mut active: BookingActive = booking.into();
    active.status = Set(next);
    active.updated_at = Set(Utc::now().into());
    let booking = active.update(&txn).await?;

    if refunded {
        if let Some(p) = payment {
            let mut pay: PaymentActive = p.into();
            pay.status = Set(PaymentStatus::Refunded);
            pay.updated_at = Set(Utc::now().into());
            pay.update(&txn).await?;
        }
    }

    if next == BookingStatus::Cancelled {
        release_slot(&txn, court_id, start_time).await?;
    }

    txn.commit().await?;

    match next {
        BookingStatus::Confirmed => {
            notify::emit(
                state,
                booking.user_id,
                NotificationKind::BookingConfirmed,
                &format!("Your booking for {} was confirmed", booking.start_time),
            )
            .await;
        }
        BookingStatus::Cancelled => {
            notify::emit(
                state,
                booking.user_id,
                NotificationKind::BookingCancelled,
                &format!("Your booking for {} was cancelled by the venue", booking.start_time),
            )
            .await;
        }
        _ => {}
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "booking_status_update",
        Some("bookings"),
        Some(serde_json::json!({ "booking_id": booking.id, "status": booking.status })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Booking updated",
        booking_from_entity(booking),
        Some(Meta::empty()),
    ))
}

/// Resolve court -> venue -> owner.
pub(crate) async fn venue_owner_of_court<C: ConnectionTrait>(
    conn: &C,
    court_id: Uuid,
) -> AppResult<Uuid> {
    let court = Courts::find()
        .filter(CourtCol::Id.eq(court_id))
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)?;
    let venue = Venues::find_by_id(court.venue_id)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(venue.owner_id)
}

/// Clear is_booked on the materialized slot matching a cancelled booking.
pub(crate) async fn release_slot<C: ConnectionTrait>(
    conn: &C,
    court_id: Uuid,
    start_time: sea_orm::prelude::DateTimeWithTimeZone,
) -> AppResult<()> {
    Slots::update_many()
        .col_expr(SlotCol::IsBooked, Expr::value(false))
        .filter(SlotCol::CourtId.eq(court_id))
        .filter(SlotCol::StartTime.eq(start_time))
        .exec(conn)
        .await?;
    Ok(())
}

pub(crate) fn booking_from_entity(model: BookingModel) -> Booking {
    Booking {
        id: model.id,
        user_id: model.user_id,
        court_id: model.court_id,
        start_time: model.start_time.with_timezone(&Utc),
        end_time: model.end_time.with_timezone(&Utc),
        status: model.status,
        note: model.note,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}
