use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DbErr, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::payments::{CreateIntentRequest, IntentData},
    entity::{
        bookings::Entity as Bookings,
        courts::Entity as Courts,
        payments::{
            ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments,
            Model as PaymentModel,
        },
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{BookingStatus, Payment, PaymentStatus},
    response::{ApiResponse, Meta},
    state::AppState,
};

const GATEWAY_NAME: &str = "stripe";

/// Create the payment intent for a booking, or return the one that already
/// exists. At most one Payment row per booking; the amount and currency are
/// frozen from the court's price at intent-creation time.
pub async fn create_or_reuse_intent(
    state: &AppState,
    user: &AuthUser,
    payload: CreateIntentRequest,
) -> AppResult<ApiResponse<IntentData>> {
    let booking = Bookings::find_by_id(payload.booking_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if booking.user_id != user.user_id {
        return Err(AppError::Unauthorized);
    }

    // Idempotency: an existing usable intent is returned unchanged.
    if let Some(existing) = Payments::find()
        .filter(PaymentCol::BookingId.eq(booking.id))
        .one(&state.orm)
        .await?
    {
        if !existing.provider_intent_id.is_empty() {
            return Ok(ApiResponse::success(
                "Existing intent",
                intent_data(existing, None),
                Some(Meta::empty()),
            ));
        }
    }

    if booking.status != BookingStatus::Pending {
        return Err(AppError::InvalidArgument(
            "booking is not awaiting payment".into(),
        ));
    }

    let court = Courts::find_by_id(booking.court_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let amount = charge_amount(
        court.price_per_hour,
        booking.start_time.with_timezone(&Utc),
        booking.end_time.with_timezone(&Utc),
    );

    // Gateway failure surfaces here; the booking stays PENDING so the caller
    // can retry.
    let intent = state
        .gateway
        .create_intent(amount, &court.currency, booking.id)
        .await?;

    let now = Utc::now();
    let row = PaymentActive {
        id: Set(Uuid::new_v4()),
        booking_id: Set(booking.id),
        amount: Set(amount),
        currency: Set(court.currency.clone()),
        status: Set(PaymentStatus::Pending),
        gateway: Set(GATEWAY_NAME.to_string()),
        provider_intent_id: Set(intent.intent_id.clone()),
        provider_charge_id: Set(None),
        payment_method: Set(None),
        receipt_url: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };

    // Upsert keyed on booking_id: a concurrent duplicate converges on the row
    // that won instead of erroring.
    let payment = match Payments::insert(row)
        .on_conflict(
            OnConflict::column(PaymentCol::BookingId)
                .do_nothing()
                .to_owned(),
        )
        .exec_with_returning(&state.orm)
        .await
    {
        Ok(model) => model,
        Err(DbErr::RecordNotInserted) => Payments::find()
            .filter(PaymentCol::BookingId.eq(booking.id))
            .one(&state.orm)
            .await?
            .ok_or(AppError::NotFound)?,
        Err(err) => return Err(err.into()),
    };

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "payment_intent_created",
        Some("payments"),
        Some(serde_json::json!({
            "booking_id": booking.id,
            "intent": payment.provider_intent_id,
            "amount": payment.amount,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Intent created",
        intent_data(payment, intent.client_secret),
        Some(Meta::empty()),
    ))
}

/// Charge for the booked duration at the court's hourly price, billing
/// fractional hours proportionally. Integer minor-currency units.
pub fn charge_amount(
    price_per_hour: i64,
    start: chrono::DateTime<Utc>,
    end: chrono::DateTime<Utc>,
) -> i64 {
    let seconds = (end - start).num_seconds().max(0);
    price_per_hour * seconds / 3600
}

fn intent_data(payment: PaymentModel, client_secret: Option<String>) -> IntentData {
    IntentData {
        payment_id: payment.id,
        booking_id: payment.booking_id,
        provider_intent_id: payment.provider_intent_id,
        client_secret,
        amount: payment.amount,
        currency: payment.currency,
        status: payment.status,
    }
}

pub(crate) fn payment_from_entity(model: PaymentModel) -> Payment {
    Payment {
        id: model.id,
        booking_id: model.booking_id,
        amount: model.amount,
        currency: model.currency,
        status: model.status,
        gateway: model.gateway,
        provider_intent_id: model.provider_intent_id,
        provider_charge_id: model.provider_charge_id,
        payment_method: model.payment_method,
        receipt_url: model.receipt_url,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn whole_hours_bill_at_hourly_price() {
        let start = Utc.with_ymd_and_hms(2030, 6, 15, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2030, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(charge_amount(500, start, end), 1000);
    }

    #[test]
    fn fractional_hours_bill_proportionally() {
        let start = Utc.with_ymd_and_hms(2030, 6, 15, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2030, 6, 15, 11, 30, 0).unwrap();
        assert_eq!(charge_amount(600, start, end), 900);
    }

    #[test]
    fn inverted_range_bills_zero() {
        let start = Utc.with_ymd_and_hms(2030, 6, 15, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2030, 6, 15, 10, 0, 0).unwrap();
        assert_eq!(charge_amount(500, start, end), 0);
    }
}
