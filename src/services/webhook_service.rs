use chrono::Utc;
use hmac::{Hmac, Mac};
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QuerySelect, TransactionTrait,
};
use sha2::Sha256;

use crate::{
    audit::log_audit,
    dto::webhooks::{WebhookEvent, WebhookObject},
    entity::{
        bookings::{ActiveModel as BookingActive, Entity as Bookings},
        payments::{ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments},
    },
    error::{AppError, AppResult},
    models::{BookingStatus, NotificationKind, PaymentStatus},
    notify,
    response::ApiResponse,
    services::booking_service::{release_slot, venue_owner_of_court},
    state::AppState,
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "webhook-signature";

/// Signed events older (or newer) than this are rejected, bounding replay of
/// a captured delivery.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Verify a `t=<unix>,v1=<hex>` signature header against the raw body. The
/// signed payload is `"{t}.{body}"`; comparison is constant-time via the MAC
/// verify, and the timestamp must fall within [`SIGNATURE_TOLERANCE_SECS`] of
/// the server clock. An unverified event must never reach the dispatch below.
pub fn verify_signature(secret: &str, header: &str, body: &str) -> Result<(), AppError> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = Some(v),
            Some(("v1", v)) => signature = Some(v),
            _ => {}
        }
    }
    let (timestamp, signature) = match (timestamp, signature) {
        (Some(t), Some(s)) => (t, s),
        _ => return Err(AppError::SignatureInvalid),
    };

    let signed_at: i64 = timestamp.parse().map_err(|_| AppError::SignatureInvalid)?;
    let expected = hex::decode(signature).map_err(|_| AppError::SignatureInvalid)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::SignatureInvalid)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| AppError::SignatureInvalid)?;

    if (Utc::now().timestamp() - signed_at).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(AppError::SignatureInvalid);
    }
    Ok(())
}

/// Entry point for `POST /webhooks/payment`. Signature first, then dispatch
/// by event type. Unknown types and unknown intent refs are acknowledged so
/// the provider does not retry forever; duplicate deliveries are no-ops.
pub async fn handle_event(
    state: &AppState,
    signature: Option<&str>,
    body: &str,
) -> AppResult<ApiResponse<()>> {
    let header = signature.ok_or(AppError::SignatureInvalid);
    let verified = header.and_then(|h| verify_signature(&state.config.webhook_secret, h, body));
    if let Err(err) = verified {
        tracing::warn!("webhook rejected: invalid signature");
        if let Err(audit_err) = log_audit(
            &state.pool,
            None,
            "webhook_signature_invalid",
            Some("webhooks"),
            None,
        )
        .await
        {
            tracing::warn!(error = %audit_err, "audit log failed");
        }
        return Err(err);
    }

    let event: WebhookEvent = serde_json::from_str(body)
        .map_err(|e| AppError::InvalidArgument(format!("malformed event payload: {e}")))?;

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "webhook received");

    match event.event_type.as_str() {
        "payment_intent.succeeded" => apply_intent_succeeded(state, &event.data.object).await?,
        "payment_intent.payment_failed" => apply_intent_failed(state, &event.data.object).await?,
        "charge.refunded" => apply_charge_refunded(state, &event.data.object).await?,
        other => {
            // Unknown event types are acknowledged, not failed.
            tracing::debug!(event_type = %other, "ignoring webhook event type");
        }
    }

    Ok(ApiResponse::ack("Ok"))
}

async fn apply_intent_succeeded(state: &AppState, object: &WebhookObject) -> AppResult<()> {
    let intent_ref = object.intent_ref();
    let Some(payment) = find_payment(state, intent_ref).await? else {
        return Ok(());
    };

    if payment.status == PaymentStatus::Succeeded {
        tracing::info!(intent = %intent_ref, "duplicate succeeded event, no-op");
        return Ok(());
    }

    let txn = state.orm.begin().await?;

    // Lock the booking row before deciding the transition so a concurrent
    // owner update or sweep cannot slip between check and write.
    let booking = Bookings::find_by_id(payment.booking_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;

    let booking_id = payment.booking_id;
    let mut pay: PaymentActive = payment.into();
    pay.status = Set(PaymentStatus::Succeeded);
    if let Some(receipt) = &object.receipt_url {
        pay.receipt_url = Set(Some(receipt.clone()));
    }
    if let Some(charge) = &object.latest_charge {
        pay.provider_charge_id = Set(Some(charge.clone()));
    }
    pay.updated_at = Set(Utc::now().into());
    pay.update(&txn).await?;

    let mut confirmed = None;
    if let Some(booking) = booking {
        match booking.status {
            BookingStatus::Pending => {
                let mut active: BookingActive = booking.clone().into();
                active.status = Set(BookingStatus::Confirmed);
                active.updated_at = Set(Utc::now().into());
                let updated = active.update(&txn).await?;
                confirmed = Some(updated);
            }
            BookingStatus::Confirmed => {
                // Redelivered event after the transition already happened.
            }
            other => {
                // Money arrived for a booking that is no longer confirmable
                // (e.g. swept). Payment state is still recorded; flag it.
                tracing::error!(
                    booking_id = %booking.id,
                    intent = %intent_ref,
                    status = %other,
                    "succeeded payment for non-confirmable booking, manual reconciliation required"
                );
            }
        }
    }

    txn.commit().await?;

    if let Some(booking) = confirmed {
        notify::emit(
            state,
            booking.user_id,
            NotificationKind::BookingConfirmed,
            &format!("Your booking for {} is confirmed", booking.start_time),
        )
        .await;
        if let Ok(owner_id) = venue_owner_of_court(&state.orm, booking.court_id).await {
            notify::emit(
                state,
                owner_id,
                NotificationKind::BookingConfirmed,
                &format!("Booking for {} was paid and confirmed", booking.start_time),
            )
            .await;
        }
    }

    tracing::info!(intent = %intent_ref, booking_id = %booking_id, "payment succeeded");
    Ok(())
}

async fn apply_intent_failed(state: &AppState, object: &WebhookObject) -> AppResult<()> {
    let intent_ref = object.intent_ref();
    let Some(payment) = find_payment(state, intent_ref).await? else {
        return Ok(());
    };

    if payment.status == PaymentStatus::Failed {
        return Ok(());
    }

    let cancelled = mark_payment_and_cancel_booking(state, payment, PaymentStatus::Failed, object)
        .await?;

    if let Some(booking) = cancelled {
        notify::emit(
            state,
            booking.user_id,
            NotificationKind::PaymentFailed,
            &format!(
                "Payment failed; your booking for {} was cancelled",
                booking.start_time
            ),
        )
        .await;
    }

    tracing::info!(intent = %intent_ref, "payment failed");
    Ok(())
}

async fn apply_charge_refunded(state: &AppState, object: &WebhookObject) -> AppResult<()> {
    // Charges are correlated through their payment_intent field, keeping the
    // intent reference as the single correlation key.
    let intent_ref = object.intent_ref();
    let Some(payment) = find_payment(state, intent_ref).await? else {
        return Ok(());
    };

    if payment.status == PaymentStatus::Refunded {
        return Ok(());
    }

    let cancelled =
        mark_payment_and_cancel_booking(state, payment, PaymentStatus::Refunded, object).await?;

    if let Some(booking) = cancelled {
        notify::emit(
            state,
            booking.user_id,
            NotificationKind::PaymentRefunded,
            &format!(
                "Your payment was refunded and the booking for {} cancelled",
                booking.start_time
            ),
        )
        .await;
    }

    tracing::info!(intent = %intent_ref, "payment refunded");
    Ok(())
}

async fn find_payment(
    state: &AppState,
    intent_ref: &str,
) -> AppResult<Option<crate::entity::payments::Model>> {
    let payment = Payments::find()
        .filter(PaymentCol::ProviderIntentId.eq(intent_ref))
        .one(&state.orm)
        .await?;
    if payment.is_none() {
        tracing::warn!(intent = %intent_ref, "webhook for unknown payment intent, acknowledging");
    }
    Ok(payment)
}

/// Shared failure/refund path: payment to its terminal status and the linked
/// booking to CANCELLED (slot released) in one transaction. Returns the
/// cancelled booking, if any transition happened.
async fn mark_payment_and_cancel_booking(
    state: &AppState,
    payment: crate::entity::payments::Model,
    status: PaymentStatus,
    object: &WebhookObject,
) -> AppResult<Option<crate::entity::bookings::Model>> {
    let txn = state.orm.begin().await?;

    // Same locking discipline as the success path: the transition check must
    // see the row as it is inside this transaction.
    let booking = Bookings::find_by_id(payment.booking_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;

    let mut pay: PaymentActive = payment.into();
    pay.status = Set(status);
    if status == PaymentStatus::Refunded && object.payment_intent.is_some() {
        pay.provider_charge_id = Set(Some(object.id.clone()));
    }
    pay.updated_at = Set(Utc::now().into());
    pay.update(&txn).await?;

    let mut cancelled = None;
    if let Some(booking) = booking {
        if booking.status.can_transition(BookingStatus::Cancelled) {
            let (court_id, start_time) = (booking.court_id, booking.start_time);
            let mut active: BookingActive = booking.into();
            active.status = Set(BookingStatus::Cancelled);
            active.updated_at = Set(Utc::now().into());
            let updated = active.update(&txn).await?;
            release_slot(&txn, court_id, start_time).await?;
            cancelled = Some(updated);
        }
    }

    txn.commit().await?;
    Ok(cancelled)
}
