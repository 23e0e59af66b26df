use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use sha2::Sha256;
use uuid::Uuid;

use court_booking_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        bookings::{CreateBookingRequest, UpdateBookingStatusRequest},
        payments::CreateIntentRequest,
        slots::SlotQuery,
    },
    entity::{
        bookings::{
            ActiveModel as BookingActive, Column as BookingCol, Entity as Bookings,
        },
        courts::ActiveModel as CourtActive,
        payments::{Column as PaymentCol, Entity as Payments},
        slots::{ActiveModel as SlotActive, Column as SlotCol, Entity as Slots},
        users::ActiveModel as UserActive,
        venues::ActiveModel as VenueActive,
    },
    error::AppError,
    gateway::{CreatedIntent, PaymentGateway},
    middleware::auth::AuthUser,
    models::{BookingStatus, PaymentStatus, WindowStatus},
    notify::NotificationHub,
    services::{booking_service, payment_service, slot_service, sweeper_service, webhook_service},
    state::AppState,
};

const WEBHOOK_SECRET: &str = "whsec_test";

struct MockGateway {
    created: AtomicUsize,
    refunds: AtomicUsize,
    fail_refund: AtomicBool,
}

impl MockGateway {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            created: AtomicUsize::new(0),
            refunds: AtomicUsize::new(0),
            fail_refund: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_intent(
        &self,
        _amount: i64,
        _currency: &str,
        booking_id: Uuid,
    ) -> Result<CreatedIntent, AppError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(CreatedIntent {
            intent_id: format!("pi_test_{n}_{booking_id}"),
            client_secret: Some("cs_test".into()),
        })
    }

    async fn refund(&self, _provider_intent_id: &str) -> Result<String, AppError> {
        if self.fail_refund.load(Ordering::SeqCst) {
            return Err(AppError::PaymentGateway("simulated refund outage".into()));
        }
        let n = self.refunds.fetch_add(1, Ordering::SeqCst);
        Ok(format!("re_test_{n}"))
    }
}

// Skips when no database is configured, like the rest of the integration suite.
async fn setup_state(gateway: Arc<dyn PaymentGateway>) -> anyhow::Result<Option<AppState>> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(None);
            }
        };

    let pool = create_pool(&database_url).await?;
    run_migrations(&pool).await?;
    let orm = create_orm_conn(&database_url).await?;

    let config = AppConfig {
        database_url,
        host: "127.0.0.1".into(),
        port: 0,
        webhook_secret: WEBHOOK_SECRET.into(),
        gateway_url: "http://gateway.invalid".into(),
        gateway_key: "sk_test".into(),
        sweep_grace_minutes: 15,
    };

    Ok(Some(AppState {
        pool,
        orm,
        config,
        gateway,
        notify: Arc::new(NotificationHub::new()),
    }))
}

async fn create_user(state: &AppState, role: &str) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    UserActive {
        id: Set(id),
        email: Set(format!("{role}-{id}@example.com")),
        role: Set(role.into()),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(id)
}

/// Owner -> venue -> court open 9..17 at 500/hour.
async fn seed_court(state: &AppState, owner_id: Uuid) -> anyhow::Result<Uuid> {
    let venue_id = Uuid::new_v4();
    VenueActive {
        id: Set(venue_id),
        owner_id: Set(owner_id),
        name: Set("Test Venue".into()),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    let court_id = Uuid::new_v4();
    CourtActive {
        id: Set(court_id),
        venue_id: Set(venue_id),
        name: Set("Court 1".into()),
        open_hour: Set(9),
        close_hour: Set(17),
        price_per_hour: Set(500),
        currency: Set("USD".into()),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    Ok(court_id)
}

async fn seed_slot(
    state: &AppState,
    court_id: Uuid,
    start: DateTime<Utc>,
    price: i64,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    SlotActive {
        id: Set(id),
        court_id: Set(court_id),
        start_time: Set(start.into()),
        end_time: Set((start + Duration::hours(1)).into()),
        price: Set(price),
        is_booked: Set(false),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(id)
}

fn signed_header(body: &str) -> String {
    let timestamp = Utc::now().timestamp().to_string();
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

fn day_hour(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 15, hour, 0, 0).unwrap()
}

// End-to-end: calendar -> booking -> intent -> webhook confirmation ->
// owner cancellation with refund.
#[tokio::test]
async fn booking_payment_reconciliation_flow() -> anyhow::Result<()> {
    let gateway = MockGateway::new();
    let Some(state) = setup_state(gateway.clone()).await? else {
        return Ok(());
    };

    let owner_id = create_user(&state, "owner").await?;
    let player_id = create_user(&state, "player").await?;
    let court_id = seed_court(&state, owner_id).await?;
    seed_slot(&state, court_id, day_hour(10), 500).await?;

    let player = AuthUser {
        user_id: player_id,
        role: "player".into(),
    };
    let owner = AuthUser {
        user_id: owner_id,
        role: "owner".into(),
    };

    // Calendar: the materialized 10:00 hour is AVAILABLE, everything else
    // inside opening hours is NOT_CREATED.
    let grid = slot_service::get_slots(
        &state,
        SlotQuery {
            court_id,
            date: "2030-06-15".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(grid.items.len(), 8);
    for window in &grid.items {
        if window.start_time == day_hour(10) {
            assert_eq!(window.status, WindowStatus::Available);
            assert_eq!(window.price, Some(500));
        } else {
            assert_eq!(window.status, WindowStatus::NotCreated);
        }
    }

    // Book 10:00-11:00.
    let booking = booking_service::create_booking(
        &state,
        &player,
        CreateBookingRequest {
            court_id,
            start_time: day_hour(10),
            end_time: day_hour(11),
            note: Some("after work".into()),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);

    // The calendar now reports the hour as taken.
    let grid = slot_service::get_slots(
        &state,
        SlotQuery {
            court_id,
            date: "2030-06-15".into(),
        },
    )
    .await?
    .data
    .unwrap();
    let at_ten = grid
        .items
        .iter()
        .find(|w| w.start_time == day_hour(10))
        .unwrap();
    assert_eq!(at_ten.status, WindowStatus::Booked);

    // Intent creation is idempotent: same ref twice, one payment row.
    let first = payment_service::create_or_reuse_intent(
        &state,
        &player,
        CreateIntentRequest {
            booking_id: booking.id,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(first.amount, 500);
    assert_eq!(first.status, PaymentStatus::Pending);

    let second = payment_service::create_or_reuse_intent(
        &state,
        &player,
        CreateIntentRequest {
            booking_id: booking.id,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(first.provider_intent_id, second.provider_intent_id);

    let payment_rows = Payments::find()
        .filter(PaymentCol::BookingId.eq(booking.id))
        .count(&state.orm)
        .await?;
    assert_eq!(payment_rows, 1);

    // Provider reports success; booking confirms and the player is notified.
    let mut player_rx = state.notify.subscribe(player_id);
    let body = serde_json::json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": first.provider_intent_id,
            "latest_charge": "ch_test_1",
            "receipt_url": "https://receipts.example/1",
            "metadata": { "booking_id": booking.id },
        }},
    })
    .to_string();
    let sig = signed_header(&body);
    webhook_service::handle_event(&state, Some(sig.as_str()), &body).await?;

    let confirmed = Bookings::find_by_id(booking.id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert!(player_rx.recv().await.is_ok());

    // Duplicate delivery: acknowledged, still CONFIRMED, payment untouched.
    webhook_service::handle_event(&state, Some(sig.as_str()), &body).await?;
    let still = Bookings::find_by_id(booking.id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(still.status, BookingStatus::Confirmed);

    let payment = Payments::find()
        .filter(PaymentCol::BookingId.eq(booking.id))
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    assert_eq!(payment.provider_charge_id.as_deref(), Some("ch_test_1"));

    // A tampered signature changes nothing.
    let err = webhook_service::handle_event(&state, Some("t=1,v1=deadbeef"), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SignatureInvalid));

    // Owner cancels while the refund endpoint is down: error surfaces and
    // neither booking nor payment moves.
    gateway.fail_refund.store(true, Ordering::SeqCst);
    let err = booking_service::update_status(
        &state,
        &owner,
        booking.id,
        UpdateBookingStatusRequest {
            status: BookingStatus::Cancelled,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::PaymentGateway(_)));

    let unchanged = Bookings::find_by_id(booking.id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(unchanged.status, BookingStatus::Confirmed);
    let unchanged_payment = Payments::find()
        .filter(PaymentCol::BookingId.eq(booking.id))
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(unchanged_payment.status, PaymentStatus::Succeeded);

    // Refund endpoint back: cancellation refunds then cancels.
    gateway.fail_refund.store(false, Ordering::SeqCst);
    let cancelled = booking_service::update_status(
        &state,
        &owner,
        booking.id,
        UpdateBookingStatusRequest {
            status: BookingStatus::Cancelled,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(gateway.refunds.load(Ordering::SeqCst), 1);

    let refunded = Payments::find()
        .filter(PaymentCol::BookingId.eq(booking.id))
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);

    // The slot is bookable again.
    let slot = Slots::find()
        .filter(SlotCol::CourtId.eq(court_id))
        .filter(SlotCol::StartTime.eq(day_hour(10)))
        .one(&state.orm)
        .await?
        .unwrap();
    assert!(!slot.is_booked);

    // Terminal: no further owner transition is accepted.
    let err = booking_service::update_status(
        &state,
        &owner,
        booking.id,
        UpdateBookingStatusRequest {
            status: BookingStatus::Completed,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    Ok(())
}

#[tokio::test]
async fn concurrent_creation_yields_single_winner() -> anyhow::Result<()> {
    let gateway = MockGateway::new();
    let Some(state) = setup_state(gateway).await? else {
        return Ok(());
    };

    let owner_id = create_user(&state, "owner").await?;
    let court_id = seed_court(&state, owner_id).await?;

    let mut players = Vec::new();
    for _ in 0..4 {
        let id = create_user(&state, "player").await?;
        players.push(AuthUser {
            user_id: id,
            role: "player".into(),
        });
    }

    let attempts = players.iter().map(|player| {
        booking_service::create_booking(
            &state,
            player,
            CreateBookingRequest {
                court_id,
                start_time: day_hour(14),
                end_time: day_hour(15),
                note: None,
            },
        )
    });
    let results = futures::future::join_all(attempts).await;

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::AlreadyBooked)))
        .count();
    assert_eq!(successes, 1, "exactly one booking attempt must win");
    assert_eq!(conflicts, 3);

    let active = Bookings::find()
        .filter(BookingCol::CourtId.eq(court_id))
        .filter(BookingCol::StartTime.eq(day_hour(14)))
        .count(&state.orm)
        .await?;
    assert_eq!(active, 1);

    Ok(())
}

#[tokio::test]
async fn user_cancel_notifies_owner_and_frees_slot() -> anyhow::Result<()> {
    let gateway = MockGateway::new();
    let Some(state) = setup_state(gateway).await? else {
        return Ok(());
    };

    let owner_id = create_user(&state, "owner").await?;
    let player_id = create_user(&state, "player").await?;
    let court_id = seed_court(&state, owner_id).await?;
    seed_slot(&state, court_id, day_hour(12), 500).await?;

    let player = AuthUser {
        user_id: player_id,
        role: "player".into(),
    };
    let stranger = AuthUser {
        user_id: create_user(&state, "player").await?,
        role: "player".into(),
    };

    let booking = booking_service::create_booking(
        &state,
        &player,
        CreateBookingRequest {
            court_id,
            start_time: day_hour(12),
            end_time: day_hour(13),
            note: None,
        },
    )
    .await?
    .data
    .unwrap();

    // Someone else's booking cannot be cancelled.
    let err = booking_service::cancel_booking(&state, &stranger, booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));

    let mut owner_rx = state.notify.subscribe(owner_id);
    let cancelled = booking_service::cancel_booking(&state, &player, booking.id)
        .await?
        .data
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert!(owner_rx.recv().await.is_ok());

    let slot = Slots::find()
        .filter(SlotCol::CourtId.eq(court_id))
        .filter(SlotCol::StartTime.eq(day_hour(12)))
        .one(&state.orm)
        .await?
        .unwrap();
    assert!(!slot.is_booked);

    // Cancelling twice hits the terminal-state guard.
    let err = booking_service::cancel_booking(&state, &player, booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    Ok(())
}

// payment_intent.payment_failed: payment FAILED, booking CANCELLED, slot
// released, player notified; redelivery is a no-op.
#[tokio::test]
async fn failed_payment_webhook_cancels_booking_and_frees_slot() -> anyhow::Result<()> {
    let gateway = MockGateway::new();
    let Some(state) = setup_state(gateway).await? else {
        return Ok(());
    };

    let owner_id = create_user(&state, "owner").await?;
    let player_id = create_user(&state, "player").await?;
    let court_id = seed_court(&state, owner_id).await?;
    seed_slot(&state, court_id, day_hour(11), 500).await?;

    let player = AuthUser {
        user_id: player_id,
        role: "player".into(),
    };

    let booking = booking_service::create_booking(
        &state,
        &player,
        CreateBookingRequest {
            court_id,
            start_time: day_hour(11),
            end_time: day_hour(12),
            note: None,
        },
    )
    .await?
    .data
    .unwrap();

    let intent = payment_service::create_or_reuse_intent(
        &state,
        &player,
        CreateIntentRequest {
            booking_id: booking.id,
        },
    )
    .await?
    .data
    .unwrap();

    let mut player_rx = state.notify.subscribe(player_id);
    let body = serde_json::json!({
        "id": "evt_fail_1",
        "type": "payment_intent.payment_failed",
        "data": { "object": { "id": intent.provider_intent_id } },
    })
    .to_string();
    let sig = signed_header(&body);
    webhook_service::handle_event(&state, Some(sig.as_str()), &body).await?;

    let payment = Payments::find()
        .filter(PaymentCol::BookingId.eq(booking.id))
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);

    let after = Bookings::find_by_id(booking.id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(after.status, BookingStatus::Cancelled);

    let slot = Slots::find()
        .filter(SlotCol::CourtId.eq(court_id))
        .filter(SlotCol::StartTime.eq(day_hour(11)))
        .one(&state.orm)
        .await?
        .unwrap();
    assert!(!slot.is_booked);
    assert!(player_rx.recv().await.is_ok());

    // Redelivery: acknowledged, nothing moves.
    webhook_service::handle_event(&state, Some(sig.as_str()), &body).await?;
    let payment = Payments::find()
        .filter(PaymentCol::BookingId.eq(booking.id))
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);

    Ok(())
}

// charge.refunded carries a charge object; the payment row is resolved
// through the charge's payment_intent field, not the charge id.
#[tokio::test]
async fn refunded_charge_webhook_resolves_payment_through_intent() -> anyhow::Result<()> {
    let gateway = MockGateway::new();
    let Some(state) = setup_state(gateway).await? else {
        return Ok(());
    };

    let owner_id = create_user(&state, "owner").await?;
    let player_id = create_user(&state, "player").await?;
    let court_id = seed_court(&state, owner_id).await?;
    seed_slot(&state, court_id, day_hour(13), 500).await?;

    let player = AuthUser {
        user_id: player_id,
        role: "player".into(),
    };

    let booking = booking_service::create_booking(
        &state,
        &player,
        CreateBookingRequest {
            court_id,
            start_time: day_hour(13),
            end_time: day_hour(14),
            note: None,
        },
    )
    .await?
    .data
    .unwrap();

    let intent = payment_service::create_or_reuse_intent(
        &state,
        &player,
        CreateIntentRequest {
            booking_id: booking.id,
        },
    )
    .await?
    .data
    .unwrap();

    let succeeded = serde_json::json!({
        "id": "evt_ok_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent.provider_intent_id } },
    })
    .to_string();
    let sig = signed_header(&succeeded);
    webhook_service::handle_event(&state, Some(sig.as_str()), &succeeded).await?;

    // Provider-side refund: object id is the charge, intent in payment_intent.
    let mut player_rx = state.notify.subscribe(player_id);
    let refunded = serde_json::json!({
        "id": "evt_refund_1",
        "type": "charge.refunded",
        "data": { "object": {
            "id": "ch_refund_1",
            "payment_intent": intent.provider_intent_id,
        }},
    })
    .to_string();
    let sig = signed_header(&refunded);
    webhook_service::handle_event(&state, Some(sig.as_str()), &refunded).await?;

    let payment = Payments::find()
        .filter(PaymentCol::BookingId.eq(booking.id))
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.provider_charge_id.as_deref(), Some("ch_refund_1"));

    let after = Bookings::find_by_id(booking.id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(after.status, BookingStatus::Cancelled);

    let slot = Slots::find()
        .filter(SlotCol::CourtId.eq(court_id))
        .filter(SlotCol::StartTime.eq(day_hour(13)))
        .one(&state.orm)
        .await?
        .unwrap();
    assert!(!slot.is_booked);
    assert!(player_rx.recv().await.is_ok());

    Ok(())
}

// CONFIRMED -> COMPLETED is accepted only once the booked window is over.
#[tokio::test]
async fn completion_requires_elapsed_window() -> anyhow::Result<()> {
    let gateway = MockGateway::new();
    let Some(state) = setup_state(gateway).await? else {
        return Ok(());
    };

    let owner_id = create_user(&state, "owner").await?;
    let player_id = create_user(&state, "player").await?;
    let court_id = seed_court(&state, owner_id).await?;

    let owner = AuthUser {
        user_id: owner_id,
        role: "owner".into(),
    };
    let player = AuthUser {
        user_id: player_id,
        role: "player".into(),
    };

    let booking = booking_service::create_booking(
        &state,
        &player,
        CreateBookingRequest {
            court_id,
            start_time: day_hour(16),
            end_time: day_hour(17),
            note: None,
        },
    )
    .await?
    .data
    .unwrap();

    booking_service::update_status(
        &state,
        &owner,
        booking.id,
        UpdateBookingStatusRequest {
            status: BookingStatus::Confirmed,
        },
    )
    .await?;

    // The window lies in the future, so completion is premature.
    let err = booking_service::update_status(
        &state,
        &owner,
        booking.id,
        UpdateBookingStatusRequest {
            status: BookingStatus::Completed,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));

    // A confirmed booking whose window already ended completes fine.
    let past_start = Utc::now() - Duration::hours(3);
    let past = BookingActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(player_id),
        court_id: Set(court_id),
        start_time: Set(past_start.into()),
        end_time: Set((past_start + Duration::hours(1)).into()),
        status: Set(BookingStatus::Confirmed),
        note: Set(None),
        created_at: Set(past_start.into()),
        updated_at: Set(past_start.into()),
    }
    .insert(&state.orm)
    .await?;

    let done = booking_service::update_status(
        &state,
        &owner,
        past.id,
        UpdateBookingStatusRequest {
            status: BookingStatus::Completed,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(done.status, BookingStatus::Completed);

    Ok(())
}

// An owner update racing a failure webhook must not resurrect a cancelled
// booking: whichever commits second sees the locked row and the loser's
// transition is rejected, so the booking always settles on CANCELLED.
#[tokio::test]
async fn racing_owner_update_and_failure_webhook_settle_on_cancelled() -> anyhow::Result<()> {
    let gateway = MockGateway::new();
    let Some(state) = setup_state(gateway).await? else {
        return Ok(());
    };

    let owner_id = create_user(&state, "owner").await?;
    let player_id = create_user(&state, "player").await?;
    let court_id = seed_court(&state, owner_id).await?;
    seed_slot(&state, court_id, day_hour(9), 500).await?;

    let owner = AuthUser {
        user_id: owner_id,
        role: "owner".into(),
    };
    let player = AuthUser {
        user_id: player_id,
        role: "player".into(),
    };

    let booking = booking_service::create_booking(
        &state,
        &player,
        CreateBookingRequest {
            court_id,
            start_time: day_hour(9),
            end_time: day_hour(10),
            note: None,
        },
    )
    .await?
    .data
    .unwrap();

    let intent = payment_service::create_or_reuse_intent(
        &state,
        &player,
        CreateIntentRequest {
            booking_id: booking.id,
        },
    )
    .await?
    .data
    .unwrap();

    let body = serde_json::json!({
        "id": "evt_race_1",
        "type": "payment_intent.payment_failed",
        "data": { "object": { "id": intent.provider_intent_id } },
    })
    .to_string();
    let sig = signed_header(&body);

    let (owner_res, webhook_res) = tokio::join!(
        booking_service::update_status(
            &state,
            &owner,
            booking.id,
            UpdateBookingStatusRequest {
                status: BookingStatus::Confirmed,
            },
        ),
        webhook_service::handle_event(&state, Some(sig.as_str()), &body),
    );
    webhook_res?;

    // Either the owner confirmed first and the webhook then cancelled, or
    // the webhook cancelled first and the owner update was rejected.
    if let Err(err) = owner_res {
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    let after = Bookings::find_by_id(booking.id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(after.status, BookingStatus::Cancelled);

    let payment = Payments::find()
        .filter(PaymentCol::BookingId.eq(booking.id))
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);

    let slot = Slots::find()
        .filter(SlotCol::CourtId.eq(court_id))
        .filter(SlotCol::StartTime.eq(day_hour(9)))
        .one(&state.orm)
        .await?
        .unwrap();
    assert!(!slot.is_booked);

    Ok(())
}

#[tokio::test]
async fn sweeper_reaps_only_stale_pending_bookings() -> anyhow::Result<()> {
    let gateway = MockGateway::new();
    let Some(state) = setup_state(gateway).await? else {
        return Ok(());
    };

    let owner_id = create_user(&state, "owner").await?;
    let player_id = create_user(&state, "player").await?;
    let court_id = seed_court(&state, owner_id).await?;

    let insert_pending = |start: DateTime<Utc>, age_minutes: i64| {
        let created = Utc::now() - Duration::minutes(age_minutes);
        BookingActive {
            id: Set(Uuid::new_v4()),
            user_id: Set(player_id),
            court_id: Set(court_id),
            start_time: Set(start.into()),
            end_time: Set((start + Duration::hours(1)).into()),
            status: Set(BookingStatus::Pending),
            note: Set(None),
            created_at: Set(created.into()),
            updated_at: Set(created.into()),
        }
    };

    let stale = insert_pending(day_hour(9), 20).insert(&state.orm).await?;
    let fresh = insert_pending(day_hour(15), 5).insert(&state.orm).await?;

    sweeper_service::sweep_stale_pending(&state).await?;

    let stale_after = Bookings::find_by_id(stale.id).one(&state.orm).await?.unwrap();
    let fresh_after = Bookings::find_by_id(fresh.id).one(&state.orm).await?.unwrap();
    assert_eq!(stale_after.status, BookingStatus::Cancelled);
    assert_eq!(fresh_after.status, BookingStatus::Pending);

    Ok(())
}
