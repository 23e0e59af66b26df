use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        bookings::{BookingList, BookingWithPayment, CreateBookingRequest, UpdateBookingStatusRequest},
        notifications::NotificationList,
        payments::{CreateIntentRequest, IntentData},
        slots::{SlotWindow, SlotWindowList},
    },
    models::{
        Booking, BookingStatus, Court, Notification, NotificationKind, Payment, PaymentStatus,
        Slot, WindowStatus,
    },
    response::{ApiResponse, Meta},
    routes::{admin, bookings, health, notifications, params, payments, slots, webhooks},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        slots::get_slots,
        bookings::create_booking,
        bookings::list_bookings,
        bookings::get_booking,
        bookings::cancel_booking,
        bookings::update_status,
        payments::create_intent,
        webhooks::payment_webhook,
        notifications::list_notifications,
        notifications::notification_stream,
        admin::trigger_sweep,
        admin::list_sweep_eligible
    ),
    components(
        schemas(
            Court,
            Slot,
            Booking,
            Payment,
            Notification,
            BookingStatus,
            PaymentStatus,
            NotificationKind,
            WindowStatus,
            SlotWindow,
            SlotWindowList,
            BookingList,
            BookingWithPayment,
            CreateBookingRequest,
            UpdateBookingStatusRequest,
            CreateIntentRequest,
            IntentData,
            NotificationList,
            admin::SweepResult,
            params::Pagination,
            params::BookingListQuery,
            Meta,
            ApiResponse<Booking>,
            ApiResponse<BookingList>,
            ApiResponse<BookingWithPayment>,
            ApiResponse<SlotWindowList>,
            ApiResponse<IntentData>,
            ApiResponse<NotificationList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Slots", description = "Slot calendar"),
        (name = "Bookings", description = "Booking ledger"),
        (name = "Payments", description = "Payment intents"),
        (name = "Webhooks", description = "Payment provider webhooks"),
        (name = "Notifications", description = "In-app notifications"),
        (name = "Admin", description = "Administrative operations"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
