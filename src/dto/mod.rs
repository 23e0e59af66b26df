pub mod bookings;
pub mod notifications;
pub mod payments;
pub mod slots;
pub mod webhooks;
