pub mod bookings;
pub mod courts;
pub mod notifications;
pub mod payments;
pub mod slots;
pub mod users;
pub mod venues;
