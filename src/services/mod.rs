pub mod booking_service;
pub mod payment_service;
pub mod slot_service;
pub mod sweeper_service;
pub mod webhook_service;
