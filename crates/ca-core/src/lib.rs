pub mod config;
pub mod event_bus;
pub mod notifications;
pub mod ring_buffer;
pub mod types;
