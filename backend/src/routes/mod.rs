pub mod admin;
pub mod comunas;
pub mod disputes;
pub mod health;
pub mod metrics;
pub mod notifications;
pub mod profile;
pub mod ratings;
pub mod requests;
pub mod supplier;
pub mod tracking;
pub mod websocket;
