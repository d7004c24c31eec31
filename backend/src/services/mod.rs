pub mod admin;
pub mod commission;
pub mod deliveries;
pub mod disputes;
pub mod documents;
pub mod email;
pub mod encryption;
pub mod expiry;
pub mod metrics;
pub mod notifications;
pub mod offers;
pub mod profiles;
pub mod providers;
pub mod push;
pub mod ratings;
pub mod realtime;
pub mod requests;
pub mod settings;
