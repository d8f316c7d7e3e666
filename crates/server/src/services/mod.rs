pub mod auth;
pub mod clock;
pub mod notifier;
pub mod rate_limit;
pub mod upload;
