pub mod activity_tracker;
pub mod auth;
pub mod call_notification;
pub mod config;
pub mod consistency;
pub mod email;
pub mod health;
pub mod http;
pub mod marketplace;
pub mod onboarding;
pub mod push;
pub mod reviews;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
