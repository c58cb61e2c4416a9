pub mod activity_log;
pub mod admin_user;
pub mod offer;
pub mod partner;
pub mod partner_vehicle;
pub mod push_token;
pub mod review;
pub mod service_request;
