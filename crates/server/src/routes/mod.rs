use axum::{
    Router,
    http::{HeaderValue, Method, header},
};
use deployment::Deployment;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::DeploymentImpl;

pub mod activity;
pub mod admin_users;
pub mod consistency;
pub mod health;
pub mod notifications;
pub mod offers;
pub mod partners;
pub mod requests;
pub mod reviews;

pub fn router(deployment: DeploymentImpl) -> Router {
    let api_routes = Router::new()
        .merge(health::router(&deployment))
        .merge(admin_users::router(&deployment))
        .merge(partners::router(&deployment))
        .merge(requests::router(&deployment))
        .merge(offers::router(&deployment))
        .merge(reviews::router(&deployment))
        .merge(activity::router(&deployment))
        .merge(notifications::router(&deployment))
        .merge(consistency::router(&deployment));

    let cors = cors_layer(&deployment.config().cors_allowed_origins);

    Router::new()
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(deployment)
}

/// Browsers call the API directly from the web app. An empty origin list allows any origin.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
