use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use deployment::Deployment;
use services::services::health::{HealthReport, HealthService};
use utils::response::ApiResponse;

use crate::DeploymentImpl;

/// GET /api/health
/// Always 200; `all_checks_passed` reports whether the deployment is fully configured.
pub async fn health_check(
    State(deployment): State<DeploymentImpl>,
) -> ResponseJson<ApiResponse<HealthReport>> {
    let report = HealthService::report(deployment.db(), deployment.config()).await;
    ResponseJson(ApiResponse::success(report))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/health", get(health_check))
}
