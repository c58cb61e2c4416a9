use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use deployment::Deployment;
use services::services::consistency::{ConsistencyChecker, ConsistencyReport};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::RequireAdmin};

/// GET /api/admin/consistency (admin)
/// Runs every cross-table check on demand.
pub async fn get_consistency_report(
    State(deployment): State<DeploymentImpl>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<ResponseJson<ApiResponse<ConsistencyReport>>, ApiError> {
    let report = ConsistencyChecker::new(deployment.db().pool.clone())
        .run()
        .await?;
    Ok(ResponseJson(ApiResponse::success(report)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/admin/consistency", get(get_consistency_report))
}
