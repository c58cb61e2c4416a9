use axum::{
    Router, extract::State, http::StatusCode, response::Json as ResponseJson, routing::post,
};
use db::models::admin_user::AdminUser;
use deployment::Deployment;
use services::services::onboarding::{
    BootstrapAdminAccount, CreateAdminAccount, OnboardingService,
};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::RequireAdmin};

/// POST /api/bootstrap-admin
/// Creates the first admin while none exists, guarded by ADMIN_BOOTSTRAP_TOKEN.
pub async fn bootstrap_admin(
    State(deployment): State<DeploymentImpl>,
    axum::Json(payload): axum::Json<BootstrapAdminAccount>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<AdminUser>>), ApiError> {
    let admin = OnboardingService::bootstrap_admin(
        &deployment.db().pool,
        deployment.auth(),
        &payload,
        deployment.config().admin_bootstrap_token.as_ref(),
    )
    .await?;

    deployment
        .track_event(
            "admin_bootstrapped",
            serde_json::json!({ "admin_id": admin.id.to_string() }),
        )
        .await;

    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(admin))))
}

/// POST /api/create-admin-user
pub async fn create_admin_user(
    State(deployment): State<DeploymentImpl>,
    RequireAdmin(caller): RequireAdmin,
    axum::Json(payload): axum::Json<CreateAdminAccount>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<AdminUser>>), ApiError> {
    let admin =
        OnboardingService::create_admin(&deployment.db().pool, deployment.auth(), &payload).await?;

    deployment
        .track_event(
            "admin_created",
            serde_json::json!({
                "admin_id": admin.id.to_string(),
                "created_by": caller.id.to_string(),
            }),
        )
        .await;

    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(admin))))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/bootstrap-admin", post(bootstrap_admin))
        .route("/create-admin-user", post(create_admin_user))
}
