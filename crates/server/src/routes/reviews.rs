use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post, put},
};
use db::models::review::{Review, ReviewObjection};
use deployment::Deployment;
use serde::Deserialize;
use services::services::reviews::{ResolvedObjection, ReviewService};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, middleware::RequireAdmin};

#[derive(Debug, Deserialize, TS)]
pub struct SetReviewHidden {
    pub hidden: bool,
}

#[derive(Debug, Deserialize, TS)]
pub struct FileObjection {
    pub partner_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Deserialize, TS)]
pub struct ResolveObjection {
    pub approve: bool,
    pub admin_note: Option<String>,
}

/// PUT /api/reviews/{review_id}/hidden (admin)
/// Idempotent; the partner rating is recomputed from visible reviews.
pub async fn set_review_hidden(
    State(deployment): State<DeploymentImpl>,
    Path(review_id): Path<Uuid>,
    RequireAdmin(admin): RequireAdmin,
    axum::Json(payload): axum::Json<SetReviewHidden>,
) -> Result<ResponseJson<ApiResponse<Review>>, ApiError> {
    let review =
        ReviewService::set_hidden(&deployment.db().pool, review_id, payload.hidden).await?;

    deployment
        .track_event(
            "review_visibility_set",
            serde_json::json!({
                "review_id": review_id.to_string(),
                "hidden": payload.hidden,
                "admin_id": admin.id.to_string(),
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(review)))
}

pub async fn file_objection(
    State(deployment): State<DeploymentImpl>,
    Path(review_id): Path<Uuid>,
    axum::Json(payload): axum::Json<FileObjection>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<ReviewObjection>>), ApiError> {
    let objection = ReviewService::file_objection(
        &deployment.db().pool,
        review_id,
        payload.partner_id,
        &payload.reason,
    )
    .await?;

    deployment
        .track_event(
            "review_objection_filed",
            serde_json::json!({
                "objection_id": objection.id.to_string(),
                "review_id": review_id.to_string(),
            }),
        )
        .await;

    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(objection))))
}

pub async fn get_pending_objections(
    State(deployment): State<DeploymentImpl>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<ResponseJson<ApiResponse<Vec<ReviewObjection>>>, ApiError> {
    let objections = ReviewService::pending_objections(&deployment.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(objections)))
}

/// POST /api/review-objections/{objection_id}/resolve (admin)
pub async fn resolve_objection(
    State(deployment): State<DeploymentImpl>,
    Path(objection_id): Path<Uuid>,
    RequireAdmin(admin): RequireAdmin,
    axum::Json(payload): axum::Json<ResolveObjection>,
) -> Result<ResponseJson<ApiResponse<ResolvedObjection>>, ApiError> {
    let resolved = ReviewService::resolve_objection(
        &deployment.db().pool,
        objection_id,
        payload.approve,
        payload.admin_note.as_deref(),
    )
    .await?;

    deployment
        .track_event(
            "review_objection_resolved",
            serde_json::json!({
                "objection_id": objection_id.to_string(),
                "approved": payload.approve,
                "admin_id": admin.id.to_string(),
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(resolved)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/reviews/{review_id}/hidden", put(set_review_hidden))
        .route("/reviews/{review_id}/objections", post(file_objection))
        .route("/review-objections", get(get_pending_objections))
        .route(
            "/review-objections/{objection_id}/resolve",
            post(resolve_objection),
        )
}
